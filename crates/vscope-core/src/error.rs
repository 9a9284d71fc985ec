//! Error types for the vscope core pipeline

use thiserror::Error;

/// Result type for core pipeline operations
pub type Result<T> = std::result::Result<T, VscopeError>;

/// Errors that can occur in the ingest/project/cluster/trace pipeline
#[derive(Debug, Clone, Error)]
pub enum VscopeError {
    /// Unknown projection or clustering method name
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid caller-supplied argument (limit, top_k, percentile, cluster
    /// count, dimension mismatch)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `transform` called before `fit`
    #[error("projector has not been fitted - call fit() before transform()")]
    NotFitted,

    /// `visualize` or `trace` called before `ingest`
    #[error("no snapshot ingested - call ingest() before visualize() or trace()")]
    NotIngested,

    /// Data source connector failure, wrapping the underlying cause
    #[error("data source error: {0}")]
    DataSource(String),

    /// Operation not supported by the configured method
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Underlying numerical backend failure
    #[error("numerical backend error: {0}")]
    Backend(String),

    /// Fitted-model persistence failure
    #[error("persistence error: {0}")]
    Persistence(String),
}
