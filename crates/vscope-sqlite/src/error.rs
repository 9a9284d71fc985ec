//! Error types for the SQLite connector backend

use thiserror::Error;
use vscope_core::ConnectorError;

/// Result type for SQLite connector operations
pub type Result<T> = std::result::Result<T, SqliteError>;

/// Errors that can occur in the SQLite connector
#[derive(Debug, Error)]
pub enum SqliteError {
    /// Database connection or query error
    #[error("SQLite error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Metadata JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item with the given external id already exists in the collection
    #[error("item {0} already exists")]
    AlreadyExists(String),

    /// Stored data is malformed (bad blob length, mixed dimensionality)
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

/// Convert SqliteError to ConnectorError for the connector trait
impl From<SqliteError> for ConnectorError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Database(e) => ConnectorError::Query(format!("SQLite: {}", e)),
            SqliteError::Json(e) => ConnectorError::InvalidData(format!("JSON: {}", e)),
            SqliteError::AlreadyExists(id) => {
                ConnectorError::InvalidData(format!("duplicate item: {}", id))
            }
            SqliteError::InvalidData(msg) => ConnectorError::InvalidData(msg),
        }
    }
}
