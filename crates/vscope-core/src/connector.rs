//! Data source connectors
//!
//! A connector supplies the three index-aligned collections a session ingests:
//! an N x D embedding matrix, per-item metadata, and documents by index. The
//! trait is deliberately minimal so backends can live in separate crates
//! (see `vscope-sqlite` for the persistent implementation).

use std::collections::HashMap;

use ndarray::Array2;
use thiserror::Error;

use crate::error::VscopeError;

/// Per-item metadata: free-form key/value pairs.
pub type Metadata = HashMap<String, serde_json::Value>;

/// Errors that can occur while fetching from a data source
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    /// Could not reach or open the backing store
    #[error("connection error: {0}")]
    Connection(String),

    /// The store was reachable but the fetch itself failed
    #[error("query error: {0}")]
    Query(String),

    /// The store returned malformed or inconsistent data
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl From<ConnectorError> for VscopeError {
    fn from(err: ConnectorError) -> Self {
        VscopeError::DataSource(err.to_string())
    }
}

/// Result type for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// A source of embeddings, metadata, and documents.
///
/// The three fetches must return index-aligned, same-length collections for
/// the same `limit`: row `i` of the embedding matrix, metadata entry `i`, and
/// the document fetched for id `i` all describe the same item.
pub trait VectorConnector {
    /// Fetch up to `limit` embedding vectors as an N x D matrix.
    fn fetch_embeddings(&self, limit: usize) -> ConnectorResult<Array2<f32>>;

    /// Fetch up to `limit` per-item metadata entries.
    fn fetch_metadata(&self, limit: usize) -> ConnectorResult<Vec<Metadata>>;

    /// Fetch documents by session index.
    fn fetch_documents(&self, ids: &[usize]) -> ConnectorResult<Vec<String>>;
}

/// In-memory connector seeded directly with arrays.
///
/// Useful for unit testing and for inspecting embeddings that already live in
/// process memory. Documents and metadata are synthesized when not supplied.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    embeddings: Array2<f32>,
    documents: Vec<String>,
    metadata: Vec<Metadata>,
}

impl MemoryConnector {
    /// Create a connector from an embedding matrix alone; documents become
    /// `"Document {i}"` and metadata `{"id": i}`.
    pub fn new(embeddings: Array2<f32>) -> Self {
        let n = embeddings.nrows();
        let documents = (0..n).map(|i| format!("Document {}", i)).collect();
        let metadata = (0..n)
            .map(|i| {
                let mut m = Metadata::new();
                m.insert("id".to_string(), serde_json::json!(i));
                m
            })
            .collect();
        Self {
            embeddings,
            documents,
            metadata,
        }
    }

    /// Create a connector with explicit documents and metadata.
    ///
    /// Returns `InvalidData` if the collections are not the same length as
    /// the embedding matrix.
    pub fn with_collections(
        embeddings: Array2<f32>,
        documents: Vec<String>,
        metadata: Vec<Metadata>,
    ) -> ConnectorResult<Self> {
        let n = embeddings.nrows();
        if documents.len() != n || metadata.len() != n {
            return Err(ConnectorError::InvalidData(format!(
                "misaligned collections: {} embeddings, {} documents, {} metadata entries",
                n,
                documents.len(),
                metadata.len()
            )));
        }
        Ok(Self {
            embeddings,
            documents,
            metadata,
        })
    }

    /// Number of items held by this connector.
    pub fn len(&self) -> usize {
        self.embeddings.nrows()
    }

    /// Whether this connector holds no items.
    pub fn is_empty(&self) -> bool {
        self.embeddings.nrows() == 0
    }
}

impl VectorConnector for MemoryConnector {
    fn fetch_embeddings(&self, limit: usize) -> ConnectorResult<Array2<f32>> {
        let n = limit.min(self.embeddings.nrows());
        Ok(self.embeddings.slice(ndarray::s![..n, ..]).to_owned())
    }

    fn fetch_metadata(&self, limit: usize) -> ConnectorResult<Vec<Metadata>> {
        let n = limit.min(self.metadata.len());
        Ok(self.metadata[..n].to_vec())
    }

    fn fetch_documents(&self, ids: &[usize]) -> ConnectorResult<Vec<String>> {
        ids.iter()
            .map(|&i| {
                self.documents.get(i).cloned().ok_or_else(|| {
                    ConnectorError::Query(format!(
                        "document id {} out of range ({} documents)",
                        i,
                        self.documents.len()
                    ))
                })
            })
            .collect()
    }
}
