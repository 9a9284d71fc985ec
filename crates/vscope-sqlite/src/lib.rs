//! SQLite-backed connector for vscope
//!
//! Persists collections of (external id, document, metadata, embedding)
//! items and serves them to a `vscope_core::Session` through the
//! `VectorConnector` trait. External string ids are translated to the
//! session's integer indices (insertion order within the collection).
//!
//! # Example
//!
//! ```rust,no_run
//! use vscope_core::{Metadata, VectorConnector};
//! use vscope_sqlite::SqliteConnector;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut connector = SqliteConnector::open("./vectors.db", "default")?;
//! connector.insert("doc-a", "first document", &Metadata::new(), &[0.1, 0.2, 0.3])?;
//!
//! let embeddings = connector.fetch_embeddings(1000)?;
//! assert_eq!(connector.index_of("doc-a")?, Some(0));
//! # Ok(())
//! # }
//! ```

pub mod blob;
pub mod connector;
pub mod error;

pub use connector::SqliteConnector;
pub use error::{Result, SqliteError};
