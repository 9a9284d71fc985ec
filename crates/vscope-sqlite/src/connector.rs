//! SQLite-backed vector connector
//!
//! One database holds any number of named collections of items, each item
//! being (external string id, document, metadata JSON, embedding blob). The
//! session's integer index for an item is its insertion order within the
//! collection, so external string ids are translated to stable indices.

use std::path::Path;

use ndarray::Array2;
use rusqlite::{Connection, OptionalExtension};
use vscope_core::{ConnectorError, ConnectorResult, Metadata, VectorConnector};

use crate::blob;
use crate::error::{Result, SqliteError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS items (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    collection  TEXT NOT NULL,
    ext_id      TEXT NOT NULL,
    document    TEXT NOT NULL,
    metadata    TEXT,
    embedding   BLOB NOT NULL,
    UNIQUE (collection, ext_id)
);
CREATE INDEX IF NOT EXISTS idx_items_collection ON items (collection, id);
";

/// SQLite-backed connector scoped to one collection.
#[derive(Debug)]
pub struct SqliteConnector {
    conn: Connection,
    collection: String,
}

impl SqliteConnector {
    /// Open a file-backed database, creating the schema if needed.
    ///
    /// Any failure to open or initialize the store surfaces as
    /// `ConnectorError::Connection`.
    pub fn open(
        path: impl AsRef<Path>,
        collection: impl Into<String>,
    ) -> ConnectorResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ConnectorError::Connection(format!("could not open database: {}", e)))?;
        Self::with_connection(conn, collection)
            .map_err(|e| ConnectorError::Connection(format!("could not initialize schema: {}", e)))
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory(collection: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, collection)
    }

    fn with_connection(conn: Connection, collection: impl Into<String>) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            collection: collection.into(),
        })
    }

    /// Insert one item. The session index of the item is its insertion
    /// order; duplicate external ids within a collection are rejected.
    pub fn insert(
        &mut self,
        ext_id: &str,
        document: &str,
        metadata: &Metadata,
        embedding: &[f32],
    ) -> Result<()> {
        if self.index_of(ext_id)?.is_some() {
            return Err(SqliteError::AlreadyExists(ext_id.to_string()));
        }
        let metadata_json = serde_json::to_string(metadata)?;
        self.conn.execute(
            "INSERT INTO items (collection, ext_id, document, metadata, embedding)
             VALUES (?, ?, ?, ?, ?)",
            rusqlite::params![
                self.collection,
                ext_id,
                document,
                metadata_json,
                blob::encode(embedding),
            ],
        )?;
        Ok(())
    }

    /// Translate an external string id to the session integer index.
    pub fn index_of(&self, ext_id: &str) -> Result<Option<usize>> {
        let target: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM items WHERE collection = ? AND ext_id = ?",
                rusqlite::params![self.collection, ext_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(target) = target else {
            return Ok(None);
        };
        let index: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE collection = ? AND id < ?",
            rusqlite::params![self.collection, target],
            |row| row.get(0),
        )?;
        Ok(Some(index as usize))
    }

    /// Number of items in the collection.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE collection = ?",
            rusqlite::params![self.collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn fetch_column<T>(
        &self,
        sql: &str,
        limit: usize,
        mut read: impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(
            rusqlite::params![self.collection, limit as i64],
            |row| read(row),
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn embeddings_impl(&self, limit: usize) -> Result<Array2<f32>> {
        let blobs: Vec<Vec<u8>> = self.fetch_column(
            "SELECT embedding FROM items WHERE collection = ? ORDER BY id LIMIT ?",
            limit,
            |row| row.get(0),
        )?;

        let vectors = blobs
            .iter()
            .map(|b| blob::decode(b))
            .collect::<Result<Vec<Vec<f32>>>>()?;

        let Some(first) = vectors.first() else {
            return Ok(Array2::zeros((0, 0)));
        };
        let dims = first.len();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(SqliteError::InvalidData(format!(
                "mixed embedding dimensionality: expected {}, found {}",
                dims,
                bad.len()
            )));
        }

        let flat: Vec<f32> = vectors.into_iter().flatten().collect();
        Array2::from_shape_vec((flat.len() / dims, dims), flat)
            .map_err(|e| SqliteError::InvalidData(format!("bad embedding shape: {}", e)))
    }

    fn metadata_impl(&self, limit: usize) -> Result<Vec<Metadata>> {
        let raw: Vec<Option<String>> = self.fetch_column(
            "SELECT metadata FROM items WHERE collection = ? ORDER BY id LIMIT ?",
            limit,
            |row| row.get(0),
        )?;
        raw.into_iter()
            .map(|m| match m {
                Some(json) => Ok(serde_json::from_str(&json)?),
                None => Ok(Metadata::new()),
            })
            .collect()
    }

    fn documents_impl(&self, ids: &[usize]) -> Result<Vec<String>> {
        let upper = match ids.iter().max() {
            Some(&max) => max + 1,
            None => return Ok(Vec::new()),
        };
        let documents: Vec<String> = self.fetch_column(
            "SELECT document FROM items WHERE collection = ? ORDER BY id LIMIT ?",
            upper,
            |row| row.get(0),
        )?;
        ids.iter()
            .map(|&i| {
                documents.get(i).cloned().ok_or_else(|| {
                    SqliteError::InvalidData(format!(
                        "document id {} out of range ({} items)",
                        i,
                        documents.len()
                    ))
                })
            })
            .collect()
    }
}

impl VectorConnector for SqliteConnector {
    fn fetch_embeddings(&self, limit: usize) -> ConnectorResult<Array2<f32>> {
        self.embeddings_impl(limit).map_err(Into::into)
    }

    fn fetch_metadata(&self, limit: usize) -> ConnectorResult<Vec<Metadata>> {
        self.metadata_impl(limit).map_err(Into::into)
    }

    fn fetch_documents(&self, ids: &[usize]) -> ConnectorResult<Vec<String>> {
        self.documents_impl(ids).map_err(Into::into)
    }
}
