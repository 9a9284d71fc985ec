//! f32 embedding blob encoding
//!
//! Embeddings are stored as little-endian f32 blobs, one vector per row.

use crate::error::SqliteError;

/// Encode a vector as a little-endian f32 blob.
pub fn encode(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a little-endian f32 blob back into a vector.
pub fn decode(blob: &[u8]) -> Result<Vec<f32>, SqliteError> {
    if blob.len() % 4 != 0 {
        return Err(SqliteError::InvalidData(format!(
            "embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
