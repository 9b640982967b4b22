//! Storage layer for Themis
//!
//! The article table is the source of truth for both search indexes: the
//! vector index is rebuilt from stored embeddings at startup and the keyword
//! index is rebuilt from stored contents on ingestion.

pub mod database;

pub use database::{ArticleRecord, Database, DbPool, DbStats, NewArticle};

/// Encode an embedding as little-endian `f32` bytes
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian `f32` bytes; `None` if the length is not a multiple of 4
pub fn decode_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_bytes() {
        let vector = vec![0.5, -1.25, 3.0];
        let bytes = encode_embedding(&vector);
        assert_eq!(bytes.len(), 12);
        assert_eq!(decode_embedding(&bytes).unwrap(), vector);
    }

    #[test]
    fn test_truncated_embedding_rejected() {
        assert!(decode_embedding(&[0, 0, 128]).is_none());
    }
}
