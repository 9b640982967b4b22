//! Embedding models and the two search indexes
//!
//! - `EmbeddingProvider` trait with a fastembed implementation
//! - `LazyModel` for one-time, thread-safe model loading
//! - HNSW (`hnsw_rs`) for cosine nearest-neighbour search
//! - Tantivy for stemmed full-text search over article contents
mod keyword_index;
mod lazy;
mod provider;
mod vector_index;

pub use keyword_index::{
    stemmer_language, KeywordIndex, KeywordIndexError, KeywordQuery, KeywordSearchResult,
    TextMatch,
};
pub use lazy::LazyModel;
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider, LazyEmbeddingProvider};
pub use vector_index::{SearchResult, VectorIndex, VectorIndexError};
