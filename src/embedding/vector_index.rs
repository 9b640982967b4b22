/// HNSW vector index for similarity search
use hnsw_rs::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Search result with ID and similarity score
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Article row ID
    pub id: u64,
    /// Cosine similarity, `1 - cosine distance`
    pub score: f32,
}

/// Maximum number of HNSW layers
const MAX_LAYERS: usize = 16;

/// HNSW vector index wrapper
///
/// In-memory only; rebuilt from the article store on startup.
pub struct VectorIndex {
    index: RwLock<Hnsw<'static, f32, DistCosine>>,
    dimension: usize,
    hnsw_m: usize,
    ef_construction: usize,
    max_elements: usize,
    count: AtomicU64,
}

impl VectorIndex {
    /// Create an empty vector index
    ///
    /// # Arguments
    /// * `dimension` - Vector dimension (must match embedding dimension)
    /// * `hnsw_m` - Connections per node per layer
    /// * `ef_construction` - Construction beam width (higher = better recall, slower build)
    /// * `max_elements` - Capacity hint for the graph
    pub fn new(dimension: usize, hnsw_m: usize, ef_construction: usize, max_elements: usize) -> Self {
        Self {
            index: RwLock::new(Self::build_graph(hnsw_m, ef_construction, max_elements)),
            dimension,
            hnsw_m,
            ef_construction,
            max_elements,
            count: AtomicU64::new(0),
        }
    }

    fn build_graph(
        hnsw_m: usize,
        ef_construction: usize,
        max_elements: usize,
    ) -> Hnsw<'static, f32, DistCosine> {
        Hnsw::<f32, DistCosine>::new(hnsw_m, max_elements, MAX_LAYERS, ef_construction, DistCosine)
    }

    /// Insert a vector into the index
    pub fn insert(&self, id: u64, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let index = self
            .index
            .read()
            .map_err(|e| VectorIndexError::InsertError(e.to_string()))?;
        index.insert_slice((vector, id as usize));
        self.count.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    /// Insert multiple vectors in batch
    pub fn insert_batch(&self, items: &[(u64, Vec<f32>)]) -> Result<(), VectorIndexError> {
        for (id, vector) in items {
            self.insert(*id, vector)?;
        }
        Ok(())
    }

    /// Search for k nearest neighbors
    ///
    /// # Returns
    /// Results sorted by similarity descending, ties broken by ascending ID
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<SearchResult>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let index = self
            .index
            .read()
            .map_err(|e| VectorIndexError::SearchError(e.to_string()))?;

        let mut results: Vec<SearchResult> = index
            .search(query, k, ef_search.max(k))
            .into_iter()
            .map(|neighbour| SearchResult {
                id: neighbour.d_id as u64,
                score: 1.0 - neighbour.distance,
            })
            .filter(|r| r.score.is_finite())
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        results.truncate(k);

        Ok(results)
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Remove all vectors
    pub fn clear(&self) -> Result<(), VectorIndexError> {
        let mut index = self
            .index
            .write()
            .map_err(|e| VectorIndexError::InsertError(e.to_string()))?;
        *index = Self::build_graph(self.hnsw_m, self.ef_construction, self.max_elements);
        self.count.store(0, Ordering::Relaxed);
        Ok(())
    }
}
