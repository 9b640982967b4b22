//! Dense nearest-neighbour search

use super::{sort_by_score_desc, SearchError, Source};
use std::sync::Arc;

/// Nearest-neighbour lookup over article embeddings
///
/// Implementations return at most `limit` sources scored by cosine
/// similarity. Articles stored without an embedding are never returned.
pub trait VectorBackend: Send + Sync {
    fn nearest(&self, embedding: &[f32], limit: usize) -> Result<Vec<Source>, SearchError>;
}

/// Vector search stage
#[derive(Clone)]
pub struct VectorSearchClient {
    backend: Arc<dyn VectorBackend>,
}

impl VectorSearchClient {
    pub fn new(backend: Arc<dyn VectorBackend>) -> Self {
        Self { backend }
    }

    /// Search with a precomputed query embedding
    ///
    /// # Returns
    /// Up to `limit` sources ordered by descending similarity
    pub async fn try_search(
        &self,
        embedding: Arc<Vec<f32>>,
        limit: usize,
    ) -> Result<Vec<Source>, SearchError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let backend = Arc::clone(&self.backend);
        let mut sources =
            tokio::task::spawn_blocking(move || backend.nearest(&embedding, limit))
                .await
                .map_err(|e| SearchError::Backend(format!("Vector search task failed: {}", e)))??;

        sort_by_score_desc(&mut sources);
        sources.truncate(limit);

        tracing::debug!("Vector search returned {} candidate(s)", sources.len());
        Ok(sources)
    }

    /// Search, degrading any failure to an empty list
    pub async fn search(&self, embedding: Arc<Vec<f32>>, limit: usize) -> Vec<Source> {
        match self.try_search(embedding, limit).await {
            Ok(sources) => sources,
            Err(e) => {
                tracing::error!("Vector search failed: {}", e);
                Vec::new()
            }
        }
    }
}
