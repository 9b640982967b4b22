//! Mode dispatch over the retrieval stages
//!
//! `RagEngine` is built once at startup and shared by reference. It owns the
//! stage clients and model handles; nothing is global.

use super::{
    fuse, KeywordSearchClient, LexicalBackend, QueryMode, RelevanceModel, RerankError, Reranker,
    RetrievalMode, RetrievalResult, ScoreCalibration, SearchError, Source, VectorBackend,
    VectorSearchClient,
};
use crate::config::RetrievalConfig;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::generation::{generate_answer, AnswerGenerator};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Failure of a retrieval pipeline before the fail-open boundary
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Rerank(#[from] RerankError),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// One pipeline's answer as returned to callers
#[derive(Debug, Clone, Serialize)]
pub struct PipelineAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
    /// Seconds spent on retrieval and generation
    pub processing_time: f64,
}

/// Both pipelines side by side
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub naive: PipelineAnswer,
    pub advanced: PipelineAnswer,
}

/// Response for one request
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EngineResponse {
    Single(PipelineAnswer),
    Compare {
        comparison: Comparison,
        processing_time: f64,
    },
}

/// Retrieval orchestrator
pub struct RagEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    vector: VectorSearchClient,
    keyword: KeywordSearchClient,
    reranker: Reranker,
    generator: Arc<dyn AnswerGenerator>,
    config: RetrievalConfig,
}

impl RagEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vector_backend: Arc<dyn VectorBackend>,
        lexical_backend: Arc<dyn LexicalBackend>,
        relevance_model: Arc<dyn RelevanceModel>,
        generator: Arc<dyn AnswerGenerator>,
        config: RetrievalConfig,
    ) -> Self {
        let calibration = ScoreCalibration {
            boost_threshold: config.boost_threshold,
            exact_match_score: config.exact_match_score,
        };

        Self {
            embedder,
            vector: VectorSearchClient::new(vector_backend),
            keyword: KeywordSearchClient::new(lexical_backend, config.exact_match_boost),
            reranker: Reranker::new(relevance_model, calibration),
            generator,
            config,
        }
    }

    /// Run one retrieval pipeline
    ///
    /// Never fails: any stage error is logged and yields an empty result.
    pub async fn retrieve(&self, query: &str, mode: RetrievalMode) -> RetrievalResult {
        let start = Instant::now();
        tracing::info!("Retrieval mode: {}", mode);

        let sources = match self.try_retrieve(query, mode).await {
            Ok(sources) => sources,
            Err(e) => {
                tracing::error!("{} retrieval failed, returning no sources: {}", mode, e);
                Vec::new()
            }
        };

        match sources.first() {
            Some(top) => tracing::info!(
                "Top result: {} ({:.4}) of {}",
                top.article_number,
                top.score,
                sources.len()
            ),
            None => tracing::info!("No sources found"),
        }

        RetrievalResult {
            mode,
            sources,
            elapsed: start.elapsed(),
        }
    }

    /// Run one retrieval pipeline, surfacing the first fatal stage error
    ///
    /// In advanced mode a failing search backend only empties its own
    /// candidate list; embedding failure empties the vector side.
    pub async fn try_retrieve(
        &self,
        query: &str,
        mode: RetrievalMode,
    ) -> Result<Vec<Source>, RetrievalError> {
        match mode {
            RetrievalMode::Naive => {
                let embedding = self.embed_query(query).await?;
                Ok(self
                    .vector
                    .try_search(embedding, self.config.naive_limit)
                    .await?)
            }
            RetrievalMode::Advanced => {
                let limit = self.config.candidate_limit;

                let vector_side = async {
                    match self.embed_query(query).await {
                        Ok(embedding) => self.vector.search(embedding, limit).await,
                        Err(e) => {
                            tracing::error!("Vector search skipped: {}", e);
                            Vec::new()
                        }
                    }
                };
                let keyword_side = self.keyword.search(query, limit);

                let (vector_docs, keyword_docs) = tokio::join!(vector_side, keyword_side);
                tracing::info!(
                    "Candidates: {} vector, {} keyword",
                    vector_docs.len(),
                    keyword_docs.len()
                );

                let fused = fuse(vector_docs, keyword_docs);
                tracing::info!("{} candidate(s) after fusion", fused.len());

                Ok(self.reranker.rerank(query, fused, self.config.top_k).await?)
            }
        }
    }

    /// Retrieve then generate; the timer covers both
    pub async fn answer(&self, query: &str, mode: RetrievalMode) -> PipelineAnswer {
        let start = Instant::now();
        let result = self.retrieve(query, mode).await;
        let answer = generate_answer(self.generator.as_ref(), query, &result.sources).await;

        PipelineAnswer {
            answer,
            sources: result.sources,
            processing_time: start.elapsed().as_secs_f64(),
        }
    }

    /// Serve one request in the given mode
    pub async fn respond(&self, query: &str, mode: QueryMode) -> EngineResponse {
        match mode {
            QueryMode::Naive => EngineResponse::Single(self.answer(query, RetrievalMode::Naive).await),
            QueryMode::Advanced => {
                EngineResponse::Single(self.answer(query, RetrievalMode::Advanced).await)
            }
            QueryMode::Compare => {
                tracing::info!("Comparison mode");
                let start = Instant::now();
                let (naive, advanced) = tokio::join!(
                    self.answer(query, RetrievalMode::Naive),
                    self.answer(query, RetrievalMode::Advanced)
                );

                EngineResponse::Compare {
                    comparison: Comparison { naive, advanced },
                    processing_time: start.elapsed().as_secs_f64(),
                }
            }
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn reranker_model(&self) -> &str {
        self.reranker.model_name()
    }

    pub fn generation_model(&self) -> &str {
        self.generator.model_name()
    }

    async fn embed_query(&self, query: &str) -> Result<Arc<Vec<f32>>, RetrievalError> {
        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();

        let embedding = tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| RetrievalError::Task(e.to_string()))??;

        Ok(Arc::new(embedding))
    }
}
