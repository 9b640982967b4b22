//! Cross-encoder reranking and score calibration

use super::{sort_by_score_desc, Source};
use crate::embedding::LazyModel;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker initialization failed: {0}")]
    InitializationError(String),

    #[error("Reranking failed: {0}")]
    RerankingError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Cross-encoder relevance model
pub trait RelevanceModel: Send + Sync {
    /// Score each document against the query
    ///
    /// # Returns
    /// One raw logit per document, in input order
    fn score_pairs(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>, RerankError>;

    fn model_name(&self) -> &str;
}

fn resolve_model(model_name: &str) -> Result<RerankerModel, RerankError> {
    match model_name {
        "bge-reranker-base" | "BAAI/bge-reranker-base" => Ok(RerankerModel::BGERerankerBase),
        "bge-reranker-v2-m3" | "rozgo/bge-reranker-v2-m3" => Ok(RerankerModel::BGERerankerV2M3),
        _ => Err(RerankError::InitializationError(format!(
            "Unsupported reranker model: {}. Supported: bge-reranker-base, bge-reranker-v2-m3",
            model_name
        ))),
    }
}

/// FastEmbed cross-encoder, loaded on first use
pub struct FastEmbedRelevanceModel {
    model: LazyModel<TextRerank, RerankError>,
    model_name: String,
}

impl FastEmbedRelevanceModel {
    /// Validate the model name now, defer the download/load until first use
    pub fn new(model_name: &str) -> Result<Self, RerankError> {
        let model = resolve_model(model_name)?;
        let name = model_name.to_string();

        let loader_name = name.clone();
        let loader = move || {
            tracing::info!("Initializing reranker model: {}", loader_name);
            let options = RerankInitOptions::new(model.clone()).with_show_download_progress(false);
            TextRerank::try_new(options).map_err(|e| RerankError::InitializationError(e.to_string()))
        };

        Ok(Self {
            model: LazyModel::new(name.clone(), loader),
            model_name: name,
        })
    }
}

impl RelevanceModel for FastEmbedRelevanceModel {
    fn score_pairs(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>, RerankError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model.get()?;
        let results = model
            .rerank(query, documents.to_vec(), false, None)
            .map_err(|e| RerankError::RerankingError(e.to_string()))?;

        // fastembed returns results sorted by score; restore input order
        let mut logits = vec![f32::NAN; documents.len()];
        for result in results {
            match logits.get_mut(result.index) {
                Some(slot) => *slot = result.score,
                None => {
                    return Err(RerankError::RerankingError(format!(
                        "Result index {} out of range",
                        result.index
                    )))
                }
            }
        }

        if logits.iter().any(|l| l.is_nan()) {
            return Err(RerankError::RerankingError(
                "Model did not score every document".to_string(),
            ));
        }

        Ok(logits)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Logistic function mapping a logit into (0, 1)
pub fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}

/// Two-tier score calibration
#[derive(Debug, Clone, Copy)]
pub struct ScoreCalibration {
    /// Incoming scores above this carry the exact-citation boost
    pub boost_threshold: f32,
    /// Final score for boosted candidates
    pub exact_match_score: f32,
}

impl ScoreCalibration {
    pub fn calibrate(&self, incoming: f32, logit: f32) -> f32 {
        if incoming > self.boost_threshold {
            self.exact_match_score
        } else {
            sigmoid(logit)
        }
    }
}

impl Default for ScoreCalibration {
    fn default() -> Self {
        Self {
            boost_threshold: 20.0,
            exact_match_score: 0.9999,
        }
    }
}

/// Rerank stage
#[derive(Clone)]
pub struct Reranker {
    model: Arc<dyn RelevanceModel>,
    calibration: ScoreCalibration,
}

impl Reranker {
    pub fn new(model: Arc<dyn RelevanceModel>, calibration: ScoreCalibration) -> Self {
        Self { model, calibration }
    }

    /// Rescore `sources` against `query` and keep the best `top_k`
    ///
    /// Scores are overwritten with calibrated relevance. Ties keep input order.
    pub async fn rerank(
        &self,
        query: &str,
        sources: Vec<Source>,
        top_k: usize,
    ) -> Result<Vec<Source>, RerankError> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let calibration = self.calibration;
        let query = query.to_string();

        tokio::task::spawn_blocking(move || rescore(model.as_ref(), calibration, &query, sources, top_k))
            .await
            .map_err(|e| RerankError::RerankingError(format!("Rerank task failed: {}", e)))?
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }
}

fn rescore(
    model: &dyn RelevanceModel,
    calibration: ScoreCalibration,
    query: &str,
    mut sources: Vec<Source>,
    top_k: usize,
) -> Result<Vec<Source>, RerankError> {
    let documents: Vec<&str> = sources.iter().map(|s| s.content.as_str()).collect();
    let logits = model.score_pairs(query, &documents)?;

    if logits.len() != sources.len() {
        return Err(RerankError::RerankingError(format!(
            "Expected {} scores, got {}",
            sources.len(),
            logits.len()
        )));
    }

    log_logit_stats(&logits);

    for (source, &logit) in sources.iter_mut().zip(&logits) {
        source.score = calibration.calibrate(source.score, logit);
    }

    sort_by_score_desc(&mut sources);
    sources.truncate(top_k);

    for (rank, source) in sources.iter().take(3).enumerate() {
        tracing::info!(
            "Rerank #{}: {} ({:.4})",
            rank + 1,
            source.article_number,
            source.score
        );
    }

    Ok(sources)
}

fn log_logit_stats(logits: &[f32]) {
    let min = logits.iter().copied().fold(f32::INFINITY, f32::min);
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mean = logits.iter().sum::<f32>() / logits.len() as f32;
    tracing::info!(
        "Reranker logits over {} candidate(s): min={:.4} max={:.4} mean={:.4}",
        logits.len(),
        min,
        max,
        mean
    );
}
