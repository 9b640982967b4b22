//! Hybrid retrieval and reranking
//!
//! Query text flows through citation extraction, dense and lexical search,
//! fusion, and cross-encoder reranking. The `score` carried by a [`Source`]
//! changes meaning from stage to stage:
//!
//! | stage | score |
//! |---|---|
//! | vector search | cosine similarity |
//! | keyword search | BM25 rank, `+exact_match_boost` on an exact citation hit |
//! | reranked | `sigmoid(logit)`, or the exact-match sentinel |
//!
//! Scores are only compared within a stage; the boost is what lets an exact
//! citation hit survive fusion with unrelated magnitudes.

mod citation;
mod engine;
mod fusion;
mod keyword;
mod reranker;
mod vector;

pub use citation::{extract_article_id, ArticleId};
pub use engine::{Comparison, EngineResponse, PipelineAnswer, RagEngine, RetrievalError};
pub use fusion::fuse;
pub use keyword::{build_keyword_query, KeywordSearchClient, LexicalBackend};
pub use reranker::{
    sigmoid, FastEmbedRelevanceModel, RelevanceModel, RerankError, Reranker, ScoreCalibration,
};
pub use vector::{VectorBackend, VectorSearchClient};

use crate::storage::ArticleRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single search stage
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Search backend failed: {0}")]
    Backend(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Optional descriptive metadata attached to an article
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    #[serde(default)]
    pub theme: Option<String>,

    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl SourceMetadata {
    /// Parse stored JSON; missing or malformed metadata yields empty fields
    pub fn from_json(raw: Option<&str>) -> Self {
        raw.and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default()
    }
}

/// A retrieved statute excerpt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Canonical citation, unique within the corpus
    pub article_number: String,

    /// Statute text
    pub content: String,

    pub metadata: SourceMetadata,

    /// Stage-dependent relevance, see the module docs
    pub score: f32,
}

impl Source {
    pub fn new(
        article_number: impl Into<String>,
        content: impl Into<String>,
        metadata: SourceMetadata,
        score: f32,
    ) -> Self {
        Self {
            article_number: article_number.into(),
            content: content.into(),
            metadata,
            score,
        }
    }

    /// Build a source from a stored article and the score of the stage that found it
    pub fn from_record(record: ArticleRecord, score: f32) -> Self {
        Self {
            metadata: SourceMetadata::from_json(record.metadata.as_deref()),
            article_number: record.article_number,
            content: record.content,
            score,
        }
    }

    /// Get a short preview of the content (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        match self.content.char_indices().nth(max_chars) {
            Some((idx, _)) => format!("{}...", &self.content[..idx]),
            None => self.content.clone(),
        }
    }
}

/// Sort by descending score; equal scores keep their input order
pub(crate) fn sort_by_score_desc(sources: &mut [Source]) {
    sources.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// Retrieval pipeline variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Dense search only
    Naive,
    /// Dense + lexical search, fused and reranked
    Advanced,
}

impl std::fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Naive => write!(f, "naive"),
            Self::Advanced => write!(f, "advanced"),
        }
    }
}

/// Request-level mode: one pipeline, or both side by side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Naive,
    #[default]
    Advanced,
    Compare,
}

impl std::str::FromStr for QueryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "naive" => Ok(Self::Naive),
            "advanced" => Ok(Self::Advanced),
            "compare" => Ok(Self::Compare),
            other => Err(format!(
                "unknown mode '{}', expected naive, advanced or compare",
                other
            )),
        }
    }
}

/// Ranked sources produced by one pipeline run
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub mode: RetrievalMode,
    pub sources: Vec<Source>,
    /// Wall-clock time of the stages that produced `sources`
    pub elapsed: Duration,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
