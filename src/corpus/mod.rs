//! Local search backends over the article store
//!
//! `LocalCorpus` serves both retrieval backends from one data directory:
//!
//! - `articles.sqlite`: the articles and their embeddings (source of truth)
//! - `keywords/`: tantivy index over article contents, persisted
//! - an HNSW graph rebuilt in memory from the stored embeddings on open
//!
//! Index hits carry only row ids; sources are hydrated from SQLite.

mod ingest;

pub use ingest::{load_entries, ArticleEntry, IngestReport, Ingestor, DEFAULT_CODE_SOURCE};

use crate::config::{expand_path, Config, IndexingConfig, StorageConfig};
use crate::embedding::{stemmer_language, KeywordIndex, KeywordQuery, VectorIndex};
use crate::error::{Result, ThemisError};
use crate::retrieval::{LexicalBackend, SearchError, Source, VectorBackend};
use crate::storage::Database;
use std::collections::HashMap;
use std::sync::Arc;

pub struct LocalCorpus {
    database: Arc<Database>,
    vectors: VectorIndex,
    keywords: KeywordIndex,
    ef_search: usize,
}

impl LocalCorpus {
    /// Open the corpus under `storage.data_dir` and build the vector index
    ///
    /// `dimension` must match the embedding model used at ingestion.
    pub fn open(config: &Config, dimension: usize) -> Result<Self> {
        let data_dir = expand_path(&config.storage.data_dir)?;
        let storage = StorageConfig { data_dir };

        let language = stemmer_language(&config.retrieval.text_language).ok_or_else(|| {
            ThemisError::Config(format!(
                "Unsupported text language: {}",
                config.retrieval.text_language
            ))
        })?;

        let database = Arc::new(Database::new(&storage.database_path(), &config.database)?);
        let keywords = KeywordIndex::new(storage.keyword_index_path(), language)?;

        let corpus = Self::from_parts(database, keywords, &config.indexing, dimension);
        corpus.rebuild_vector_index()?;

        let stats = corpus.database.stats()?;
        if corpus.keywords.len() as usize != stats.article_count {
            tracing::info!(
                "Keyword index out of date ({} of {} articles), rebuilding",
                corpus.keywords.len(),
                stats.article_count
            );
            corpus.rebuild_keyword_index()?;
        }

        Ok(corpus)
    }

    pub fn from_parts(
        database: Arc<Database>,
        keywords: KeywordIndex,
        indexing: &IndexingConfig,
        dimension: usize,
    ) -> Self {
        Self {
            database,
            vectors: VectorIndex::new(
                dimension,
                indexing.hnsw_m,
                indexing.hnsw_ef_construction,
                indexing.max_elements,
            ),
            keywords,
            ef_search: indexing.hnsw_ef_search,
        }
    }

    /// Reload the HNSW graph from stored embeddings
    ///
    /// Rows without an embedding, or with one of the wrong dimension, are left out.
    pub fn rebuild_vector_index(&self) -> Result<usize> {
        self.vectors.clear()?;

        let dimension = self.vectors.dimension();
        let (items, mismatched): (Vec<_>, Vec<_>) = self
            .database
            .embeddings()?
            .into_iter()
            .map(|(id, embedding)| (id as u64, embedding))
            .partition(|(_, embedding)| embedding.len() == dimension);
        let skipped = mismatched.len();
        self.vectors.insert_batch(&items)?;

        if skipped > 0 {
            tracing::warn!(
                "{} stored embedding(s) do not match dimension {}; re-index to include them",
                skipped,
                dimension
            );
        }

        let count = self.vectors.len() as usize;
        tracing::info!("Vector index built with {} article(s)", count);
        Ok(count)
    }

    /// Re-index every stored article's content
    pub fn rebuild_keyword_index(&self) -> Result<usize> {
        self.keywords.clear()?;

        let articles = self.database.all_articles()?;
        for article in &articles {
            self.keywords
                .upsert(article.id as u64, &article.article_number, &article.content)?;
        }
        self.keywords.commit()?;

        tracing::info!("Keyword index built with {} article(s)", articles.len());
        Ok(articles.len())
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    pub fn vector_count(&self) -> u64 {
        self.vectors.len()
    }

    pub fn keyword_count(&self) -> u64 {
        self.keywords.len()
    }

    /// Turn scored row ids into sources, keeping hit order
    fn hydrate(&self, hits: Vec<(u64, f32)>) -> std::result::Result<Vec<Source>, SearchError> {
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = hits.iter().map(|(id, _)| *id as i64).collect();
        let scores: HashMap<i64, f32> = hits.iter().map(|(id, s)| (*id as i64, *s)).collect();

        let records = self
            .database
            .get_articles(&ids)
            .map_err(|e| SearchError::Database(e.to_string()))?;

        Ok(records
            .into_iter()
            .map(|record| {
                let score = scores.get(&record.id).copied().unwrap_or(0.0);
                Source::from_record(record, score)
            })
            .collect())
    }
}

impl VectorBackend for LocalCorpus {
    fn nearest(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> std::result::Result<Vec<Source>, SearchError> {
        let hits = self
            .vectors
            .search(embedding, limit, self.ef_search)
            .map_err(|e| SearchError::Backend(e.to_string()))?;

        self.hydrate(hits.into_iter().map(|h| (h.id, h.score)).collect())
    }
}

impl LexicalBackend for LocalCorpus {
    fn lexical(
        &self,
        query: &KeywordQuery,
        limit: usize,
    ) -> std::result::Result<Vec<Source>, SearchError> {
        let hits = self
            .keywords
            .search(query, limit)
            .map_err(|e| SearchError::Backend(e.to_string()))?;

        self.hydrate(hits.into_iter().map(|h| (h.id, h.score)).collect())
    }
}
