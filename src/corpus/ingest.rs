//! Bulk loading of statute articles from JSON
use super::LocalCorpus;
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, ThemisError};
use crate::storage::NewArticle;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Code assigned to entries that do not name one
pub const DEFAULT_CODE_SOURCE: &str = "Code Consommation";

fn default_code_source() -> String {
    DEFAULT_CODE_SOURCE.to_string()
}

/// One article as found in an ingestion file
#[derive(Debug, Clone, Deserialize)]
pub struct ArticleEntry {
    #[serde(default = "default_code_source")]
    pub code_source: String,
    pub article_number: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Read a JSON array of articles
pub fn load_entries(path: &Path) -> Result<Vec<ArticleEntry>> {
    let raw = std::fs::read_to_string(path).map_err(|e| ThemisError::Io {
        source: e,
        context: format!("Failed to read corpus file: {:?}", path),
    })?;

    serde_json::from_str(&raw).map_err(|e| ThemisError::Json {
        source: e,
        context: format!("Invalid corpus file: {:?}", path),
    })
}

/// Result of an ingestion run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestReport {
    /// Articles written to the store
    pub processed: usize,
    /// Entries rejected (blank number or content)
    pub failed: usize,
    /// Stored articles whose embedding could not be computed
    pub unembedded: usize,
    pub duration_ms: u64,
}

/// Embeds and stores articles, then refreshes both indexes
pub struct Ingestor {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    /// Ingest `entries` into `corpus`
    ///
    /// Articles are upserted by `article_number`. A batch whose
    /// embedding fails is still stored, without embeddings, so it remains
    /// reachable through keyword search.
    pub fn ingest(&self, corpus: &LocalCorpus, entries: Vec<ArticleEntry>) -> Result<IngestReport> {
        let start = std::time::Instant::now();
        let mut report = IngestReport::default();

        let (valid, rejected): (Vec<ArticleEntry>, Vec<ArticleEntry>) = entries
            .into_iter()
            .map(|mut entry| {
                entry.article_number = entry.article_number.trim().to_string();
                entry
            })
            .partition(|entry| !entry.article_number.is_empty() && !entry.content.trim().is_empty());

        for entry in &rejected {
            warn!("Skipping entry with blank number or content: {:?}", entry.article_number);
        }
        report.failed = rejected.len();

        info!("Ingesting {} article(s)", valid.len());

        for chunk in valid.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(|entry| entry.content.clone()).collect();

            let embeddings = match self.provider.embed_batch(&texts) {
                Ok(embeddings) if embeddings.len() == chunk.len() => Some(embeddings),
                Ok(embeddings) => {
                    warn!(
                        "Embedding count mismatch: expected {}, got {}",
                        chunk.len(),
                        embeddings.len()
                    );
                    None
                }
                Err(e) => {
                    warn!("Failed to embed batch of {}: {}", chunk.len(), e);
                    None
                }
            };

            for (i, entry) in chunk.iter().enumerate() {
                let metadata = entry.metadata.as_ref().map(|m| m.to_string());
                let embedding = embeddings.as_ref().map(|all| all[i].as_slice());

                corpus.database().upsert_article(&NewArticle {
                    code_source: &entry.code_source,
                    article_number: &entry.article_number,
                    content: &entry.content,
                    metadata: metadata.as_deref(),
                    embedding,
                })?;
            }

            report.processed += chunk.len();
            if embeddings.is_none() {
                report.unembedded += chunk.len();
            }
            debug!("Stored chunk of {} article(s)", chunk.len());
        }

        corpus.rebuild_vector_index()?;
        corpus.rebuild_keyword_index()?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Ingestion complete: {} processed, {} failed, {} without embedding, {}ms",
            report.processed, report.failed, report.unembedded, report.duration_ms
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedding::EmbeddingError;
    use crate::retrieval::{LexicalBackend, VectorBackend};
    use tempfile::TempDir;

    /// Length-based 2D embedding; fails on texts containing "panne"
    struct TinyEmbedder;

    impl EmbeddingProvider for TinyEmbedder {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            if text.contains("panne") {
                return Err(EmbeddingError::GenerationError("model crashed".to_string()));
            }
            Ok(vec![1.0, text.len() as f32 / 100.0])
        }

        fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "tiny"
        }
    }

    fn open_corpus(temp: &TempDir) -> LocalCorpus {
        let mut config = Config::default();
        config.storage.data_dir = temp.path().to_path_buf();
        LocalCorpus::open(&config, 2).unwrap()
    }

    fn entries(json: &str) -> Vec<ArticleEntry> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_entry_defaults() {
        let parsed = entries(r#"[{"article_number": "L217-3", "content": "Texte"}]"#);
        assert_eq!(parsed[0].code_source, DEFAULT_CODE_SOURCE);
        assert!(parsed[0].metadata.is_none());
    }

    #[test]
    fn test_ingest_stores_and_indexes() {
        let temp = TempDir::new().unwrap();
        let corpus = open_corpus(&temp);
        let ingestor = Ingestor::new(Arc::new(TinyEmbedder), 2);

        let report = ingestor
            .ingest(
                &corpus,
                entries(
                    r#"[
                        {"article_number": "L217-3", "content": "Le vendeur délivre un bien conforme.", "metadata": {"theme": "Garantie", "type": "loi"}},
                        {"article_number": " L221-18 ", "content": "Délai de rétractation de quatorze jours."},
                        {"article_number": "L216-1", "content": "Livraison du bien."}
                    ]"#,
                ),
            )
            .unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(report.unembedded, 0);
        assert_eq!(corpus.vector_count(), 3);
        assert_eq!(corpus.keyword_count(), 3);

        let stored = corpus.database().find_by_number("l221-18").unwrap().unwrap();
        assert_eq!(stored.article_number, "L221-18");

        let nearest = corpus.nearest(&[1.0, 0.3], 5).unwrap();
        let garantie = nearest.iter().find(|s| s.article_number == "L217-3").unwrap();
        assert_eq!(garantie.metadata.theme.as_deref(), Some("Garantie"));
    }

    #[test]
    fn test_failed_batch_stored_without_embedding() {
        let temp = TempDir::new().unwrap();
        let corpus = open_corpus(&temp);
        let ingestor = Ingestor::new(Arc::new(TinyEmbedder), 1);

        let report = ingestor
            .ingest(
                &corpus,
                entries(
                    r#"[
                        {"article_number": "L1-1", "content": "Texte normal."},
                        {"article_number": "L1-2", "content": "Texte en panne de livraison."},
                        {"article_number": "  ", "content": "Sans numéro."},
                        {"article_number": "L1-3", "content": "   "}
                    ]"#,
                ),
            )
            .unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.unembedded, 1);
        assert_eq!(corpus.vector_count(), 1);
        assert_eq!(corpus.keyword_count(), 2);

        let query = crate::retrieval::build_keyword_query("livraison", None);
        let hits = corpus.lexical(&query, 5).unwrap();
        assert_eq!(hits[0].article_number, "L1-2");
    }

    #[test]
    fn test_reingest_updates_in_place() {
        let temp = TempDir::new().unwrap();
        let corpus = open_corpus(&temp);
        let ingestor = Ingestor::new(Arc::new(TinyEmbedder), 8);

        ingestor
            .ingest(&corpus, entries(r#"[{"article_number": "L1-1", "content": "Ancien texte."}]"#))
            .unwrap();
        ingestor
            .ingest(&corpus, entries(r#"[{"article_number": "L1-1", "content": "Nouveau texte."}]"#))
            .unwrap();

        let stats = corpus.database().stats().unwrap();
        assert_eq!(stats.article_count, 1);
        assert_eq!(
            corpus.database().find_by_number("L1-1").unwrap().unwrap().content,
            "Nouveau texte."
        );
        assert_eq!(corpus.keyword_count(), 1);
    }

    #[test]
    fn test_load_entries_reports_bad_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("corpus.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_entries(&path), Err(ThemisError::Json { .. })));
    }
}
