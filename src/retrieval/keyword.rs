//! Lexical search with exact-citation boosting

use super::{extract_article_id, sort_by_score_desc, ArticleId, SearchError, Source};
use crate::embedding::{KeywordQuery, TextMatch};
use std::sync::Arc;

/// Full-text lookup over article contents
///
/// Implementations union the ranked text match with a substring probe on
/// `article_number`; probe-only hits carry a rank of zero.
pub trait LexicalBackend: Send + Sync {
    fn lexical(&self, query: &KeywordQuery, limit: usize) -> Result<Vec<Source>, SearchError>;
}

/// Build the lexical query for a user query
///
/// A citation turns the text match into an exact phrase on the identifier;
/// otherwise the raw text is used as a keyword query.
pub fn build_keyword_query(query: &str, article_id: Option<&ArticleId>) -> KeywordQuery {
    match article_id {
        Some(id) => KeywordQuery {
            text: TextMatch::Phrase(id.to_string()),
            key_substring: Some(id.to_string()),
        },
        None => KeywordQuery {
            text: TextMatch::Terms(query.to_string()),
            key_substring: Some(query.trim().to_string()),
        },
    }
}

/// Keyword search stage
#[derive(Clone)]
pub struct KeywordSearchClient {
    backend: Arc<dyn LexicalBackend>,
    exact_match_boost: f32,
}

impl KeywordSearchClient {
    pub fn new(backend: Arc<dyn LexicalBackend>, exact_match_boost: f32) -> Self {
        Self {
            backend,
            exact_match_boost,
        }
    }

    /// Search by query text
    ///
    /// # Returns
    /// Up to `limit` sources ordered by descending lexical rank, exact
    /// citation hits carrying `+exact_match_boost`
    pub async fn try_search(&self, query: &str, limit: usize) -> Result<Vec<Source>, SearchError> {
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let article_id = extract_article_id(query);
        if let Some(id) = &article_id {
            tracing::info!("Keyword search on article identifier {}", id);
        }

        let keyword_query = build_keyword_query(query, article_id.as_ref());
        let backend = Arc::clone(&self.backend);
        let mut sources =
            tokio::task::spawn_blocking(move || backend.lexical(&keyword_query, limit))
                .await
                .map_err(|e| SearchError::Backend(format!("Keyword search task failed: {}", e)))??;

        if let Some(id) = &article_id {
            for source in sources.iter_mut().filter(|s| id.matches(&s.article_number)) {
                source.score += self.exact_match_boost;
                tracing::info!(
                    "Exact match on {} boosted to {:.2}",
                    source.article_number,
                    source.score
                );
            }
        }

        sort_by_score_desc(&mut sources);
        sources.truncate(limit);

        tracing::debug!("Keyword search returned {} candidate(s)", sources.len());
        Ok(sources)
    }

    /// Search, degrading any failure to an empty list
    pub async fn search(&self, query: &str, limit: usize) -> Vec<Source> {
        match self.try_search(query, limit).await {
            Ok(sources) => sources,
            Err(e) => {
                tracing::error!("Keyword search failed: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::SourceMetadata;
    use std::sync::Mutex;

    /// Returns canned sources and records the queries it received
    struct RecordingBackend {
        sources: Vec<Source>,
        queries: Mutex<Vec<KeywordQuery>>,
    }

    impl RecordingBackend {
        fn new(sources: Vec<Source>) -> Self {
            Self {
                sources,
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    impl LexicalBackend for RecordingBackend {
        fn lexical(&self, query: &KeywordQuery, _limit: usize) -> Result<Vec<Source>, SearchError> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(self.sources.clone())
        }
    }

    struct BrokenBackend;

    impl LexicalBackend for BrokenBackend {
        fn lexical(&self, _query: &KeywordQuery, _limit: usize) -> Result<Vec<Source>, SearchError> {
            Err(SearchError::Database("pool exhausted".to_string()))
        }
    }

    fn source(number: &str, score: f32) -> Source {
        Source::new(number, "contenu", SourceMetadata::default(), score)
    }

    #[test]
    fn test_citation_query_is_exact_phrase() {
        let id = extract_article_id("l'article L. 217-3").unwrap();
        let query = build_keyword_query("l'article L. 217-3", Some(&id));
        assert_eq!(query.text, TextMatch::Phrase("L217-3".to_string()));
        assert_eq!(query.key_substring.as_deref(), Some("L217-3"));
    }

    #[test]
    fn test_free_text_query() {
        let query = build_keyword_query("  délai de rétractation ", None);
        assert_eq!(
            query.text,
            TextMatch::Terms("  délai de rétractation ".to_string())
        );
        assert_eq!(query.key_substring.as_deref(), Some("délai de rétractation"));
    }

    #[tokio::test]
    async fn test_exact_match_boost() {
        let backend = Arc::new(RecordingBackend::new(vec![
            source("L217-4", 3.0),
            source("l217-3", 0.0),
        ]));
        let client = KeywordSearchClient::new(backend.clone(), 50.0);

        let results = client.search("Que dit l'article L. 217-3 ?", 25).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].article_number, "l217-3");
        assert!((results[0].score - 50.0).abs() < 1e-6);
        assert!((results[1].score - 3.0).abs() < 1e-6);

        let queries = backend.queries.lock().unwrap();
        assert_eq!(queries[0].text, TextMatch::Phrase("L217-3".to_string()));
    }

    #[tokio::test]
    async fn test_no_boost_without_citation() {
        let backend = Arc::new(RecordingBackend::new(vec![
            source("L217-3", 1.0),
            source("L221-18", 2.0),
        ]));
        let client = KeywordSearchClient::new(backend, 50.0);

        let results = client.search("garantie de conformité", 25).await;
        assert_eq!(results[0].article_number, "L221-18");
        assert!(results.iter().all(|s| s.score < 20.0));
    }

    #[tokio::test]
    async fn test_limit_applied() {
        let backend = Arc::new(RecordingBackend::new(
            (0..10).map(|i| source(&format!("L1-{}", i), i as f32)).collect(),
        ));
        let client = KeywordSearchClient::new(backend, 50.0);
        assert_eq!(client.search("livraison", 4).await.len(), 4);
    }

    #[tokio::test]
    async fn test_blank_query_skips_backend() {
        let backend = Arc::new(RecordingBackend::new(vec![source("L1-1", 1.0)]));
        let client = KeywordSearchClient::new(backend.clone(), 50.0);

        assert!(client.search("   ", 25).await.is_empty());
        assert!(backend.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_degrades_to_empty() {
        let client = KeywordSearchClient::new(Arc::new(BrokenBackend), 50.0);
        assert!(client.try_search("livraison", 25).await.is_err());
        assert!(client.search("livraison", 25).await.is_empty());
    }
}
