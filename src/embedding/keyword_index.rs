/// Tantivy keyword index for full-text search over article contents
use std::path::PathBuf;
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, QueryParser, RegexQuery};
use tantivy::schema::*;
use tantivy::tokenizer::{
    AsciiFoldingFilter, Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer,
    StopWordFilter, TextAnalyzer,
};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeywordIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Tantivy error: {0}")]
    TantivyError(#[from] TantivyError),

    #[error("Query construction error: {0}")]
    QueryError(String),
}

/// Name under which the stemming analyzer is registered
const TEXT_ANALYZER: &str = "themis_text";

/// Writer heap budget
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Question words that carry no content but are missing from the stop lists
const FRENCH_QUESTION_WORDS: &[&str] = &[
    "quel", "quelle", "quels", "quelles", "lequel", "laquelle", "lesquels", "lesquelles",
    "combien", "comment", "pourquoi", "quand", "où",
];

/// Language stop words, dropped from both documents and queries
fn stop_words(language: Language) -> StopWordFilter {
    StopWordFilter::new(language).unwrap_or_else(|| StopWordFilter::remove(Vec::<String>::new()))
}

fn question_words(language: Language) -> StopWordFilter {
    let words = match language {
        Language::French => FRENCH_QUESTION_WORDS.iter().map(|w| w.to_string()).collect(),
        _ => Vec::new(),
    };
    StopWordFilter::remove(words)
}

/// Map a configured language name to a tantivy stemmer language
pub fn stemmer_language(name: &str) -> Option<Language> {
    match name.to_ascii_lowercase().as_str() {
        "french" | "fr" => Some(Language::French),
        "english" | "en" => Some(Language::English),
        "german" | "de" => Some(Language::German),
        "spanish" | "es" => Some(Language::Spanish),
        "italian" | "it" => Some(Language::Italian),
        "portuguese" | "pt" => Some(Language::Portuguese),
        "dutch" | "nl" => Some(Language::Dutch),
        _ => None,
    }
}

/// How the content field is matched
#[derive(Debug, Clone, PartialEq)]
pub enum TextMatch {
    /// All tokens, adjacent and in order
    Phrase(String),
    /// Free text; every term must match, quoted segments are phrases
    Terms(String),
}

/// A lexical query over the index
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordQuery {
    pub text: TextMatch,
    /// Case-insensitive substring probe on the article number.
    /// Hits found only through this probe score 0.
    pub key_substring: Option<String>,
}

/// Search result with ID and relevance score
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordSearchResult {
    /// Article row ID
    pub id: u64,
    /// BM25 relevance score
    pub score: f32,
}

/// Tantivy keyword index wrapper
///
/// Provides stemmed full-text search with BM25 ranking plus a raw,
/// lowercased article-number field for substring matching.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    id_field: Field,
    key_field: Field,
    content_field: Field,
}

impl KeywordIndex {
    /// Open the index at `index_path`, creating it if needed
    pub fn new(index_path: PathBuf, language: Language) -> Result<Self, KeywordIndexError> {
        if index_path.join("meta.json").exists() {
            Self::load(index_path, language)
        } else {
            Self::create(index_path, language)
        }
    }

    fn schema() -> Schema {
        let mut schema_builder = Schema::builder();

        schema_builder.add_u64_field("id", INDEXED | STORED);
        schema_builder.add_text_field("article_key", STRING | STORED);

        let content_indexing = TextFieldIndexing::default()
            .set_tokenizer(TEXT_ANALYZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        schema_builder.add_text_field(
            "content",
            TextOptions::default().set_indexing_options(content_indexing),
        );

        schema_builder.build()
    }

    fn create(index_path: PathBuf, language: Language) -> Result<Self, KeywordIndexError> {
        std::fs::create_dir_all(&index_path)?;

        let index = Index::create_in_dir(&index_path, Self::schema())
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        Self::from_index(index, language)
    }

    fn load(index_path: PathBuf, language: Language) -> Result<Self, KeywordIndexError> {
        let index = Index::open_in_dir(&index_path)
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        Self::from_index(index, language)
    }

    fn from_index(index: Index, language: Language) -> Result<Self, KeywordIndexError> {
        // Analyzers are not persisted with the index; register on every open.
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(40))
            .filter(LowerCaser)
            .filter(stop_words(language))
            .filter(question_words(language))
            .filter(Stemmer::new(language))
            .filter(AsciiFoldingFilter)
            .build();
        index.tokenizers().register(TEXT_ANALYZER, analyzer);

        let schema = index.schema();
        let field = |name: &str| {
            schema.get_field(name).map_err(|_| {
                KeywordIndexError::InitializationError(format!(
                    "Missing '{}' field in schema",
                    name
                ))
            })
        };
        let id_field = field("id")?;
        let key_field = field("article_key")?;
        let content_field = field("content")?;

        let writer: IndexWriter = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            id_field,
            key_field,
            content_field,
        })
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, IndexWriter>, KeywordIndexError> {
        self.writer
            .lock()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))
    }

    /// Insert or replace an article; visible after `commit`
    pub fn upsert(
        &self,
        id: u64,
        article_number: &str,
        content: &str,
    ) -> Result<(), KeywordIndexError> {
        let writer = self.writer()?;
        writer.delete_term(Term::from_field_u64(self.id_field, id));
        writer
            .add_document(doc!(
                self.id_field => id,
                self.key_field => article_number.to_lowercase(),
                self.content_field => content,
            ))
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
        Ok(())
    }

    /// Commit all pending changes and make them searchable
    pub fn commit(&self) -> Result<(), KeywordIndexError> {
        self.writer()?
            .commit()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        Ok(())
    }

    /// Remove every document (pending until `commit`)
    pub fn clear(&self) -> Result<(), KeywordIndexError> {
        self.writer()?
            .delete_all_documents()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
        Ok(())
    }

    /// Search the index
    ///
    /// # Returns
    /// Up to `limit` results, ordered by descending BM25 score
    pub fn search(
        &self,
        query: &KeywordQuery,
        limit: usize,
    ) -> Result<Vec<KeywordSearchResult>, KeywordIndexError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query = self.build_query(query)?;
        let searcher = self.reader.searcher();

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved_doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

            let id = retrieved_doc
                .get_first(self.id_field)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| {
                    KeywordIndexError::SearchError("Missing or invalid ID field".to_string())
                })?;

            results.push(KeywordSearchResult { id, score });
        }

        Ok(results)
    }

    fn build_query(&self, query: &KeywordQuery) -> Result<Box<dyn Query>, KeywordIndexError> {
        let mut parser = QueryParser::for_index(&self.index, vec![self.content_field]);

        let text_query = match &query.text {
            TextMatch::Phrase(phrase) => {
                let (q, _) = parser.parse_query_lenient(&format!("\"{}\"", phrase.replace('"', " ")));
                q
            }
            TextMatch::Terms(text) => {
                parser.set_conjunction_by_default();
                let (q, errors) = parser.parse_query_lenient(text);
                if !errors.is_empty() {
                    tracing::debug!("Lenient query parse dropped {} clause(s)", errors.len());
                }
                q
            }
        };

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Should, text_query)];

        if let Some(needle) = &query.key_substring {
            let needle = needle.trim().to_lowercase();
            if !needle.is_empty() {
                let pattern = format!(".*{}.*", regex::escape(&needle));
                let key_query = RegexQuery::from_pattern(&pattern, self.key_field)
                    .map_err(|e| KeywordIndexError::QueryError(e.to_string()))?;
                clauses.push((
                    Occur::Should,
                    Box::new(BoostQuery::new(Box::new(key_query), 0.0)),
                ));
            }
        }

        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    /// Get the number of documents in the index
    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
