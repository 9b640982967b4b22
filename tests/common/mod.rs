//! Deterministic stand-ins for the models, and a small statute corpus
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use themis::config::Config;
use themis::corpus::{ArticleEntry, Ingestor, LocalCorpus};
use themis::embedding::{EmbeddingError, EmbeddingProvider, KeywordQuery};
use themis::generation::{AnswerGenerator, GenerationError};
use themis::retrieval::{
    LexicalBackend, RagEngine, RelevanceModel, RerankError, SearchError, Source, VectorBackend,
};

pub const DIMENSION: usize = 64;

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_string)
        .collect()
}

fn bucket(token: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMENSION as u64) as usize
}

/// Normalized bag-of-words vector over hashed buckets
pub struct HashEmbedder;

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; DIMENSION];
        for token in tokens(text) {
            vector[bucket(&token)] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err(EmbeddingError::InvalidInput("No tokens".to_string()));
        }
        Ok(vector.into_iter().map(|v| v / norm).collect())
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn model_name(&self) -> &str {
        "hash-bow"
    }
}

/// Logit = shared token count minus two
pub struct OverlapModel;

impl RelevanceModel for OverlapModel {
    fn score_pairs(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>, RerankError> {
        let query_tokens = tokens(query);
        Ok(documents
            .iter()
            .map(|doc| {
                let doc_tokens = tokens(doc);
                let shared = query_tokens.iter().filter(|t| doc_tokens.contains(t)).count();
                shared as f32 - 2.0
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "overlap"
    }
}

/// Records how many sources each completion was given
#[derive(Default)]
pub struct RecordingGenerator {
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerGenerator for RecordingGenerator {
    async fn complete(&self, system_prompt: &str, _user: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(system_prompt.to_string());
        Ok("Selon les articles fournis...".to_string())
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

/// Backend that always fails
pub struct OfflineBackend;

impl VectorBackend for OfflineBackend {
    fn nearest(&self, _embedding: &[f32], _limit: usize) -> Result<Vec<Source>, SearchError> {
        Err(SearchError::Backend("connection refused".to_string()))
    }
}

impl LexicalBackend for OfflineBackend {
    fn lexical(&self, _query: &KeywordQuery, _limit: usize) -> Result<Vec<Source>, SearchError> {
        Err(SearchError::Backend("connection refused".to_string()))
    }
}

fn entry(number: &str, theme: &str, content: &str) -> ArticleEntry {
    ArticleEntry {
        code_source: "Code Consommation".to_string(),
        article_number: number.to_string(),
        content: content.to_string(),
        metadata: Some(serde_json::json!({"theme": theme, "type": "loi"})),
    }
}

pub fn statutes() -> Vec<ArticleEntry> {
    vec![
        entry("L217-3", "Garantie légale de conformité", "Le vendeur délivre un bien conforme au contrat ainsi qu'aux critères énoncés. Il répond des défauts de conformité existant au moment de la délivrance du bien."),
        entry("L217-4", "Garantie légale de conformité", "Le bien est conforme au contrat s'il correspond à la description, au type, à la quantité et à la qualité, notamment en ce qui concerne la fonctionnalité, la compatibilité, l'interopérabilité."),
        entry("L217-5", "Garantie légale de conformité", "En plus des critères de conformité au contrat, le bien est conforme s'il est propre à l'usage habituellement attendu d'un bien de même type."),
        entry("L217-7", "Garantie légale de conformité", "Les défauts de conformité qui apparaissent dans un délai de vingt-quatre mois à compter de la délivrance du bien sont présumés exister au moment de la délivrance."),
        entry("L221-18", "Droit de rétractation", "Le consommateur dispose d'un délai de quatorze jours pour exercer son droit de rétractation d'un contrat conclu à distance, à la suite d'un démarchage téléphonique ou hors établissement."),
        entry("L221-28", "Droit de rétractation", "Le droit de rétractation ne peut être exercé pour les contrats de fourniture de biens confectionnés selon les spécifications du consommateur ou nettement personnalisés."),
        entry("L221-5", "Information précontractuelle", "Préalablement à la conclusion d'un contrat de vente à distance, le professionnel communique au consommateur les informations relatives au droit de rétractation."),
        entry("L216-1", "Livraison", "Le professionnel livre le bien ou fournit le service à la date ou dans le délai indiqué au consommateur. A défaut, il livre le bien au plus tard trente jours après la conclusion du contrat."),
        entry("L216-2", "Livraison", "En cas de manquement du professionnel à son obligation de livraison du bien à la date ou à l'expiration du délai, le consommateur peut résoudre le contrat."),
        entry("L211-1", "Clauses abusives", "Les contrats proposés par les professionnels aux consommateurs doivent être présentés et rédigés de façon claire et compréhensible."),
        entry("L212-1", "Clauses abusives", "Dans les contrats conclus entre professionnels et consommateurs, sont abusives les clauses qui ont pour objet de créer un déséquilibre significatif entre les droits et obligations des parties."),
        entry("R211-2", "Information", "Les caractères utilisés dans les contrats doivent avoir une hauteur au moins égale au corps huit."),
    ]
}

/// Corpus on disk, populated with `statutes()`
pub struct Fixture {
    pub temp: TempDir,
    pub config: Config,
    pub corpus: Arc<LocalCorpus>,
}

pub fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage.data_dir = temp.path().to_path_buf();

    let corpus = Arc::new(LocalCorpus::open(&config, DIMENSION).unwrap());
    let report = Ingestor::new(Arc::new(HashEmbedder), 4)
        .ingest(&corpus, statutes())
        .unwrap();
    assert_eq!(report.processed, statutes().len());

    Fixture {
        temp,
        config,
        corpus,
    }
}

pub fn engine(fixture: &Fixture, generator: Arc<RecordingGenerator>) -> RagEngine {
    RagEngine::new(
        Arc::new(HashEmbedder),
        fixture.corpus.clone(),
        fixture.corpus.clone(),
        Arc::new(OverlapModel),
        generator,
        fixture.config.retrieval.clone(),
    )
}
