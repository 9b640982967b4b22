//! End-to-end retrieval over an on-disk statute corpus
//!
//! Embedding and reranking use deterministic stand-ins so no model download
//! is needed.

mod common;

use common::{engine, fixture, HashEmbedder, OfflineBackend, OverlapModel, RecordingGenerator};
use std::collections::HashSet;
use std::sync::Arc;
use themis::config::RetrievalConfig;
use themis::corpus::LocalCorpus;
use themis::generation::NO_SOURCES_MESSAGE;
use themis::retrieval::{EngineResponse, QueryMode, RagEngine, RetrievalMode, Source};

fn assert_descending(sources: &[Source]) {
    for pair in sources.windows(2) {
        assert!(
            pair[0].score >= pair[1].score,
            "{} ({}) ranked above {} ({})",
            pair[0].article_number,
            pair[0].score,
            pair[1].article_number,
            pair[1].score
        );
    }
}

#[tokio::test]
async fn test_naive_returns_three_nearest() {
    println!("\n=== Naive retrieval ===\n");

    let fixture = fixture();
    let engine = engine(&fixture, Arc::new(RecordingGenerator::default()));
    println!("✓ Corpus indexed: {} vectors", fixture.corpus.vector_count());

    let result = engine
        .retrieve("délai de rétractation pour un contrat à distance", RetrievalMode::Naive)
        .await;

    println!("✓ {} source(s) in {:?}", result.sources.len(), result.elapsed);
    assert_eq!(result.mode, RetrievalMode::Naive);
    assert_eq!(result.sources.len(), 3);
    assert_descending(&result.sources);
}

#[tokio::test]
async fn test_advanced_returns_unique_reranked_sources() {
    println!("\n=== Advanced retrieval ===\n");

    let fixture = fixture();
    let engine = engine(&fixture, Arc::new(RecordingGenerator::default()));

    let result = engine
        .retrieve("conformité du bien au contrat", RetrievalMode::Advanced)
        .await;

    for source in &result.sources {
        println!("  {} {:.4}", source.article_number, source.score);
    }

    assert!(!result.sources.is_empty());
    assert!(result.sources.len() <= 5);
    assert_descending(&result.sources);

    let unique: HashSet<_> = result.sources.iter().map(|s| &s.article_number).collect();
    assert_eq!(unique.len(), result.sources.len());

    // Calibrated scores are probabilities
    assert!(result.sources.iter().all(|s| s.score > 0.0 && s.score < 1.0));
    println!("✓ {} unique source(s)", unique.len());
}

#[tokio::test]
async fn test_cited_article_ranks_first() {
    let fixture = fixture();
    let engine = engine(&fixture, Arc::new(RecordingGenerator::default()));

    let result = engine
        .retrieve("Que prévoit l'article L. 217-3 ?", RetrievalMode::Advanced)
        .await;

    let top = result.sources.first().expect("at least one source");
    assert_eq!(top.article_number, "L217-3");
    assert!((top.score - 0.9999).abs() < 1e-6);
    assert_eq!(
        top.metadata.theme.as_deref(),
        Some("Garantie légale de conformité")
    );

    // Only the cited article carries the sentinel
    assert!(result.sources[1..].iter().all(|s| s.score < 0.9999));
    println!("✓ L217-3 pinned at {:.4}", top.score);
}

#[tokio::test]
async fn test_answer_is_grounded_in_retrieved_articles() {
    let fixture = fixture();
    let generator = Arc::new(RecordingGenerator::default());
    let engine = engine(&fixture, generator.clone());

    let answer = engine
        .answer("article L221-18 rétractation", RetrievalMode::Advanced)
        .await;

    assert_eq!(generator.call_count(), 1);
    assert_eq!(answer.answer, "Selon les articles fournis...");
    assert!(answer.processing_time >= 0.0);

    let prompts = generator.prompts.lock().unwrap();
    for source in &answer.sources {
        assert!(
            prompts[0].contains(&source.article_number),
            "{} missing from allowed citations",
            source.article_number
        );
    }
}

#[tokio::test]
async fn test_offline_backends_fail_open() {
    println!("\n=== Fail-open ===\n");

    let fixture = fixture();
    let generator = Arc::new(RecordingGenerator::default());
    let engine = RagEngine::new(
        Arc::new(HashEmbedder),
        Arc::new(OfflineBackend),
        Arc::new(OfflineBackend),
        Arc::new(OverlapModel),
        generator.clone(),
        fixture.config.retrieval.clone(),
    );

    for mode in [RetrievalMode::Naive, RetrievalMode::Advanced] {
        let answer = engine.answer("délai de livraison", mode).await;
        assert!(answer.sources.is_empty());
        assert_eq!(answer.answer, NO_SOURCES_MESSAGE);
        println!("✓ {} degraded to no sources", mode);
    }

    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn test_advanced_survives_vector_outage() {
    let fixture = fixture();
    let engine = RagEngine::new(
        Arc::new(HashEmbedder),
        Arc::new(OfflineBackend),
        fixture.corpus.clone(),
        Arc::new(OverlapModel),
        Arc::new(RecordingGenerator::default()),
        fixture.config.retrieval.clone(),
    );

    let result = engine.retrieve("L216-1", RetrievalMode::Advanced).await;
    assert_eq!(
        result.sources.first().map(|s| s.article_number.as_str()),
        Some("L216-1")
    );
}

#[tokio::test]
async fn test_keyword_leg_answers_plain_questions() {
    let fixture = fixture();
    let engine = RagEngine::new(
        Arc::new(HashEmbedder),
        Arc::new(OfflineBackend),
        fixture.corpus.clone(),
        Arc::new(OverlapModel),
        Arc::new(RecordingGenerator::default()),
        fixture.config.retrieval.clone(),
    );

    let result = engine
        .retrieve("Quel est le délai de rétractation ?", RetrievalMode::Advanced)
        .await;
    assert_eq!(
        result.sources.first().map(|s| s.article_number.as_str()),
        Some("L221-18")
    );
    println!("✓ Keyword search alone found {} source(s)", result.sources.len());
}

#[tokio::test]
async fn test_retrieval_is_deterministic() {
    let fixture = fixture();
    let engine = engine(&fixture, Arc::new(RecordingGenerator::default()));
    let query = "clauses abusives entre professionnels et consommateurs";

    for mode in [RetrievalMode::Naive, RetrievalMode::Advanced] {
        let first = engine.retrieve(query, mode).await;
        let second = engine.retrieve(query, mode).await;

        let ranked = |sources: &[Source]| -> Vec<(String, f32)> {
            sources
                .iter()
                .map(|s| (s.article_number.clone(), s.score))
                .collect()
        };
        assert_eq!(ranked(&first.sources), ranked(&second.sources));
    }
}

#[tokio::test]
async fn test_compare_runs_both_pipelines() {
    let fixture = fixture();
    let generator = Arc::new(RecordingGenerator::default());
    let engine = engine(&fixture, generator.clone());

    let response = engine
        .respond("livraison du bien en retard", QueryMode::Compare)
        .await;

    match response {
        EngineResponse::Compare {
            comparison,
            processing_time,
        } => {
            assert_eq!(comparison.naive.sources.len(), 3);
            assert!(comparison.advanced.sources.len() <= 5);
            assert!(processing_time >= comparison.naive.processing_time);
            assert!(processing_time >= comparison.advanced.processing_time);
        }
        EngineResponse::Single(_) => panic!("expected a comparison"),
    }

    assert_eq!(generator.call_count(), 2);
}

async fn naive_numbers(corpus: Arc<LocalCorpus>, config: &RetrievalConfig) -> Vec<String> {
    let engine = RagEngine::new(
        Arc::new(HashEmbedder),
        corpus.clone(),
        corpus,
        Arc::new(OverlapModel),
        Arc::new(RecordingGenerator::default()),
        config.clone(),
    );
    let mut numbers: Vec<String> = engine
        .retrieve("quatorze jours", RetrievalMode::Naive)
        .await
        .sources
        .into_iter()
        .map(|s| s.article_number)
        .collect();
    numbers.sort();
    numbers
}

#[tokio::test]
async fn test_reopened_corpus_serves_same_results() {
    let common::Fixture {
        temp: _temp,
        config,
        corpus,
    } = fixture();
    let counts = (corpus.vector_count(), corpus.keyword_count());

    let before = naive_numbers(corpus, &config.retrieval).await;

    // The keyword index writer lock is released with the first corpus
    let reopened = Arc::new(LocalCorpus::open(&config, common::DIMENSION).unwrap());
    assert_eq!((reopened.vector_count(), reopened.keyword_count()), counts);

    let after = naive_numbers(reopened, &config.retrieval).await;
    assert_eq!(before, after);
    println!("✓ Indexes rebuilt from the store: {:?}", after);
}
