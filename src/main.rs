use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use themis::cli::{Cli, Commands, ConfigAction, ModeArg};
use themis::config::{expand_path, Config};
use themis::corpus::{load_entries, Ingestor, LocalCorpus};
use themis::embedding::{EmbeddingProvider, LazyEmbeddingProvider};
use themis::error::{Result, ThemisError};
use themis::generation::OpenAiGenerator;
use themis::retrieval::{EngineResponse, FastEmbedRelevanceModel, PipelineAnswer, RagEngine};

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Serve { bind } => {
            cmd_serve(cli.config, bind).context("serve failed")?;
        }
        Commands::Ask { query, mode, json } => {
            cmd_ask(cli.config, &query, mode, json).context("ask failed")?;
        }
        Commands::Index { file } => {
            cmd_index(cli.config, &file)
                .with_context(|| format!("indexing {} failed", file.display()))?;
        }
        Commands::Status => {
            cmd_status(cli.config).context("status failed")?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "themis=debug" } else { "themis=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| ThemisError::Io {
        source: e,
        context: "Failed to start async runtime".to_string(),
    })
}

fn open_corpus(config: &Config) -> Result<(Arc<dyn EmbeddingProvider>, Arc<LocalCorpus>)> {
    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(LazyEmbeddingProvider::new(&config.embedding.model)?);
    let corpus = Arc::new(LocalCorpus::open(config, embedder.dimension())?);
    Ok((embedder, corpus))
}

/// Wire the stores, models and generation client into one engine
fn build_engine(config: &Config) -> Result<Arc<RagEngine>> {
    let (embedder, corpus) = open_corpus(config)?;

    let reranker = FastEmbedRelevanceModel::new(&config.reranker.model)
        .map_err(|e| ThemisError::Config(e.to_string()))?;
    let generator =
        OpenAiGenerator::from_config(&config.llm).map_err(|e| ThemisError::Config(e.to_string()))?;

    tracing::info!(
        "Engine ready: embedding={}, reranker={}, llm={}",
        config.embedding.model,
        config.reranker.model,
        config.llm.model
    );

    Ok(Arc::new(RagEngine::new(
        embedder,
        corpus.clone(),
        corpus,
        Arc::new(reranker),
        Arc::new(generator),
        config.retrieval.clone(),
    )))
}

fn cmd_serve(config_path: Option<PathBuf>, bind: Option<String>) -> Result<()> {
    let config = load_config(config_path)?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let engine = build_engine(&config)?;

    runtime()?.block_on(themis::api::serve(engine, &bind))
}

fn cmd_ask(config_path: Option<PathBuf>, query: &str, mode: ModeArg, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = build_engine(&config)?;

    let response = runtime()?.block_on(engine.respond(query, mode.into()));

    if json {
        let out = serde_json::to_string_pretty(&response).map_err(|e| ThemisError::Json {
            source: e,
            context: "Failed to serialize response".to_string(),
        })?;
        println!("{}", out);
        return Ok(());
    }

    match response {
        EngineResponse::Single(answer) => print_answer(&answer),
        EngineResponse::Compare {
            comparison,
            processing_time,
        } => {
            println!("=== naive ===");
            print_answer(&comparison.naive);
            println!("\n=== advanced ===");
            print_answer(&comparison.advanced);
            println!("\nTotal: {:.2}s", processing_time);
        }
    }

    Ok(())
}

fn print_answer(answer: &PipelineAnswer) {
    println!("{}\n", answer.answer);
    println!("Sources ({}):", answer.sources.len());
    for (rank, source) in answer.sources.iter().enumerate() {
        println!(
            "  {}. {} [{:.4}] {}",
            rank + 1,
            source.article_number,
            source.score,
            source.preview(80)
        );
    }
    println!("({:.2}s)", answer.processing_time);
}

fn cmd_index(config_path: Option<PathBuf>, file: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let entries = load_entries(file)?;
    println!("Loaded {} entries from {}", entries.len(), file.display());

    let (embedder, corpus) = open_corpus(&config)?;
    let ingestor = Ingestor::new(embedder, config.embedding.batch_size);
    let report = ingestor.ingest(&corpus, entries)?;

    println!("✓ Indexed {} article(s) in {}ms", report.processed, report.duration_ms);
    if report.failed > 0 {
        println!("  {} entries skipped (blank number or content)", report.failed);
    }
    if report.unembedded > 0 {
        println!(
            "  {} article(s) stored without embedding (keyword search only)",
            report.unembedded
        );
    }

    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let data_dir = expand_path(&config.storage.data_dir)?;
    let (_, corpus) = open_corpus(&config)?;
    let stats = corpus.database().stats()?;

    println!("Themis Status");
    println!("=============");
    println!("\nData directory: {}", data_dir.display());
    println!("\nArticles: {} ({} codes)", stats.article_count, stats.code_count);
    println!("  With embedding: {}", stats.embedded_count);
    println!("  Vector index:   {}", corpus.vector_count());
    println!("  Keyword index:  {}", corpus.keyword_count());
    println!("\nModels:");
    println!("  Embedding: {}", config.embedding.model);
    println!("  Reranker:  {}", config.reranker.model);
    println!("  LLM:       {} ({})", config.llm.model, config.llm.provider);

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ThemisError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'themis config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path)
}
