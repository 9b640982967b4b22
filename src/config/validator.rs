use crate::config::Config;
use crate::error::{Result, ThemisError, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every violation
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_database(config, &mut errors);
        Self::validate_models(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_llm(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ThemisError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn validate_database(config: &Config, errors: &mut Vec<ValidationError>) {
        let db = &config.database;
        if db.max_size == 0 {
            errors.push(ValidationError::new(
                "database.max_size",
                "Pool size must be greater than 0",
            ));
        }
        if db.min_idle > db.max_size {
            errors.push(ValidationError::new(
                "database.min_idle",
                format!(
                    "min_idle ({}) cannot exceed max_size ({})",
                    db.min_idle, db.max_size
                ),
            ));
        }
    }

    fn validate_models(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.reranker.model.is_empty() {
            errors.push(ValidationError::new(
                "reranker.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        let idx = &config.indexing;
        for (path, value) in [
            ("indexing.hnsw_m", idx.hnsw_m),
            ("indexing.hnsw_ef_construction", idx.hnsw_ef_construction),
            ("indexing.hnsw_ef_search", idx.hnsw_ef_search),
            ("indexing.max_elements", idx.max_elements),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(path, "Value must be greater than 0"));
            }
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let r = &config.retrieval;

        if r.naive_limit == 0 || r.candidate_limit == 0 || r.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval",
                "naive_limit, candidate_limit and top_k must be greater than 0",
            ));
        }

        if r.naive_limit > r.candidate_limit {
            errors.push(ValidationError::new(
                "retrieval.naive_limit",
                format!(
                    "naive_limit ({}) cannot exceed candidate_limit ({})",
                    r.naive_limit, r.candidate_limit
                ),
            ));
        }

        if r.top_k > r.candidate_limit {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                format!(
                    "top_k ({}) cannot exceed candidate_limit ({})",
                    r.top_k, r.candidate_limit
                ),
            ));
        }

        // A boosted hit must always clear the threshold, whatever its lexical rank.
        if r.boost_threshold >= r.exact_match_boost {
            errors.push(ValidationError::new(
                "retrieval.boost_threshold",
                format!(
                    "boost_threshold ({}) must be below exact_match_boost ({})",
                    r.boost_threshold, r.exact_match_boost
                ),
            ));
        }

        if !(r.exact_match_score > 0.0 && r.exact_match_score < 1.0) {
            errors.push(ValidationError::new(
                "retrieval.exact_match_score",
                format!(
                    "exact_match_score must be in (0, 1), got {}",
                    r.exact_match_score
                ),
            ));
        }

        if crate::embedding::stemmer_language(&r.text_language).is_none() {
            errors.push(ValidationError::new(
                "retrieval.text_language",
                format!("Unsupported text language '{}'", r.text_language),
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        let provider = &config.llm.provider;
        let valid_providers = ["openai", "groq", "ollama"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }

        if config.llm.model.is_empty() {
            errors.push(ValidationError::new("llm.model", "Model name cannot be empty"));
        }

        if config.llm.base_url.is_empty() {
            errors.push(ValidationError::new("llm.base_url", "Base URL cannot be empty"));
        }
    }
}
