use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{DocentError, Result, ValidationError};

/// Embedding providers this build knows how to construct
const EMBEDDING_PROVIDERS: &[&str] = &["jina", "fastembed"];

/// Rerankers selectable in `retrieval.reranker`
const RERANKERS: &[&str] = &["lexical", "none", "cross-encoder"];

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem before failing
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_vision(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_context(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DocentError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.embedding.provider;
        if !EMBEDDING_PROVIDERS.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    EMBEDDING_PROVIDERS, provider
                ),
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.dimension == Some(0) {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Dimension must be greater than 0 when set",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        Self::validate_key_env("embedding.api_key_env", &config.embedding.api_key_env, errors);
        Self::validate_timeout("embedding.timeout_secs", config.embedding.timeout_secs, errors);
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.llm.provider != "groq" {
            errors.push(ValidationError::new(
                "llm.provider",
                format!("Provider must be 'groq', got '{}'", config.llm.provider),
            ));
        }

        if config.llm.model.is_empty() {
            errors.push(ValidationError::new("llm.model", "Model name cannot be empty"));
        }

        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        Self::validate_key_env("llm.api_key_env", &config.llm.api_key_env, errors);
        Self::validate_timeout("llm.timeout_secs", config.llm.timeout_secs, errors);
    }

    fn validate_vision(config: &Config, errors: &mut Vec<ValidationError>) {
        if !config.vision.enabled {
            return;
        }

        if config.vision.model.is_empty() {
            errors.push(ValidationError::new(
                "vision.model",
                "Model name cannot be empty",
            ));
        }

        Self::validate_key_env("vision.api_key_env", &config.vision.api_key_env, errors);
        Self::validate_timeout("vision.timeout_secs", config.vision.timeout_secs, errors);
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let chunking = &config.chunking;
        if chunking.max_unit_size == 0 {
            errors.push(ValidationError::new(
                "chunking.max_unit_size",
                "Max unit size must be greater than 0",
            ));
        } else if chunking.overlap >= chunking.max_unit_size {
            errors.push(ValidationError::new(
                "chunking.overlap",
                format!(
                    "Overlap ({}) must be smaller than max_unit_size ({})",
                    chunking.overlap, chunking.max_unit_size
                ),
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }

        let reranker = &config.retrieval.reranker;
        if !RERANKERS.contains(&reranker.as_str()) {
            errors.push(ValidationError::new(
                "retrieval.reranker",
                format!("Reranker must be one of {:?}, got '{}'", RERANKERS, reranker),
            ));
        }
    }

    fn validate_context(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.context.max_units == 0 {
            errors.push(ValidationError::new(
                "context.max_units",
                "Max units must be greater than 0",
            ));
        }
    }

    fn validate_key_env(path: &str, name: &str, errors: &mut Vec<ValidationError>) {
        // Only the variable name is checked; an unset key just leaves the capability absent
        if name.trim().is_empty() {
            errors.push(ValidationError::new(
                path,
                "API key environment variable name cannot be empty",
            ));
        }
    }

    fn validate_timeout(path: &str, secs: u64, errors: &mut Vec<ValidationError>) {
        if secs == 0 {
            errors.push(ValidationError::new(path, "Timeout must be greater than 0"));
        }
    }
}
