//! Configuration management for Docent
//!
//! Configuration is a TOML file with one section per pipeline stage, named
//! profiles, and `DOCENT_SECTION__KEY` environment overrides. A missing file
//! means defaults.

use crate::error::{DocentError, Result};
use crate::retrieval::RetrievalScope;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Schema version written by this build
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String, // "jina" or "fastembed"
    pub model: String,
    /// Expected vector dimension; unset accepts whatever the model returns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
    pub batch_size: usize,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "jina".to_string(),
            model: crate::embedding::JINA_DEFAULT_MODEL.to_string(),
            dimension: None,
            batch_size: 32,
            api_key_env: "JINA_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            model: crate::generation::DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            timeout_secs: 60,
        }
    }
}

/// What ingestion does when the image cannot be described
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionFailurePolicy {
    /// Fail the whole ingestion
    #[default]
    Abort,
    /// Index the document without the image and warn
    Skip,
}

/// Image description configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub enabled: bool,
    pub api_key_env: String,
    pub model: String,
    pub on_failure: VisionFailurePolicy,
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: "GROQ_API_KEY".to_string(),
            model: crate::vision::DEFAULT_VISION_MODEL.to_string(),
            on_failure: VisionFailurePolicy::Abort,
            timeout_secs: 60,
        }
    }
}

/// Chunking configuration (sizes in characters)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_unit_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_unit_size: 500,
            overlap: 50,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub reranker: String, // "lexical", "none" or "cross-encoder"
    pub scope: RetrievalScope,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            reranker: "lexical".to_string(),
            scope: RetrievalScope::All,
        }
    }
}

/// Context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_units: usize,
    /// Contexts shorter than this (in characters) raise a sparse-context warning
    pub min_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_units: 5,
            min_chars: 100,
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision_enabled: Option<bool>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DocentError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| DocentError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise start from defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        tracing::debug!("No config at {}, using defaults", path.display());
        let mut config = Self::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocentError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| DocentError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| DocentError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(provider) = overrides.embedding_provider {
            self.embedding.provider = provider;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(reranker) = overrides.reranker {
            self.retrieval.reranker = reranker;
        }
        if let Some(top_k) = overrides.top_k {
            self.retrieval.top_k = top_k;
        }
        if let Some(enabled) = overrides.vision_enabled {
            self.vision.enabled = enabled;
        }

        ConfigValidator::validate(self)
    }

    /// Apply environment variable overrides
    /// Environment variables in format: DOCENT_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `DOCENT_`-prefixed overrides from an arbitrary source
    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("DOCENT_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "EMBEDDING__PROVIDER" => self.embedding.provider = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__DIMENSION" => self.embedding.dimension = Some(parse_value(path, value)?),
            "EMBEDDING__BATCH_SIZE" => self.embedding.batch_size = parse_value(path, value)?,
            "LLM__MODEL" => self.llm.model = value.to_string(),
            "LLM__TEMPERATURE" => self.llm.temperature = parse_value(path, value)?,
            "VISION__ENABLED" => self.vision.enabled = parse_value(path, value)?,
            "VISION__ON_FAILURE" => {
                self.vision.on_failure = match value.to_lowercase().as_str() {
                    "abort" => VisionFailurePolicy::Abort,
                    "skip" => VisionFailurePolicy::Skip,
                    _ => {
                        return Err(DocentError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Expected 'abort' or 'skip', got '{}'", value),
                        })
                    }
                }
            }
            "CHUNKING__MAX_UNIT_SIZE" => self.chunking.max_unit_size = parse_value(path, value)?,
            "CHUNKING__OVERLAP" => self.chunking.overlap = parse_value(path, value)?,
            "RETRIEVAL__TOP_K" => self.retrieval.top_k = parse_value(path, value)?,
            "RETRIEVAL__RERANKER" => self.retrieval.reranker = value.to_string(),
            "RETRIEVAL__SCOPE" => {
                self.retrieval.scope =
                    value
                        .parse()
                        .map_err(|message| DocentError::InvalidConfigValue {
                            path: path.to_string(),
                            message,
                        })?
            }
            "CONTEXT__MAX_UNITS" => self.context.max_units = parse_value(path, value)?,
            "CONTEXT__MIN_CHARS" => self.context.min_chars = parse_value(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| DocentError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("docent").join("config.toml"))
    }
}

fn parse_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DocentError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            vision: VisionConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            context: ContextConfig::default(),
            profiles: HashMap::new(),
        }
    }
}
