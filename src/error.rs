use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Docent
#[derive(Error, Debug)]
pub enum DocentError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// A required provider capability was not configured (usually a missing API key)
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Embedding provider failed
    #[error("Embedding failed: {0}")]
    Embedding(#[source] ProviderError),

    /// Image-description provider failed
    #[error("Image description failed: {0}")]
    ImageDescription(#[source] ProviderError),

    /// Generation provider failed
    #[error("Generation failed: {0}")]
    Generation(#[source] ProviderError),

    /// Vectors of different dimensions were mixed. Fatal for the current index.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Input the pipeline cannot work with (empty document, PDF bytes, ...)
    #[error("Unsupported content: {0}")]
    UnsupportedContent(String),

    /// Session state errors
    #[error("Session error: {0}")]
    Session(String),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DocentError {
    /// The provider failure behind this error, if any
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            DocentError::Embedding(e)
            | DocentError::ImageDescription(e)
            | DocentError::Generation(e) => Some(e),
            _ => None,
        }
    }
}

/// Failure of an external provider call, classified by remediation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Credentials were rejected (HTTP 401/403)
    #[error("{provider} rejected the API key: {message}")]
    Auth { provider: String, message: String },

    /// Too many requests (HTTP 429)
    #[error("{provider} rate limit exceeded: {message}")]
    RateLimit { provider: String, message: String },

    /// Connection, timeout or upstream availability failures
    #[error("{provider} network error: {message}")]
    Network { provider: String, message: String },

    /// The provider answered with something unusable
    #[error("{provider} returned an invalid response: {message}")]
    Response { provider: String, message: String },
}

impl ProviderError {
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Auth { provider, .. }
            | ProviderError::RateLimit { provider, .. }
            | ProviderError::Network { provider, .. }
            | ProviderError::Response { provider, .. } => provider,
        }
    }

    /// User-facing hint for fixing the failure
    pub fn remediation(&self) -> String {
        match self {
            ProviderError::Auth { provider, .. } => {
                format!("Check your {} API key in the configuration.", provider)
            }
            ProviderError::RateLimit { .. } => {
                "Too many requests. Wait a moment and try again.".to_string()
            }
            ProviderError::Network { provider, .. } => format!(
                "Unable to reach {}. Check your internet connection and firewall/proxy settings, then try again.",
                provider
            ),
            ProviderError::Response { provider, .. } => {
                format!("{} returned an unexpected response. Try again later.", provider)
            }
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for Docent operations
pub type Result<T> = std::result::Result<T, DocentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_accessors() {
        let err = DocentError::Generation(ProviderError::RateLimit {
            provider: "Groq".to_string(),
            message: "slow down".to_string(),
        });

        let inner = err.provider_error().unwrap();
        assert_eq!(inner.provider(), "Groq");
        assert!(inner.remediation().contains("Wait"));
        assert!(err.to_string().contains("rate limit"));
    }

    #[test]
    fn test_non_provider_error() {
        let err = DocentError::DimensionMismatch {
            expected: 3,
            actual: 2,
        };
        assert!(err.provider_error().is_none());
        assert_eq!(err.to_string(), "Dimension mismatch: expected 3, got 2");
    }
}
