/// Embedding provider trait and implementations
use crate::error::ProviderError;
use crate::http::JsonClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Jina embeddings endpoint
pub const JINA_EMBEDDINGS_URL: &str = "https://api.jina.ai/v1/embeddings";

/// Default Jina embedding model
pub const JINA_DEFAULT_MODEL: &str = "jina-embeddings-v4";

/// Trait for embedding providers
///
/// Implementations must be order-preserving: one vector per input text, in
/// input order.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for multiple texts
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Response {
                provider: self.model_name().to_string(),
                message: "No embedding returned".to_string(),
            })
    }

    /// Embedding dimension, when known ahead of time
    fn dimension(&self) -> Option<usize>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Jina AI embeddings over HTTPS
pub struct JinaEmbeddingProvider {
    client: JsonClient,
    url: String,
    model: String,
    dimension: Option<usize>,
}

impl JinaEmbeddingProvider {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: JsonClient::new("Jina", api_key, timeout)?,
            url: JINA_EMBEDDINGS_URL.to_string(),
            model: JINA_DEFAULT_MODEL.to_string(),
            dimension: None,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Expected output dimension; responses are checked against it
    pub fn with_dimension(mut self, dimension: Option<usize>) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Put response vectors back in request order and check the count
fn order_embeddings(
    provider: &str,
    response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    if response.data.len() != expected {
        return Err(ProviderError::Response {
            provider: provider.to_string(),
            message: format!(
                "Embedding count mismatch: expected {}, got {}",
                expected,
                response.data.len()
            ),
        });
    }

    let mut data = response.data;
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }

    Ok(data.into_iter().map(|d| d.embedding).collect())
}

impl EmbeddingProvider for JinaEmbeddingProvider {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(
            "Requesting {} embeddings from {} ({})",
            texts.len(),
            self.client.provider(),
            self.model
        );

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let response: EmbeddingResponse = self.client.post(&self.url, &request)?;

        order_embeddings(self.client.provider(), response, texts.len())
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(feature = "local-models")]
pub use local::FastEmbedProvider;

#[cfg(feature = "local-models")]
mod local {
    use super::EmbeddingProvider;
    use crate::error::ProviderError;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

    /// FastEmbed provider for local embedding generation
    ///
    /// Models are downloaded on first use to `~/.cache/huggingface/`.
    pub struct FastEmbedProvider {
        model: TextEmbedding,
        model_name: String,
        dimension: usize,
    }

    impl FastEmbedProvider {
        pub fn new(model_name: &str) -> Result<Self, ProviderError> {
            let (embedding_model, dimension) = match model_name {
                "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
                "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
                "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
                _ => {
                    return Err(ProviderError::Response {
                        provider: "FastEmbed".to_string(),
                        message: format!(
                            "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                            model_name
                        ),
                    });
                }
            };

            tracing::info!(
                "Initializing local embedding model: {} ({}D)",
                model_name,
                dimension
            );

            let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);
            let model = TextEmbedding::try_new(init_options).map_err(|e| ProviderError::Response {
                provider: "FastEmbed".to_string(),
                message: format!("Model initialization failed: {}", e),
            })?;

            Ok(Self {
                model,
                model_name: model_name.to_string(),
                dimension,
            })
        }
    }

    impl EmbeddingProvider for FastEmbedProvider {
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            self.model
                .embed(texts.to_vec(), None)
                .map_err(|e| ProviderError::Response {
                    provider: "FastEmbed".to_string(),
                    message: format!("Embedding generation failed: {}", e),
                })
        }

        fn dimension(&self) -> Option<usize> {
            Some(self.dimension)
        }

        fn model_name(&self) -> &str {
            &self.model_name
        }
    }

}
