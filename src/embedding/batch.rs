/// Batched embedding of a document's chunks
use super::EmbeddingProvider;
use crate::error::ProviderError;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Result of embedding one document
#[derive(Debug)]
pub struct BatchResult {
    /// One vector per input text, in input order
    pub vectors: Vec<Vec<f32>>,
    /// Number of provider requests made
    pub batches: usize,
    pub duration_ms: u64,
}

/// Splits texts into provider-sized batches and embeds them in order
///
/// Batches run one after another. The first failure is returned as-is;
/// nothing is retried.
pub struct BatchEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl BatchEmbedder {
    /// Create a new batch embedder
    ///
    /// # Arguments
    /// * `provider` - Embedding provider
    /// * `batch_size` - Maximum number of texts per provider request (0 is treated as 1)
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed all texts, preserving order
    pub fn embed_all(&self, texts: &[String]) -> Result<BatchResult, ProviderError> {
        let start = Instant::now();
        let mut vectors = Vec::with_capacity(texts.len());
        let mut batches = 0;

        for batch in texts.chunks(self.batch_size) {
            let embeddings = self.provider.embed_batch(batch)?;

            if embeddings.len() != batch.len() {
                return Err(ProviderError::Response {
                    provider: self.provider.model_name().to_string(),
                    message: format!(
                        "Embedding count mismatch: expected {}, got {}",
                        batch.len(),
                        embeddings.len()
                    ),
                });
            }

            batches += 1;
            debug!("Embedded batch {} ({} texts)", batches, batch.len());
            vectors.extend(embeddings);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Embedded {} texts in {} batches with {} ({}ms)",
            texts.len(),
            batches,
            self.provider.model_name(),
            duration_ms
        );

        Ok(BatchResult {
            vectors,
            batches,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Embeds a text as `[len, batch number]` and records batch sizes
    struct RecordingProvider {
        calls: Mutex<Vec<usize>>,
        drop_last: bool,
    }

    impl RecordingProvider {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                drop_last: false,
            }
        }
    }

    impl EmbeddingProvider for RecordingProvider {
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(texts.len());
            let batch = calls.len() as f32;

            let mut out: Vec<Vec<f32>> =
                texts.iter().map(|t| vec![t.len() as f32, batch]).collect();
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }

        fn dimension(&self) -> Option<usize> {
            Some(2)
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    #[test]
    fn test_batches_preserve_order() {
        let provider = Arc::new(RecordingProvider::new());
        let embedder = BatchEmbedder::new(provider.clone(), 2);

        let texts: Vec<String> = ["a", "bb", "ccc", "dddd", "eeeee"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let result = embedder.embed_all(&texts).unwrap();

        assert_eq!(result.batches, 3);
        assert_eq!(*provider.calls.lock().unwrap(), vec![2, 2, 1]);
        let lengths: Vec<f32> = result.vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(result.vectors[4][1], 3.0);
    }

    #[test]
    fn test_empty_input() {
        let embedder = BatchEmbedder::new(Arc::new(RecordingProvider::new()), 8);
        let result = embedder.embed_all(&[]).unwrap();
        assert!(result.vectors.is_empty());
        assert_eq!(result.batches, 0);
    }

    #[test]
    fn test_count_mismatch_is_error() {
        let provider = Arc::new(RecordingProvider {
            calls: Mutex::new(Vec::new()),
            drop_last: true,
        });
        let embedder = BatchEmbedder::new(provider, 4);

        let result = embedder.embed_all(&["one".to_string(), "two".to_string()]);
        assert!(matches!(result, Err(ProviderError::Response { .. })));
    }
}
