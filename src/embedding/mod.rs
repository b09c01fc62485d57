/// Embedding & Indexing
///
/// This module turns chunks into vectors and answers similarity queries.
/// Architecture:
/// - EmbeddingProvider trait for abstraction
/// - JinaEmbeddingProvider for hosted embeddings (jina-embeddings-v4)
/// - FastEmbedProvider for local embeddings (`local-models` feature)
/// - Flat cosine index with tag filtering
/// - Batch processing for large documents
mod batch;
mod provider;
mod vector_index;

pub use batch::{BatchEmbedder, BatchResult};
#[cfg(feature = "local-models")]
pub use provider::FastEmbedProvider;
pub use provider::{
    EmbeddingProvider, JinaEmbeddingProvider, JINA_DEFAULT_MODEL, JINA_EMBEDDINGS_URL,
};
pub use vector_index::{SearchHit, VectorIndex};
