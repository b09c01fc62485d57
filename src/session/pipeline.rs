//! Ingestion and question answering over a [`Session`]
//!
//! Ingestion: chunk, describe the optional image, embed in batches, check
//! dimensions, build the index. Any failure leaves the session `Idle`.
//!
//! Questions: embed, search, rerank, assemble, answer. Provider failures turn
//! into a fallback answer that is still recorded, so the session stays usable.
//! A dimension mismatch is the exception: the index is unusable and dropped.
use super::{AnswerStatus, Document, DocumentInfo, Session, SessionState};
use crate::chunking::{Chunk, ChunkTag, Chunker};
use crate::config::{Config, VisionFailurePolicy};
use crate::embedding::{BatchEmbedder, EmbeddingProvider, JinaEmbeddingProvider, VectorIndex};
use crate::error::{DocentError, ProviderError, Result};
use crate::generation::{
    is_supported_model, GenerationProvider, GroqChatProvider, GroundedAnswerer,
    NOT_ENOUGH_INFORMATION,
};
use crate::retrieval::{
    AssembledContext, ContextAssembler, LexicalReranker, PassthroughReranker, RankingSource,
    Reranker, RetrievalScope, RetrievedChunk,
};
use crate::vision::{GroqVisionProvider, ImageDescriber, ImageInput};
use chrono::Utc;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Prefix of answers produced when a provider fails during a question
pub const FALLBACK_PREFIX: &str = "Error: Unable to generate answer.";

/// Longest error excerpt embedded in a fallback answer, in characters
const FALLBACK_ERROR_CHARS: usize = 100;

/// External providers available to the pipeline
///
/// A missing provider is a configuration state: ingestion reports
/// [`DocentError::NotConfigured`] instead of failing later.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub embedder: Option<Arc<dyn EmbeddingProvider>>,
    pub generator: Option<Arc<dyn GenerationProvider>>,
    pub describer: Option<Arc<dyn ImageDescriber>>,
}

impl Capabilities {
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn GenerationProvider>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_describer(mut self, describer: Arc<dyn ImageDescriber>) -> Self {
        self.describer = Some(describer);
        self
    }

    /// Build providers from configuration and API keys in the environment
    ///
    /// A provider whose key variable is unset or empty is left out.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut capabilities = Self::default();

        capabilities.embedder = match config.embedding.provider.as_str() {
            "jina" => match api_key(&config.embedding.api_key_env) {
                Some(key) => {
                    let provider = JinaEmbeddingProvider::new(
                        key,
                        Duration::from_secs(config.embedding.timeout_secs),
                    )
                    .map_err(DocentError::Embedding)?
                    .with_model(&config.embedding.model)
                    .with_dimension(config.embedding.dimension);
                    Some(Arc::new(provider) as Arc<dyn EmbeddingProvider>)
                }
                None => None,
            },
            "fastembed" => Some(local_embedder(config)?),
            other => {
                return Err(DocentError::Config(format!(
                    "Unknown embedding provider: {}",
                    other
                )))
            }
        };

        if let Some(key) = api_key(&config.llm.api_key_env) {
            let provider =
                GroqChatProvider::new(key, Duration::from_secs(config.llm.timeout_secs))
                    .map_err(DocentError::Generation)?
                    .with_temperature(config.llm.temperature);
            capabilities.generator = Some(Arc::new(provider) as Arc<dyn GenerationProvider>);
        }

        if config.vision.enabled {
            if let Some(key) = api_key(&config.vision.api_key_env) {
                let provider =
                    GroqVisionProvider::new(key, Duration::from_secs(config.vision.timeout_secs))
                        .map_err(DocentError::ImageDescription)?
                        .with_model(&config.vision.model);
                capabilities.describer = Some(Arc::new(provider) as Arc<dyn ImageDescriber>);
            }
        }

        debug!(
            "Capabilities: embedder={} generator={} describer={}",
            capabilities.embedder.is_some(),
            capabilities.generator.is_some(),
            capabilities.describer.is_some()
        );

        Ok(capabilities)
    }

    /// Names of required capabilities that are absent
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.embedder.is_none() {
            missing.push("embedding");
        }
        if self.generator.is_none() {
            missing.push("generation");
        }
        missing
    }
}

fn api_key(env_var: &str) -> Option<String> {
    match std::env::var(env_var) {
        Ok(key) if !key.trim().is_empty() => Some(key),
        _ => {
            debug!("{} is not set", env_var);
            None
        }
    }
}

#[cfg(feature = "local-models")]
fn local_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider = crate::embedding::FastEmbedProvider::new(&config.embedding.model)
        .map_err(DocentError::Embedding)?;
    Ok(Arc::new(provider))
}

#[cfg(not(feature = "local-models"))]
fn local_embedder(_config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    Err(DocentError::Config(
        "embedding.provider = \"fastembed\" requires the local-models feature".to_string(),
    ))
}

fn build_reranker(name: &str) -> Result<Box<dyn Reranker>> {
    match name {
        "lexical" => Ok(Box::new(
            LexicalReranker::new().map_err(|e| DocentError::Config(e.to_string()))?,
        )),
        "none" => Ok(Box::new(PassthroughReranker)),
        #[cfg(feature = "local-models")]
        "cross-encoder" => Ok(Box::new(
            crate::retrieval::CrossEncoderReranker::new()
                .map_err(|e| DocentError::Config(e.to_string()))?,
        )),
        #[cfg(not(feature = "local-models"))]
        "cross-encoder" => Err(DocentError::Config(
            "retrieval.reranker = \"cross-encoder\" requires the local-models feature".to_string(),
        )),
        other => Err(DocentError::Config(format!("Unknown reranker: {}", other))),
    }
}

/// Ingestion progress, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestProgress {
    Started,
    Chunked { chunks: usize },
    ImageDescribed,
    Embedded { vectors: usize },
    Indexed { entries: usize },
}

impl IngestProgress {
    pub fn percent(&self) -> u8 {
        match self {
            IngestProgress::Started => 0,
            IngestProgress::Chunked { .. } => 40,
            IngestProgress::ImageDescribed => 55,
            IngestProgress::Embedded { .. } => 85,
            IngestProgress::Indexed { .. } => 100,
        }
    }
}

impl fmt::Display for IngestProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestProgress::Started => write!(f, "Reading document"),
            IngestProgress::Chunked { chunks } => write!(f, "Split into {} chunks", chunks),
            IngestProgress::ImageDescribed => write!(f, "Described image"),
            IngestProgress::Embedded { vectors } => write!(f, "Embedded {} chunks", vectors),
            IngestProgress::Indexed { entries } => write!(f, "Indexed {} entries", entries),
        }
    }
}

/// Non-fatal conditions surfaced with results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Context shorter than the configured minimum; generation still ran
    SparseContext { chars: usize, min_chars: usize },
    /// The reranker failed; retrieval order was used
    RerankFailed { reason: String },
    /// The image was not indexed
    ImageSkipped { reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::SparseContext { chars, min_chars } => write!(
                f,
                "Retrieved context is short ({} chars, minimum {}); the answer may be incomplete",
                chars, min_chars
            ),
            Warning::RerankFailed { reason } => {
                write!(f, "Reranking failed, using retrieval order: {}", reason)
            }
            Warning::ImageSkipped { reason } => write!(f, "Image was not indexed: {}", reason),
        }
    }
}

/// Result of an ingestion
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// The document was already indexed; nothing was recomputed
    pub reused: bool,
    pub chunks: usize,
    pub image_chunks: usize,
    pub dimension: usize,
    /// Embedding requests made
    pub batches: usize,
    pub warnings: Vec<Warning>,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

/// Per-question overrides of configured defaults
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub model: Option<String>,
    pub scope: Option<RetrievalScope>,
    pub top_k: Option<usize>,
}

/// Everything produced while answering one question
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub question: String,
    pub answer: String,
    pub status: AnswerStatus,
    pub model: String,
    pub scope: RetrievalScope,
    /// Context passed to the model
    pub context: AssembledContext,
    /// Search hits in similarity order
    pub retrieved: Vec<RetrievedChunk>,
    /// Which ordering the context was assembled from
    pub ranking: RankingSource,
    pub warnings: Vec<Warning>,
    #[serde(rename = "latency_ms", serialize_with = "as_millis")]
    pub latency: Duration,
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// What a successful ingestion run produced
struct Built {
    chunks: Vec<Chunk>,
    index: VectorIndex,
    image: Option<String>,
    batches: usize,
}

/// Drives ingestion and question answering
pub struct SessionPipeline {
    config: Config,
    capabilities: Capabilities,
    chunker: Chunker,
    reranker: Box<dyn Reranker>,
    assembler: ContextAssembler,
}

impl SessionPipeline {
    pub fn new(config: Config, capabilities: Capabilities) -> Result<Self> {
        let chunker = Chunker::new(config.chunking.max_unit_size, config.chunking.overlap)?;
        let reranker = build_reranker(&config.retrieval.reranker)?;
        let assembler =
            ContextAssembler::new(config.context.max_units, config.context.min_chars, "\n\n");

        info!(
            "Pipeline ready (chunks {}/{}, top_k {}, reranker {})",
            config.chunking.max_unit_size,
            config.chunking.overlap,
            config.retrieval.top_k,
            reranker.name()
        );

        Ok(Self {
            config,
            capabilities,
            chunker,
            reranker,
            assembler,
        })
    }

    /// Replace the configured reranker
    pub fn with_reranker(mut self, reranker: Box<dyn Reranker>) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn reranker_name(&self) -> &str {
        self.reranker.name()
    }

    /// Index `document` (and optionally `image`) into the session
    ///
    /// A `Ready` session holding the same document fingerprint and image name
    /// is reused without calling any provider.
    pub fn ingest<F>(
        &self,
        session: &mut Session,
        document: &Document,
        image: Option<&ImageInput>,
        mut progress: F,
    ) -> Result<IngestReport>
    where
        F: FnMut(IngestProgress),
    {
        let start = Instant::now();

        if session.is_ready() && self.is_current(session, document, image) {
            info!("Document {} already indexed, reusing", document.name);
            return Ok(IngestReport {
                reused: true,
                chunks: session.chunks.len(),
                image_chunks: session.index.count_tag(ChunkTag::Image),
                dimension: session.index.dimension(),
                batches: 0,
                warnings: Vec::new(),
                duration: start.elapsed(),
            });
        }

        let missing = self.capabilities.missing();
        if !missing.is_empty() {
            return Err(DocentError::NotConfigured(format!(
                "{} provider required for ingestion (set {} / {})",
                missing.join(" and "),
                self.config.embedding.api_key_env,
                self.config.llm.api_key_env
            )));
        }

        if document.text.trim().is_empty() {
            return Err(DocentError::UnsupportedContent(format!(
                "{} contains no text",
                document.name
            )));
        }

        session.discard_document();
        session.state = SessionState::Ingesting;
        info!("Ingesting {} ({} chars)", document.name, document.text.chars().count());
        progress(IngestProgress::Started);

        let mut warnings = Vec::new();
        let built = match self.build(document, image, &mut progress, &mut warnings) {
            Ok(built) => built,
            Err(e) => {
                warn!("Ingestion of {} failed: {}", document.name, e);
                session.discard_document();
                return Err(e);
            }
        };

        let image_chunks = built.index.count_tag(ChunkTag::Image);
        let dimension = built.index.dimension();
        let entries = built.index.len();

        session.document = Some(DocumentInfo {
            name: document.name.clone(),
            fingerprint: document.fingerprint.clone(),
            chars: document.text.chars().count(),
            chunks: built.chunks.len(),
            image: built.image,
            ingested_at: Utc::now(),
        });
        session.chunks = built.chunks;
        session.index = built.index;
        session.state = SessionState::Ready;
        progress(IngestProgress::Indexed { entries });

        let duration = start.elapsed();
        info!(
            "Indexed {} entries ({}D) in {}ms",
            entries,
            dimension,
            duration.as_millis()
        );

        Ok(IngestReport {
            reused: false,
            chunks: entries,
            image_chunks,
            dimension,
            batches: built.batches,
            warnings,
            duration,
        })
    }

    /// Same document text and same image (or no image on both sides)
    fn is_current(&self, session: &Session, document: &Document, image: Option<&ImageInput>) -> bool {
        session.document.as_ref().is_some_and(|info| {
            info.fingerprint == document.fingerprint
                && info.image.as_deref() == image.map(|i| i.name.as_str())
        })
    }

    fn build<F>(
        &self,
        document: &Document,
        image: Option<&ImageInput>,
        progress: &mut F,
        warnings: &mut Vec<Warning>,
    ) -> Result<Built>
    where
        F: FnMut(IngestProgress),
    {
        let mut chunks = self.chunker.chunk(&document.text);
        debug!("Chunked {} into {} chunks", document.name, chunks.len());
        progress(IngestProgress::Chunked {
            chunks: chunks.len(),
        });

        let mut image_name = None;
        if let Some(image) = image {
            match self.describe(image) {
                Ok(description) => {
                    chunks.push(Chunk::image(chunks.len(), &description));
                    image_name = Some(image.name.clone());
                    progress(IngestProgress::ImageDescribed);
                }
                Err(e) if self.config.vision.on_failure == VisionFailurePolicy::Skip => {
                    warn!("Skipping image {}: {}", image.name, e);
                    warnings.push(Warning::ImageSkipped {
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let embedder = self
            .capabilities
            .embedder
            .clone()
            .ok_or_else(|| DocentError::NotConfigured("embedding provider".to_string()))?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let batch = BatchEmbedder::new(embedder.clone(), self.config.embedding.batch_size)
            .embed_all(&texts)
            .map_err(DocentError::Embedding)?;
        progress(IngestProgress::Embedded {
            vectors: batch.vectors.len(),
        });

        if let Some(expected) = self.config.embedding.dimension.or_else(|| embedder.dimension()) {
            if let Some(bad) = batch.vectors.iter().find(|v| v.len() != expected) {
                return Err(DocentError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }

        let entries = batch
            .vectors
            .into_iter()
            .zip(chunks.iter().map(|c| c.tag))
            .collect();
        let index = VectorIndex::build(entries)?;

        Ok(Built {
            chunks,
            index,
            image: image_name,
            batches: batch.batches,
        })
    }

    fn describe(&self, image: &ImageInput) -> Result<String> {
        if !self.config.vision.enabled {
            return Err(DocentError::NotConfigured(
                "image description is disabled (vision.enabled = false)".to_string(),
            ));
        }

        let describer = self.capabilities.describer.as_ref().ok_or_else(|| {
            DocentError::NotConfigured(format!(
                "image description provider (set {})",
                self.config.vision.api_key_env
            ))
        })?;

        let description = describer
            .describe(&image.bytes, &image.mime)
            .map_err(DocentError::ImageDescription)?;

        if description.trim().is_empty() {
            return Err(DocentError::ImageDescription(ProviderError::Response {
                provider: describer.name().to_string(),
                message: "Empty image description".to_string(),
            }));
        }

        debug!("Image {} described in {} chars", image.name, description.len());
        Ok(description)
    }

    /// Answer `question` from the session's document
    ///
    /// Every answered or fallen-back question is appended to the history.
    pub fn ask(&self, session: &mut Session, question: &str, options: &AskOptions) -> Result<QueryOutcome> {
        if !session.is_ready() {
            return Err(DocentError::Session(format!(
                "No document is ready (session is {})",
                session.state
            )));
        }

        let question = question.trim();
        if question.is_empty() {
            return Err(DocentError::Session("Question cannot be empty".to_string()));
        }

        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.config.llm.model.clone());
        if !is_supported_model(&model) {
            warn!("Model {} is not one of the offered models; using it anyway", model);
        }

        let start = Instant::now();
        session.state = SessionState::Answering;

        let mut outcome = QueryOutcome {
            question: question.to_string(),
            answer: String::new(),
            status: AnswerStatus::Answered,
            model,
            scope: options.scope.unwrap_or(self.config.retrieval.scope),
            context: AssembledContext {
                text: String::new(),
                units: 0,
                sparse: false,
            },
            retrieved: Vec::new(),
            ranking: RankingSource::Retrieval,
            warnings: Vec::new(),
            latency: Duration::ZERO,
        };
        let top_k = options.top_k.unwrap_or(self.config.retrieval.top_k);

        let result = self.run_query(session, top_k, &mut outcome);
        outcome.latency = start.elapsed();

        match result {
            Ok(answer) => {
                outcome.answer = answer;
                info!("Answered in {}ms", outcome.latency.as_millis());
            }
            Err(e @ DocentError::DimensionMismatch { .. }) => {
                warn!("Query embedding does not match the index: {}; discarding index", e);
                session.discard_document();
                return Err(e);
            }
            Err(e) => {
                warn!("Answering failed: {}", e);
                if let Some(provider) = e.provider_error() {
                    debug!("Remediation: {}", provider.remediation());
                }
                outcome.answer = fallback_answer(&e);
                outcome.status = AnswerStatus::Fallback;
            }
        }

        session.record(&outcome.question, &outcome.answer, outcome.status);
        session.state = SessionState::Ready;

        Ok(outcome)
    }

    fn run_query(&self, session: &Session, top_k: usize, outcome: &mut QueryOutcome) -> Result<String> {
        let embedder = self
            .capabilities
            .embedder
            .as_ref()
            .ok_or_else(|| DocentError::NotConfigured("embedding provider".to_string()))?;
        let generator = self
            .capabilities
            .generator
            .clone()
            .ok_or_else(|| DocentError::NotConfigured("generation provider".to_string()))?;

        let query = embedder
            .embed(&outcome.question)
            .map_err(DocentError::Embedding)?;

        let hits = session.index.search(&query, top_k, outcome.scope.tag())?;
        debug!("Retrieved {} hits (scope {})", hits.len(), outcome.scope);

        outcome.retrieved = hits
            .iter()
            .filter_map(|hit| {
                session.chunks.get(hit.index).map(|chunk| RetrievedChunk {
                    index: chunk.index,
                    text: chunk.text.clone(),
                    tag: chunk.tag,
                    score: hit.score,
                })
            })
            .collect();

        let candidates: Vec<String> = outcome.retrieved.iter().map(|r| r.text.clone()).collect();
        let ranked = match self.reranker.rerank(&outcome.question, &candidates) {
            Ok(order) if !order.is_empty() => {
                outcome.ranking = RankingSource::Reranked;
                order
                    .into_iter()
                    .filter_map(|(position, _)| candidates.get(position).cloned())
                    .collect()
            }
            Ok(_) => {
                debug!("Reranker returned nothing; using retrieval order");
                candidates
            }
            Err(e) => {
                warn!("Reranker {} failed: {}", self.reranker.name(), e);
                outcome.warnings.push(Warning::RerankFailed {
                    reason: e.to_string(),
                });
                candidates
            }
        };

        outcome.context = self.assembler.assemble(&ranked);
        if outcome.context.sparse {
            let warning = Warning::SparseContext {
                chars: outcome.context.char_len(),
                min_chars: self.assembler.min_chars(),
            };
            warn!("{}", warning);
            outcome.warnings.push(warning);
        }

        let answerer = GroundedAnswerer::new(generator, NOT_ENOUGH_INFORMATION);
        answerer
            .answer(&outcome.context.text, &outcome.question, &outcome.model)
            .map_err(DocentError::Generation)
    }
}

/// Answer text recorded when a provider fails mid-question
pub fn fallback_answer(error: &DocentError) -> String {
    let detail: String = error.to_string().chars().take(FALLBACK_ERROR_CHARS).collect();
    format!("{} {}", FALLBACK_PREFIX, detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_answer_truncates() {
        let error = DocentError::Generation(ProviderError::Network {
            provider: "Groq".to_string(),
            message: "x".repeat(500),
        });
        let answer = fallback_answer(&error);

        assert!(answer.starts_with("Error: Unable to generate answer. Generation failed:"));
        let detail = answer.trim_start_matches(FALLBACK_PREFIX).trim_start();
        assert_eq!(detail.chars().count(), 100);
    }

    #[test]
    fn test_progress_percentages() {
        let stages = [
            IngestProgress::Started,
            IngestProgress::Chunked { chunks: 1 },
            IngestProgress::ImageDescribed,
            IngestProgress::Embedded { vectors: 1 },
            IngestProgress::Indexed { entries: 1 },
        ];
        let percents: Vec<u8> = stages.iter().map(|s| s.percent()).collect();
        assert_eq!(percents, vec![0, 40, 55, 85, 100]);
    }

    #[test]
    fn test_missing_capabilities() {
        let capabilities = Capabilities::default();
        assert_eq!(capabilities.missing(), vec!["embedding", "generation"]);
    }

    #[test]
    fn test_unknown_reranker() {
        assert!(build_reranker("magic").is_err());
        assert_eq!(build_reranker("none").unwrap().name(), "none");
        assert_eq!(build_reranker("lexical").unwrap().name(), "lexical");
    }

    #[test]
    fn test_warning_serializes_with_kind() {
        let warning = Warning::SparseContext {
            chars: 40,
            min_chars: 100,
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "sparse_context");
        assert_eq!(json["chars"], 40);
    }
}
