//! Document sessions
//!
//! A [`Session`] owns everything derived from the current document (chunks and
//! vector index) plus the question/answer history. It is an explicit value
//! handed to each [`SessionPipeline`] operation; nothing is kept globally.
mod pipeline;

pub use pipeline::{
    fallback_answer, AskOptions, Capabilities, IngestProgress, IngestReport, QueryOutcome,
    SessionPipeline, Warning, FALLBACK_PREFIX,
};

use crate::chunking::{Chunk, ChunkTag};
use crate::embedding::VectorIndex;
use crate::error::{DocentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Number of exchanges shown by history displays
pub const RECENT_HISTORY: usize = 8;

/// Pipeline state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No usable index
    Idle,
    /// A document is being chunked, embedded and indexed
    Ingesting,
    /// Index built; questions can be asked
    Ready,
    /// A question is being answered
    Answering,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Ingesting => "ingesting",
            SessionState::Ready => "ready",
            SessionState::Answering => "answering",
        };
        f.write_str(s)
    }
}

/// How an answer was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    /// Generated from retrieved context
    Answered,
    /// A provider failed; the answer carries the error description
    Fallback,
}

/// One question/answer exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
    pub status: AnswerStatus,
}

/// Raw document text with its identity
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub text: String,
    /// BLAKE3 hash of `text`, hex encoded
    pub fingerprint: String,
}

impl Document {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let fingerprint = blake3::hash(text.as_bytes()).to_hex().to_string();
        Self {
            name: name.into(),
            text,
            fingerprint,
        }
    }

    /// Load a plain-text document
    ///
    /// PDF files are rejected: text must already be extracted.
    pub fn from_path(path: &Path) -> Result<Self> {
        let is_pdf_name = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if is_pdf_name {
            return Err(DocentError::UnsupportedContent(format!(
                "{} is a PDF; extract its text first",
                path.display()
            )));
        }

        let bytes = std::fs::read(path).map_err(|e| DocentError::Io {
            source: e,
            context: format!("Failed to read document {}", path.display()),
        })?;
        if bytes.starts_with(b"%PDF") {
            return Err(DocentError::UnsupportedContent(format!(
                "{} contains PDF data; extract its text first",
                path.display()
            )));
        }

        let text = String::from_utf8(bytes).map_err(|_| {
            DocentError::UnsupportedContent(format!("{} is not valid UTF-8 text", path.display()))
        })?;
        if text.trim().is_empty() {
            return Err(DocentError::UnsupportedContent(format!(
                "{} is empty",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self::new(name, text))
    }
}

/// Summary of the document currently indexed
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub name: String,
    pub fingerprint: String,
    /// Character count of the document text
    pub chars: usize,
    /// Number of chunks, including the image chunk if any
    pub chunks: usize,
    /// Name of the described image, if one was indexed
    pub image: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

/// Working state for one document conversation
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    state: SessionState,
    document: Option<DocumentInfo>,
    chunks: Vec<Chunk>,
    index: VectorIndex,
    history: Vec<HistoryEntry>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            state: SessionState::Idle,
            document: None,
            chunks: Vec::new(),
            index: VectorIndex::default(),
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Currently indexed document
    pub fn document(&self) -> Option<&DocumentInfo> {
        self.document.as_ref()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Full history, oldest first
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// The last `n` exchanges, oldest first
    pub fn recent_history(&self, n: usize) -> &[HistoryEntry] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// Number of indexed chunks with the given tag
    pub fn count_tag(&self, tag: ChunkTag) -> usize {
        self.index.count_tag(tag)
    }

    /// Drop the document, chunks and index; history is kept
    pub(crate) fn discard_document(&mut self) {
        self.document = None;
        self.chunks.clear();
        self.index = VectorIndex::default();
        self.state = SessionState::Idle;
    }

    pub(crate) fn record(&mut self, question: &str, answer: &str, status: AnswerStatus) {
        self.history.push(HistoryEntry {
            question: question.to_string(),
            answer: answer.to_string(),
            asked_at: Utc::now(),
            status,
        });
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
