//! Retrieval, reranking and context assembly
//!
//! Candidates come out of the vector index, get reordered against the literal
//! query text, and the best few are joined into the prompt context.

mod context;
mod reranker;

pub use context::{AssembledContext, ContextAssembler};
#[cfg(feature = "local-models")]
pub use reranker::CrossEncoderReranker;
pub use reranker::{LexicalReranker, PassthroughReranker, RerankError, Reranker};

use crate::chunking::ChunkTag;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which chunks a query may retrieve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalScope {
    #[default]
    All,
    Text,
    Image,
}

impl RetrievalScope {
    /// Tag filter for the vector index (`None` searches everything)
    pub fn tag(&self) -> Option<ChunkTag> {
        match self {
            RetrievalScope::All => None,
            RetrievalScope::Text => Some(ChunkTag::Text),
            RetrievalScope::Image => Some(ChunkTag::Image),
        }
    }
}

impl fmt::Display for RetrievalScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalScope::All => f.write_str("all"),
            RetrievalScope::Text => f.write_str("text"),
            RetrievalScope::Image => f.write_str("image"),
        }
    }
}

impl FromStr for RetrievalScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(RetrievalScope::All),
            "text" => Ok(RetrievalScope::Text),
            "image" => Ok(RetrievalScope::Image),
            other => Err(format!(
                "Unknown scope '{}': expected all, text or image",
                other
            )),
        }
    }
}

/// Which ordering produced the context for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingSource {
    /// Reranker output
    Reranked,
    /// Raw similarity order (reranker returned nothing or failed)
    Retrieval,
}

/// A retrieved chunk with its similarity score
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    /// Chunk ordinal
    pub index: usize,
    pub text: String,
    pub tag: ChunkTag,
    /// Cosine similarity to the query
    pub score: f32,
}

impl RetrievedChunk {
    /// Get a short preview of the text (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        if self.text.chars().count() <= max_chars {
            self.text.clone()
        } else {
            let head: String = self.text.chars().take(max_chars).collect();
            format!("{}...", head)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_parsing() {
        assert_eq!("all".parse::<RetrievalScope>().unwrap(), RetrievalScope::All);
        assert_eq!(" Image ".parse::<RetrievalScope>().unwrap(), RetrievalScope::Image);
        assert!("video".parse::<RetrievalScope>().is_err());
    }

    #[test]
    fn test_scope_tags() {
        assert_eq!(RetrievalScope::All.tag(), None);
        assert_eq!(RetrievalScope::Text.tag(), Some(ChunkTag::Text));
        assert_eq!(RetrievalScope::Image.to_string(), "image");
    }

    #[test]
    fn test_preview() {
        let chunk = RetrievedChunk {
            index: 0,
            text: "ünïcödé text here".to_string(),
            tag: ChunkTag::Text,
            score: 0.5,
        };
        assert_eq!(chunk.preview(7), "ünïcödé...");
        assert_eq!(chunk.preview(100), "ünïcödé text here");
    }
}
