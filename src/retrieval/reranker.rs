//! Query-text reranking of retrieved candidates
//!
//! Rerankers score candidates against the literal query string, independent of
//! embedding similarity. They return `(candidate position, score)` pairs best
//! first; the result may drop candidates and may be empty.

use ahash::AHashSet;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker initialization failed: {0}")]
    InitializationError(String),

    #[error("Reranking failed: {0}")]
    RerankingError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Pluggable relevance strategy
///
/// Must be a pure function of `(query, candidates)`.
pub trait Reranker: Send + Sync {
    /// Rerank candidate texts against a query
    ///
    /// # Returns
    /// Vector of (candidate index, score) pairs sorted by score descending.
    /// An empty candidate list yields an empty result.
    fn rerank(&self, query: &str, candidates: &[String]) -> Result<Vec<(usize, f32)>, RerankError>;

    fn name(&self) -> &str;
}

/// Words too common to carry relevance signal
const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "any", "are", "as", "at", "be", "been", "but", "by", "can", "did",
    "do", "does", "for", "from", "had", "has", "have", "how", "if", "in", "into", "is", "it",
    "its", "me", "my", "no", "not", "of", "on", "or", "our", "so", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "those", "to", "was", "we", "were", "what", "when",
    "where", "which", "who", "whom", "why", "will", "with", "would", "you", "your",
];

/// Bonus when the whole normalized query appears verbatim in a candidate
const PHRASE_BONUS: f32 = 0.25;

/// Weight of query-term density within the candidate
const DENSITY_WEIGHT: f32 = 0.1;

/// Lexical-overlap reranker
///
/// Score = fraction of distinct query terms present in the candidate, plus a
/// phrase bonus and a small term-density component. Candidates sharing no
/// query term are dropped. Equal scores keep retrieval order.
#[derive(Debug, Clone)]
pub struct LexicalReranker {
    token: Regex,
    stop_words: AHashSet<&'static str>,
}

impl LexicalReranker {
    pub fn new() -> Result<Self, RerankError> {
        let token = Regex::new(r"[\p{L}\p{N}]+")
            .map_err(|e| RerankError::InitializationError(e.to_string()))?;

        Ok(Self {
            token,
            stop_words: STOP_WORDS.iter().copied().collect(),
        })
    }

    fn terms(&self, text: &str) -> Vec<String> {
        self.token
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|t| t.chars().count() > 1 && !self.stop_words.contains(t.as_str()))
            .collect()
    }

    fn score(&self, query_terms: &AHashSet<String>, query_phrase: &str, candidate: &str) -> f32 {
        let terms = self.terms(candidate);
        if terms.is_empty() {
            return 0.0;
        }

        let present: AHashSet<&str> = terms.iter().map(String::as_str).collect();
        let matched = query_terms
            .iter()
            .filter(|t| present.contains(t.as_str()))
            .count();
        if matched == 0 {
            return 0.0;
        }

        let coverage = matched as f32 / query_terms.len() as f32;
        let hits = terms.iter().filter(|t| query_terms.contains(*t)).count();
        let density = hits as f32 / terms.len() as f32;

        let phrase = if !query_phrase.is_empty()
            && phrase_key(candidate).contains(query_phrase)
        {
            PHRASE_BONUS
        } else {
            0.0
        };

        coverage + phrase + DENSITY_WEIGHT * density
    }
}

impl Reranker for LexicalReranker {
    fn rerank(&self, query: &str, candidates: &[String]) -> Result<Vec<(usize, f32)>, RerankError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query_terms: AHashSet<String> = self.terms(query).into_iter().collect();
        if query_terms.is_empty() {
            tracing::debug!("Query has no content terms; nothing to rerank on");
            return Ok(Vec::new());
        }
        let query_phrase = phrase_key(query);

        let mut scored: Vec<(usize, f32)> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (i, self.score(&query_terms, &query_phrase, c)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(scored)
    }

    fn name(&self) -> &str {
        "lexical"
    }
}

/// Lower-cased, whitespace-collapsed form used for phrase containment
fn phrase_key(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keeps retrieval order; every candidate scores 1.0
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughReranker;

impl Reranker for PassthroughReranker {
    fn rerank(&self, _query: &str, candidates: &[String]) -> Result<Vec<(usize, f32)>, RerankError> {
        Ok((0..candidates.len()).map(|i| (i, 1.0)).collect())
    }

    fn name(&self) -> &str {
        "none"
    }
}

#[cfg(feature = "local-models")]
pub use cross_encoder::CrossEncoderReranker;

#[cfg(feature = "local-models")]
mod cross_encoder {
    use super::{RerankError, Reranker};
    use fastembed::{RerankInitOptions, RerankerModel, TextRerank};

    /// Cross-encoder reranker using FastEmbed
    pub struct CrossEncoderReranker {
        model: TextRerank,
    }

    impl CrossEncoderReranker {
        /// Load the BGE reranker base model (downloaded on first use)
        pub fn new() -> Result<Self, RerankError> {
            tracing::info!("Initializing cross-encoder reranker: BGE reranker base");

            let init_options = RerankInitOptions::new(RerankerModel::BGERerankerBase)
                .with_show_download_progress(true);
            let model = TextRerank::try_new(init_options)
                .map_err(|e| RerankError::InitializationError(e.to_string()))?;

            Ok(Self { model })
        }
    }

    impl Reranker for CrossEncoderReranker {
        fn rerank(
            &self,
            query: &str,
            candidates: &[String],
        ) -> Result<Vec<(usize, f32)>, RerankError> {
            if candidates.is_empty() {
                return Ok(Vec::new());
            }

            if query.trim().is_empty() {
                return Err(RerankError::InvalidInput(
                    "Query cannot be empty".to_string(),
                ));
            }

            let documents: Vec<&str> = candidates.iter().map(|s| s.as_str()).collect();
            let results = self
                .model
                .rerank(query, documents, false, None)
                .map_err(|e| RerankError::RerankingError(e.to_string()))?;

            let mut scored: Vec<(usize, f32)> =
                results.into_iter().map(|r| (r.index, r.score)).collect();
            scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

            Ok(scored)
        }

        fn name(&self) -> &str {
            "cross-encoder"
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        #[ignore] // Requires model download
        fn test_rerank_basic() {
            let reranker = CrossEncoderReranker::new().unwrap();

            let candidates = vec![
                "Paris is the capital of France.".to_string(),
                "London is the capital of England.".to_string(),
                "The weather is nice today.".to_string(),
            ];

            let results = reranker
                .rerank("What is the capital of France?", &candidates)
                .unwrap();
            assert_eq!(results[0].0, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_candidates() {
        let reranker = LexicalReranker::new().unwrap();
        assert!(reranker.rerank("anything", &[]).unwrap().is_empty());
        assert!(PassthroughReranker.rerank("anything", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_orders_by_query_overlap() {
        let reranker = LexicalReranker::new().unwrap();
        let candidates = texts(&[
            "Stars are hot balls of plasma.",
            "Dogs are loyal mammals.",
            "Cats are mammals that purr.",
        ]);

        let results = reranker.rerank("Which mammals purr?", &candidates).unwrap();
        let order: Vec<usize> = results.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![2, 1]);
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn test_drops_unrelated_candidates() {
        let reranker = LexicalReranker::new().unwrap();
        let candidates = texts(&["The quick brown fox.", "Lorem ipsum dolor."]);

        let results = reranker.rerank("quantum entanglement", &candidates).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_stop_word_only_query() {
        let reranker = LexicalReranker::new().unwrap();
        let candidates = texts(&["What is it?", "It is what it is."]);
        assert!(reranker.rerank("what is it", &candidates).unwrap().is_empty());
    }

    #[test]
    fn test_phrase_bonus() {
        let reranker = LexicalReranker::new().unwrap();
        let candidates = texts(&[
            "The report covers revenue growth and also mentions annual numbers.",
            "Annual revenue growth was strong.",
        ]);

        let results = reranker.rerank("annual revenue growth", &candidates).unwrap();
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn test_ties_keep_retrieval_order() {
        let reranker = LexicalReranker::new().unwrap();
        let candidates = texts(&["Apples grow here.", "Apples grow here.", "Apples grow here."]);

        let results = reranker.rerank("apples", &candidates).unwrap();
        let order: Vec<usize> = results.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let reranker = LexicalReranker::new().unwrap();
        let candidates = texts(&["PHOTOSYNTHESIS converts light.", "Nothing relevant."]);

        let results = reranker.rerank("photosynthesis?", &candidates).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 0);
    }

    #[test]
    fn test_deterministic() {
        let reranker = LexicalReranker::new().unwrap();
        let candidates = texts(&[
            "Rust has ownership and borrowing.",
            "Borrowing rules prevent data races.",
            "Ownership moves values.",
        ]);

        let first = reranker.rerank("ownership borrowing", &candidates).unwrap();
        let second = reranker.rerank("ownership borrowing", &candidates).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_passthrough_keeps_order() {
        let candidates = texts(&["b", "a", "c"]);
        let results = PassthroughReranker.rerank("q", &candidates).unwrap();
        assert_eq!(results, vec![(0, 1.0), (1, 1.0), (2, 1.0)]);
    }
}
