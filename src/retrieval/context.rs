//! Context assembly for grounded prompts

use serde::Serialize;

/// Context handed to the answerer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledContext {
    /// Joined fragments
    pub text: String,
    /// Number of fragments joined
    pub units: usize,
    /// Set when the trimmed text is shorter than the minimum length
    pub sparse: bool,
}

impl AssembledContext {
    /// Length of the trimmed context in characters
    pub fn char_len(&self) -> usize {
        self.text.trim().chars().count()
    }
}

/// Joins the top-ranked fragments into one bounded context string
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    max_units: usize,
    min_chars: usize,
    separator: String,
}

impl ContextAssembler {
    /// # Arguments
    /// * `max_units` - Maximum number of fragments to join
    /// * `min_chars` - Contexts shorter than this are flagged sparse
    /// * `separator` - Placed between fragments
    pub fn new(max_units: usize, min_chars: usize, separator: impl Into<String>) -> Self {
        Self {
            max_units,
            min_chars,
            separator: separator.into(),
        }
    }

    pub fn max_units(&self) -> usize {
        self.max_units
    }

    pub fn min_chars(&self) -> usize {
        self.min_chars
    }

    /// Take at most `max_units` texts, in the given order, and join them
    pub fn assemble<S: AsRef<str>>(&self, ranked: &[S]) -> AssembledContext {
        let selected: Vec<&str> = ranked
            .iter()
            .take(self.max_units)
            .map(|s| s.as_ref())
            .collect();

        let text = selected.join(&self.separator);
        let sparse = text.trim().chars().count() < self.min_chars;

        AssembledContext {
            text,
            units: selected.len(),
            sparse,
        }
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(5, 100, "\n\n")
    }
}
