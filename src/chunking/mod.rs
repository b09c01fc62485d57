//! Document chunking
//!
//! Splits raw document text into ordered, bounded-size units for retrieval.
//! Paragraphs are the primary boundary; oversized paragraphs fall back to
//! sentences, then words, then hard character cuts.
use crate::error::{DocentError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Blank line, tolerant of trailing spaces and CRLF
const PARAGRAPH_BREAK: &str = r"\n[ \t\r\f\v]*\n";

/// Sentence terminator plus any closing quotes/brackets, followed by whitespace
const SENTENCE_END: &str = r#"[.!?]+["')\]]*\s+"#;

/// Separator used when two paragraphs land in the same chunk
const PARAGRAPH_JOIN: &str = "\n\n";

/// Metadata tag attached to every indexed unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkTag {
    /// Text from the document body
    Text,
    /// Description generated from the uploaded image
    Image,
}

impl ChunkTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkTag::Text => "text",
            ChunkTag::Image => "image",
        }
    }
}

impl fmt::Display for ChunkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded unit of document text, the atomic retrieval item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Ordinal position within the current document session
    pub index: usize,
    /// Full text as embedded, including any overlap prefix
    pub text: String,
    /// Where the text came from
    pub tag: ChunkTag,
    /// Number of leading characters of `text` repeated from the previous chunk
    #[serde(default)]
    pub overlap: usize,
    /// Content resumes a word hard-cut at the end of the previous chunk
    #[serde(default)]
    pub continues_word: bool,
}

impl Chunk {
    /// Create an image-description chunk
    pub fn image(index: usize, description: &str) -> Self {
        Self {
            index,
            text: format!("Image description: {}", description.trim()),
            tag: ChunkTag::Image,
            overlap: 0,
            continues_word: false,
        }
    }

    /// Text without the overlap prefix
    pub fn content(&self) -> &str {
        self.text
            .char_indices()
            .nth(self.overlap)
            .map_or("", |(i, _)| &self.text[i..])
    }

    /// Length of the full text in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Paragraph/sentence aware text splitter
///
/// Sizes are measured in characters. Each chunk holds at most
/// `max_unit_size` characters including its overlap prefix.
#[derive(Debug, Clone)]
pub struct Chunker {
    max_unit_size: usize,
    overlap: usize,
    paragraph_break: Regex,
    sentence_end: Regex,
}

impl Chunker {
    /// Create a chunker
    ///
    /// # Arguments
    /// * `max_unit_size` - Maximum characters per chunk
    /// * `overlap` - Characters carried over from the previous chunk (must be < `max_unit_size`)
    pub fn new(max_unit_size: usize, overlap: usize) -> Result<Self> {
        if max_unit_size == 0 {
            return Err(DocentError::InvalidConfigValue {
                path: "chunking.max_unit_size".to_string(),
                message: "Max unit size must be greater than 0".to_string(),
            });
        }
        if overlap >= max_unit_size {
            return Err(DocentError::InvalidConfigValue {
                path: "chunking.overlap".to_string(),
                message: format!(
                    "Overlap ({}) must be smaller than max unit size ({})",
                    overlap, max_unit_size
                ),
            });
        }

        let paragraph_break = Regex::new(PARAGRAPH_BREAK)
            .map_err(|e| DocentError::Config(format!("Invalid paragraph pattern: {}", e)))?;
        let sentence_end = Regex::new(SENTENCE_END)
            .map_err(|e| DocentError::Config(format!("Invalid sentence pattern: {}", e)))?;

        Ok(Self {
            max_unit_size,
            overlap,
            paragraph_break,
            sentence_end,
        })
    }

    pub fn max_unit_size(&self) -> usize {
        self.max_unit_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into ordered chunks tagged as `Text`
    ///
    /// Empty or whitespace-only input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let cores = self.split_cores(text);
        let mut chunks = Vec::with_capacity(cores.len());
        let mut previous: Option<&str> = None;

        for (index, core) in cores.iter().enumerate() {
            let Core {
                text: core,
                continues_word,
            } = core;
            let (text, overlap) = match previous.and_then(|p| overlap_tail(p, self.overlap)) {
                Some(tail) => (format!("{} {}", tail, core), tail.chars().count() + 1),
                None => (core.clone(), 0),
            };

            chunks.push(Chunk {
                index,
                text,
                tag: ChunkTag::Text,
                overlap,
                continues_word: *continues_word,
            });
            previous = Some(core);
        }

        tracing::debug!(
            "Chunked {} chars into {} chunks (max {}, overlap {})",
            text.chars().count(),
            chunks.len(),
            self.max_unit_size,
            self.overlap
        );

        chunks
    }

    /// Characters available to a chunk once room for the overlap prefix is reserved
    fn core_budget(&self) -> usize {
        self.max_unit_size - self.overlap
    }

    /// Greedily merge paragraphs (or their pieces) into cores within budget
    fn split_cores(&self, text: &str) -> Vec<Core> {
        let budget = self.core_budget();
        let mut merger = CoreMerger::new(budget);

        for paragraph in self.paragraph_break.split(text) {
            let paragraph = normalize_whitespace(paragraph);
            if paragraph.is_empty() {
                continue;
            }

            if paragraph.chars().count() <= budget {
                merger.push(&paragraph, PARAGRAPH_JOIN);
                continue;
            }

            for (i, (piece, continues_word)) in
                self.split_oversized(&paragraph, budget).iter().enumerate()
            {
                let separator = match (i, *continues_word) {
                    (0, _) => PARAGRAPH_JOIN,
                    (_, true) => "",
                    (_, false) => " ",
                };
                merger.push(piece, separator);
            }
        }

        merger.finish()
    }

    /// Break a paragraph into sentence, word, or character pieces that each fit the budget
    ///
    /// The flag marks pieces that continue a hard-cut word.
    fn split_oversized(&self, paragraph: &str, budget: usize) -> Vec<(String, bool)> {
        let mut pieces = Vec::new();

        for sentence in self.sentences(paragraph) {
            if sentence.chars().count() <= budget {
                pieces.push((sentence.to_string(), false));
                continue;
            }

            for word in sentence.split_whitespace() {
                if word.chars().count() <= budget {
                    pieces.push((word.to_string(), false));
                } else {
                    let cuts = hard_cut(word, budget);
                    pieces.extend(cuts.into_iter().enumerate().map(|(i, cut)| (cut, i > 0)));
                }
            }
        }

        pieces
    }

    fn sentences<'a>(&self, paragraph: &'a str) -> Vec<&'a str> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for m in self.sentence_end.find_iter(paragraph) {
            let sentence = paragraph[start..m.end()].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = m.end();
        }

        let rest = paragraph[start..].trim();
        if !rest.is_empty() {
            sentences.push(rest);
        }

        sentences
    }
}

/// Chunk body before any overlap prefix is added
struct Core {
    text: String,
    continues_word: bool,
}

/// Accumulates pieces into cores no longer than the budget
///
/// An empty separator marks a piece that continues the previous word.
struct CoreMerger {
    budget: usize,
    cores: Vec<Core>,
    current: String,
    current_len: usize,
    current_continues: bool,
}

impl CoreMerger {
    fn new(budget: usize) -> Self {
        Self {
            budget,
            cores: Vec::new(),
            current: String::new(),
            current_len: 0,
            current_continues: false,
        }
    }

    fn push(&mut self, piece: &str, separator: &str) {
        let piece_len = piece.chars().count();

        if self.current.is_empty() {
            self.current.push_str(piece);
            self.current_len = piece_len;
            self.current_continues = false;
            return;
        }

        let separator_len = separator.chars().count();
        if self.current_len + separator_len + piece_len <= self.budget {
            self.current.push_str(separator);
            self.current.push_str(piece);
            self.current_len += separator_len + piece_len;
        } else {
            self.cores.push(Core {
                text: std::mem::take(&mut self.current),
                continues_word: self.current_continues,
            });
            self.current.push_str(piece);
            self.current_len = piece_len;
            self.current_continues = separator.is_empty();
        }
    }

    fn finish(mut self) -> Vec<Core> {
        if !self.current.is_empty() {
            self.cores.push(Core {
                text: self.current,
                continues_word: self.current_continues,
            });
        }
        self.cores
    }
}

/// Trailing context of `previous` to prepend to the next chunk
///
/// At most `overlap - 1` characters so that the tail plus its joining space
/// fits the reserved overlap budget. Starts on a word boundary.
fn overlap_tail(previous: &str, overlap: usize) -> Option<&str> {
    if overlap < 2 {
        return None;
    }

    let len = previous.chars().count();
    let window = overlap - 1;
    if len <= window {
        return Some(previous.trim()).filter(|s| !s.is_empty());
    }

    let start = previous.char_indices().nth(len - window).map(|(i, _)| i)?;
    let mid_word = previous[..start]
        .chars()
        .next_back()
        .is_some_and(|c| !c.is_whitespace());

    let tail = if mid_word {
        let rest = &previous[start..];
        let boundary = rest.find(char::is_whitespace)?;
        &rest[boundary..]
    } else {
        &previous[start..]
    };

    Some(tail.trim()).filter(|s| !s.is_empty())
}

fn hard_cut(word: &str, budget: usize) -> Vec<String> {
    word.chars()
        .collect::<Vec<_>>()
        .chunks(budget)
        .map(|c| c.iter().collect())
        .collect()
}

/// Rebuild document text from chunk contents
///
/// Chunks are joined with a space, except where a chunk continues a hard-cut word.
pub fn join_contents(chunks: &[Chunk]) -> String {
    let mut joined = String::new();
    for chunk in chunks {
        if !joined.is_empty() && !chunk.continues_word {
            joined.push(' ');
        }
        joined.push_str(chunk.content());
    }
    joined
}

/// Collapse every whitespace run to a single space and trim the ends
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(chunks: &[Chunk]) -> String {
        join_contents(chunks)
    }

    #[test]
    fn test_empty_input() {
        let chunker = Chunker::new(100, 10).unwrap();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\n\t  ").is_empty());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(10, 10).is_err());
        assert!(Chunker::new(10, 9).is_ok());
    }

    #[test]
    fn test_small_paragraphs_merge() {
        let chunker = Chunker::new(100, 0).unwrap();
        let chunks = chunker.chunk("First paragraph.\n\nSecond paragraph.");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "First paragraph.\n\nSecond paragraph.");
        assert_eq!(chunks[0].tag, ChunkTag::Text);
    }

    #[test]
    fn test_paragraph_boundaries_respected() {
        let chunker = Chunker::new(30, 0).unwrap();
        let text = "Cats are mammals that purr.\n\nDogs are mammals that bark.";
        let chunks = chunker.chunk(text);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Cats are mammals that purr.");
        assert_eq!(chunks[1].text, "Dogs are mammals that bark.");
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn test_sentence_fallback() {
        let chunker = Chunker::new(40, 0).unwrap();
        let text = "The sun is a star. It is very hot. Stars are far away from us.";
        let chunks = chunker.chunk(text);

        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].text, "The sun is a star. It is very hot.");
        for chunk in &chunks {
            assert!(chunk.char_len() <= 40);
        }
        assert_eq!(contents(&chunks), text);
    }

    #[test]
    fn test_hard_cut_long_word() {
        let chunker = Chunker::new(8, 0).unwrap();
        let chunks = chunker.chunk("abcdefghijklmnopqrst");

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcdefgh", "ijklmnop", "qrst"]);
        let continues: Vec<bool> = chunks.iter().map(|c| c.continues_word).collect();
        assert_eq!(continues, vec![false, true, true]);
    }

    #[test]
    fn test_hard_cut_word_round_trip() {
        let chunker = Chunker::new(8, 0).unwrap();
        let chunks = chunker.chunk("supercalifragilistic");
        assert_eq!(
            normalize_whitespace(&join_contents(&chunks)),
            "supercalifragilistic"
        );

        let chunker = Chunker::new(12, 4).unwrap();
        let text = "A pneumonoultramicroscopic word sits here.\n\nThen antidisestablishmentarianism ends it.";
        let chunks = chunker.chunk(text);
        assert!(chunks.iter().any(|c| c.continues_word));
        assert!(chunks.iter().all(|c| c.char_len() <= 12));
        assert_eq!(
            normalize_whitespace(&join_contents(&chunks)),
            normalize_whitespace(text)
        );
    }

    #[test]
    fn test_multibyte_characters() {
        let chunker = Chunker::new(5, 0).unwrap();
        let chunks = chunker.chunk("ééééééééééé");

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.char_len() <= 5));
    }

    #[test]
    fn test_overlap_prefix() {
        let chunker = Chunker::new(30, 10).unwrap();
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda";
        let chunks = chunker.chunk(text);

        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].overlap, 0);
        for pair in chunks.windows(2) {
            let prefix: String = pair[1].text.chars().take(pair[1].overlap).collect();
            assert!(pair[0].content().ends_with(prefix.trim_end()));
        }
        for chunk in &chunks {
            assert!(chunk.char_len() <= 30, "chunk too long: {:?}", chunk.text);
        }
        assert_eq!(contents(&chunks), text);
    }

    #[test]
    fn test_deterministic() {
        let chunker = Chunker::new(50, 12).unwrap();
        let text = "One sentence here. Another sentence there!\n\nA new paragraph? Yes indeed.";
        assert_eq!(chunker.chunk(text), chunker.chunk(text));
    }

    #[test]
    fn test_whitespace_normalized_round_trip() {
        let chunker = Chunker::new(25, 0).unwrap();
        let text = "  Lots   of\tspacing here.\r\n\r\nAnd   a second\nparagraph too.  ";
        let chunks = chunker.chunk(text);

        assert_eq!(
            normalize_whitespace(&contents(&chunks)),
            normalize_whitespace(text)
        );
    }

    #[test]
    fn test_image_chunk() {
        let chunk = Chunk::image(3, "  a red bicycle ");
        assert_eq!(chunk.text, "Image description: a red bicycle");
        assert_eq!(chunk.tag, ChunkTag::Image);
        assert_eq!(chunk.content(), chunk.text);
    }

    #[test]
    fn test_overlap_tail_word_boundary() {
        assert_eq!(overlap_tail("hello world again", 8), Some("again"));
        assert_eq!(overlap_tail("short", 10), Some("short"));
        assert_eq!(overlap_tail("anything", 1), None);
        assert_eq!(overlap_tail("unbrokenwordwithoutspaces", 5), None);
    }
}
