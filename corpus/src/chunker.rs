//! Recursive separator chunking with overlapping windows.
//!
//! Text is split on the coarsest separator first (paragraphs), and only the
//! pieces that are still too long are split again with the next finer one
//! (lines, sentences, words, characters). The resulting atoms are packed
//! greedily into windows of at most `chunk_size` characters, and each new
//! window starts with up to `overlap` characters carried over from the end
//! of the previous one.
//!
//! Lengths are counted in characters (Unicode scalar values), never bytes.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::WikiPage;
use crate::error::{CorpusError, Result};

/// Separators from coarsest to finest. The empty separator splits into
/// single characters and guarantees termination.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive windows in characters.
pub const DEFAULT_OVERLAP: usize = 200;

/// Default value of the `source` metadata field.
pub const DEFAULT_SOURCE: &str = "wiki";

/// A chunk of a source document, in the persisted record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier, stable within one chunking run.
    pub id: String,

    /// The chunk text. Never empty.
    pub text: String,

    /// Where the chunk came from.
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Title of the source document.
    pub fn source_title(&self) -> &str {
        &self.metadata.title
    }

    /// URL of the source document.
    pub fn source_url(&self) -> &str {
        &self.metadata.url
    }

    /// Number of characters in the chunk text.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Metadata about a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source document URL.
    pub url: String,

    /// Source document title.
    pub title: String,

    /// Name of the corpus the document belongs to.
    pub source: String,

    /// Position within the source document, 0-based.
    pub chunk_index: usize,

    /// Number of chunks produced from the source document.
    pub total_chunks: usize,
}

/// Configuration for the chunker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Maximum window size in characters.
    pub chunk_size: usize,

    /// Characters carried over between consecutive windows.
    pub overlap: usize,

    /// Separators from coarsest to finest.
    pub separators: Vec<String>,
}

impl ChunkerConfig {
    /// Create a configuration with the default separators.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Replace the separator list.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Check that the parameters describe a usable chunker.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(CorpusError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(CorpusError::InvalidConfig(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP)
    }
}

/// Recursive separator chunker.
///
/// Chunking is a pure function of the text and the configuration.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    config: ChunkerConfig,
}

impl RecursiveChunker {
    /// Create a chunker, rejecting invalid configurations.
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the configuration.
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `text` into window texts, in document order.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut windows = Vec::new();
        self.split_recursive(text, &self.config.separators, &mut windows);
        windows
    }

    fn split_recursive(&self, text: &str, separators: &[String], windows: &mut Vec<String>) {
        let Some((separator, finer)) = separators.split_first() else {
            // Nothing left to split on; keep the span whole.
            push_window(windows, text.to_string());
            return;
        };

        let mut pending: Vec<&str> = Vec::new();
        for atom in split_atoms(text, separator) {
            if char_len(atom) <= self.config.chunk_size {
                pending.push(atom);
                continue;
            }

            if !pending.is_empty() {
                self.merge(&pending, separator, windows);
                pending.clear();
            }
            self.split_recursive(atom, finer, windows);
        }

        if !pending.is_empty() {
            self.merge(&pending, separator, windows);
        }
    }

    /// Pack atoms into windows joined by `separator`.
    fn merge(&self, atoms: &[&str], separator: &str, windows: &mut Vec<String>) {
        let chunk_size = self.config.chunk_size;
        let overlap = self.config.overlap;
        let separator_len = char_len(separator);

        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for &atom in atoms {
            let atom_len = char_len(atom);
            let joint = |window: &VecDeque<&str>| {
                if window.is_empty() { 0 } else { separator_len }
            };

            if total + atom_len + joint(&window) > chunk_size && !window.is_empty() {
                push_window(windows, join(&window, separator));

                // Walk back from the end of the emitted window, keeping at
                // most `overlap` characters and leaving room for `atom`.
                while total > overlap
                    || (total > 0 && total + atom_len + joint(&window) > chunk_size)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total = total.saturating_sub(char_len(front) + joint(&window));
                }
            }

            total += atom_len + joint(&window);
            window.push_back(atom);
        }

        if !window.is_empty() {
            push_window(windows, join(&window, separator));
        }
    }
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self {
            config: ChunkerConfig::default(),
        }
    }
}

/// Split `text` into window texts with the default separators.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    Ok(RecursiveChunker::new(ChunkerConfig::new(chunk_size, overlap))?.split(text))
}

/// Turns wiki pages into [`Chunk`] records with run-wide ids.
pub struct CorpusChunker {
    chunker: RecursiveChunker,
    source: String,
}

impl CorpusChunker {
    /// Create a corpus chunker tagging every chunk with `source`.
    pub fn new(chunker: RecursiveChunker, source: impl Into<String>) -> Self {
        Self {
            chunker,
            source: source.into(),
        }
    }

    /// Chunk a single page, numbering ids from `first_id`.
    pub fn chunk_page(&self, page: &WikiPage, first_id: usize) -> Vec<Chunk> {
        let texts = self.chunker.split(&page.content);
        let total_chunks = texts.len();

        texts
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| Chunk {
                id: format!("chunk_{}", first_id + chunk_index),
                text,
                metadata: ChunkMetadata {
                    url: page.url.clone(),
                    title: page.title.clone(),
                    source: self.source.clone(),
                    chunk_index,
                    total_chunks,
                },
            })
            .collect()
    }

    /// Chunk every page. Ids run across pages: `chunk_0`, `chunk_1`, ...
    pub fn chunk_pages(&self, pages: &[WikiPage]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in pages {
            let page_chunks = self.chunk_page(page, chunks.len());
            debug!("Chunked '{}' into {} chunks", page.title, page_chunks.len());
            chunks.extend(page_chunks);
        }
        chunks
    }
}

impl Default for CorpusChunker {
    fn default() -> Self {
        Self::new(RecursiveChunker::default(), DEFAULT_SOURCE)
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split on `separator`, dropping empty pieces. The empty separator yields
/// one atom per character.
fn split_atoms<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(start, c)| &text[start..start + c.len_utf8()])
            .collect();
    }
    text.split(separator).filter(|s| !s.is_empty()).collect()
}

fn join(window: &VecDeque<&str>, separator: &str) -> String {
    window.iter().copied().collect::<Vec<_>>().join(separator)
}

fn push_window(windows: &mut Vec<String>, text: String) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        windows.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunker(chunk_size: usize, overlap: usize) -> RecursiveChunker {
        RecursiveChunker::new(ChunkerConfig::new(chunk_size, overlap)).unwrap()
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunker(100, 10).split("  A short page.  ");
        assert_eq!(chunks, vec!["A short page.".to_string()]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunker(100, 10).split("").is_empty());
        assert!(chunker(100, 10).split(" \n\n \n").is_empty());
    }

    #[test]
    fn test_paragraphs_are_packed_together() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunker(40, 0).split(text);
        assert_eq!(
            chunks,
            vec![
                "First paragraph.\n\nSecond paragraph.".to_string(),
                "Third paragraph.".to_string(),
            ]
        );
    }

    #[test]
    fn test_sentence_golden() {
        let chunks = chunker(5, 2).split("A. B. C.");
        assert_eq!(chunks, vec!["A. B".to_string(), "B. C.".to_string()]);
    }

    #[test]
    fn test_character_fallback() {
        let chunks = chunker(4, 1).split("abcdefghij");
        assert_eq!(
            chunks,
            vec!["abcd".to_string(), "defg".to_string(), "ghij".to_string()]
        );
    }

    #[test]
    fn test_lengths_are_counted_in_characters() {
        let chunks = chunker(3, 0).split("äöüß");
        assert_eq!(chunks, vec!["äöü".to_string(), "ß".to_string()]);
    }

    #[test]
    fn test_oversized_atom_kept_without_fallback() {
        let config = ChunkerConfig::new(5, 0).with_separators(["\n\n"]);
        let chunks = RecursiveChunker::new(config)
            .unwrap()
            .split("tiny\n\nmuch too long");
        assert_eq!(
            chunks,
            vec!["tiny".to_string(), "much too long".to_string()]
        );
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        assert!(RecursiveChunker::new(ChunkerConfig::new(0, 0)).is_err());
        assert!(RecursiveChunker::new(ChunkerConfig::new(10, 10)).is_err());
        assert!(RecursiveChunker::new(ChunkerConfig::new(10, 9)).is_ok());
    }

    #[test]
    fn test_chunk_pages_assigns_ids_and_positions() {
        let chunker = CorpusChunker::new(chunker(5, 2), "elden_ring_wiki");
        let pages = vec![
            WikiPage::new("https://wiki/a", "A", "A. B. C."),
            WikiPage::new("https://wiki/b", "B", "Tiny"),
        ];

        let chunks = chunker.chunk_pages(&pages);
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["chunk_0", "chunk_1", "chunk_2"]);

        assert_eq!(chunks[1].metadata.chunk_index, 1);
        assert_eq!(chunks[1].metadata.total_chunks, 2);
        assert_eq!(chunks[2].source_title(), "B");
        assert_eq!(chunks[2].source_url(), "https://wiki/b");
        assert_eq!(chunks[2].metadata.chunk_index, 0);
        assert_eq!(chunks[2].metadata.total_chunks, 1);
        assert_eq!(chunks[2].metadata.source, "elden_ring_wiki");
    }
}
