//! Document chunking.
//!
//! [`FixedSizeChunker`] slides a window of `chunk_size` characters over a
//! document's text with stride `chunk_size - chunk_overlap`. Windows are
//! measured in characters, never bytes, so multi-byte text is never split
//! inside a code point.

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks, in document order.
    fn split(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text into fixed-size character windows with configurable overlap.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`. The last window
/// may be shorter than `chunk_size`; it is never padded. Text no longer than
/// `chunk_size` (including empty text) yields exactly one chunk.
///
/// # Example
///
/// ```rust
/// use bank_rag::{Chunker, Document, FixedSizeChunker};
///
/// let chunker = FixedSizeChunker::new(1000, 0).unwrap();
/// let doc = Document::new("faq-1", "What is the minimum balance?", "$500");
/// assert_eq!(chunker.split(&doc).len(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] unless
    /// `0 <= chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::InvalidConfiguration(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split raw text into `(start, end, text)` windows in character offsets.
    fn windows(&self, text: &str) -> Vec<(usize, usize, String)> {
        // Byte position of every char boundary, including the end.
        let boundaries: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let len = boundaries.len() - 1;
        let stride = self.chunk_size - self.chunk_overlap;

        let mut windows = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(len);
            windows.push((start, end, text[boundaries[start]..boundaries[end]].to_string()));
            if end == len {
                break;
            }
            start += stride;
        }
        windows
    }
}

impl Chunker for FixedSizeChunker {
    fn split(&self, document: &Document) -> Vec<Chunk> {
        self.windows(&document.text())
            .into_iter()
            .enumerate()
            .map(|(chunk_index, (start_offset, end_offset, text))| Chunk {
                id: format!("{}_{chunk_index}", document.id),
                document_id: document.id.clone(),
                text,
                start_offset,
                end_offset,
            })
            .collect()
    }
}
