//! Word-window chunking for the retrieval index.

use crate::constants::retrieval::{CHUNK_OVERLAP_WORDS, CHUNK_SIZE_WORDS};

/// Split text into overlapping windows of whitespace-separated words.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(CHUNK_SIZE_WORDS, CHUNK_OVERLAP_WORDS)
    }
}

impl Chunker {
    /// `overlap` is clamped below `size` so the window always advances.
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            overlap: overlap.min(size - 1),
        }
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let stride = self.size - self.overlap;

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = (start + self.size).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end == words.len() {
                break;
            }
            start += stride;
        }
        chunks
    }
}
