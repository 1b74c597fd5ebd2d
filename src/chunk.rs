//! Fixed-window text chunker.
//!
//! Splits text into windows of `chunk_size` characters where each window
//! after the first starts `chunk_size - overlap` characters after its
//! predecessor. Lengths are counted in Unicode scalar values so a window
//! never cuts through a multi-byte character.

use crate::config::ChunkingConfig;
use crate::error::InputConstraintViolation;
use crate::models::Chunk;

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, InputConstraintViolation> {
        if chunk_size == 0 {
            return Err(InputConstraintViolation::new("chunk_size must be > 0"));
        }
        if overlap >= chunk_size {
            return Err(InputConstraintViolation::new(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, InputConstraintViolation> {
        Self::new(config.chunk_size, config.overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn split(&self, text: &str) -> Vec<Chunk> {
        windows(text, self.chunk_size, self.overlap)
    }
}

/// Split `text` into overlapping windows.
///
/// A window starts at every character offset `0, step, 2*step, ...` below
/// the text length, with `step = chunk_size - overlap`; the last window may
/// be shorter than `chunk_size`. Empty text yields no chunks.
pub fn split(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, InputConstraintViolation> {
    Ok(Chunker::new(chunk_size, overlap)?.split(text))
}

fn windows(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    // Byte offset of every char boundary, plus the end of the string.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let char_len = bounds.len();
    bounds.push(text.len());

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < char_len {
        let end = (start + chunk_size).min(char_len);
        chunks.push(Chunk {
            index: chunks.len(),
            text: text[bounds[start]..bounds[end]].to_string(),
        });
        start += step;
    }

    chunks
}
