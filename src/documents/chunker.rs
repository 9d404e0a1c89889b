//! Document Chunking
//!
//! Splits extracted page text into fixed-size overlapping windows for
//! embedding and retrieval. Windows are measured in characters of the
//! whitespace-normalized page text and never cross a page boundary, so every
//! chunk can be cited back to exactly one page.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::{Generator, Ulid};

use super::normalize::normalize_whitespace;

/// Default window length in characters
pub const DEFAULT_CHUNK_SIZE: usize = 1200;

/// Default number of characters shared by consecutive windows
pub const DEFAULT_OVERLAP: usize = 200;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("Chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("Overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

impl Serialize for ChunkerError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Raw text of one page as produced by the extractor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageText {
    /// 1-based page number
    pub page: u32,
    pub text: String,
}

impl PageText {
    pub fn new(page: u32, text: impl Into<String>) -> Self {
        Self { page, text: text.into() }
    }
}

/// Validated windowing parameters.
///
/// Construction guarantees `overlap < chunk_size`, so the stride is always
/// positive and the window loop always terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawWindow")]
pub struct ChunkWindow {
    chunk_size: usize,
    overlap: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWindow {
    chunk_size: usize,
    overlap: usize,
}

impl TryFrom<RawWindow> for ChunkWindow {
    type Error = ChunkerError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        ChunkWindow::new(raw.chunk_size, raw.overlap)
    }
}

impl ChunkWindow {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkerError::OverlapTooLarge { chunk_size, overlap });
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between the starts of consecutive windows
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

impl Default for ChunkWindow {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// A chunk of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Point identifier, unique within the ingestion call
    pub id: String,
    /// Owning document
    pub document_id: String,
    /// 1-based source page
    pub page: u32,
    /// Position of this chunk in the document's chunk sequence
    pub index: usize,
    /// Start offset in the normalized page text (chars, inclusive)
    pub start_pos: usize,
    /// End offset in the normalized page text (chars, exclusive)
    pub end_pos: usize,
    /// Normalized, non-empty content
    pub text: String,
}

/// Character ranges `[start, end)` of every window over a text of
/// `char_count` characters. The final window may be short; nothing follows it.
pub fn window_ranges(char_count: usize, window: ChunkWindow) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    if char_count == 0 {
        return ranges;
    }

    let mut start = 0usize;
    loop {
        let end = (start + window.chunk_size).min(char_count);
        ranges.push((start, end));
        if end >= char_count {
            break;
        }
        start += window.stride();
    }
    ranges
}

/// Split pages into chunks, validating the window parameters first.
pub fn split(
    pages: &[PageText],
    document_id: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkerError> {
    let window = ChunkWindow::new(chunk_size, overlap)?;
    Ok(split_pages(pages, document_id, window))
}

/// Split pages into chunks.
///
/// All chunks of page N precede all chunks of page N+1 (input order), and
/// chunks of a page are in left-to-right offset order. Pages that normalize
/// to nothing contribute no chunks.
pub fn split_pages(pages: &[PageText], document_id: &str, window: ChunkWindow) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut ids = Generator::new();

    for page in pages {
        let text = normalize_whitespace(&page.text);
        if text.is_empty() {
            continue;
        }

        // Byte offset of every char boundary, including the end of the text
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = boundaries.len() - 1;

        for (start, end) in window_ranges(char_count, window) {
            chunks.push(Chunk {
                id: fresh_chunk_id(&mut ids),
                document_id: document_id.to_string(),
                page: page.page,
                index: chunks.len(),
                start_pos: start,
                end_pos: end,
                text: text[boundaries[start]..boundaries[end]].to_string(),
            });
        }
    }

    chunks
}

/// Expected number of chunks for a normalized text of `char_count` characters
pub fn expected_chunk_count(char_count: usize, window: ChunkWindow) -> usize {
    if char_count == 0 {
        return 0;
    }
    let remaining = char_count.saturating_sub(window.overlap);
    // A text no longer than the overlap still yields its one window
    remaining.div_ceil(window.stride()).max(1)
}

/// Monotonic ULIDs rendered in UUID form, which vector stores accept as
/// point ids.
fn fresh_chunk_id(ids: &mut Generator) -> String {
    let ulid = ids.generate().unwrap_or_else(|_| Ulid::new());
    let v = ulid.0;
    format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        (v >> 96) as u32,
        (v >> 80) as u16,
        (v >> 64) as u16,
        (v >> 48) as u16,
        v & 0xffff_ffff_ffff
    )
}
