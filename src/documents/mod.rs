//! Document Processing Module
//!
//! Handles page text extraction, normalization and chunking of uploaded PDFs.

pub mod chunker;
pub mod extractor;
pub mod normalize;

// Re-export key public types
pub use chunker::{Chunk, ChunkWindow, ChunkerError, PageText};
pub use extractor::{ExtractError, PageTextSource, PdftotextExtractor};
pub use normalize::normalize_whitespace;
