//! Vector Index
//!
//! Storage for (vector, payload) points and nearest-neighbour search scoped
//! to one document. Implementations own ranking: hits come back ordered by
//! descending similarity.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::documents::Chunk;
use crate::providers::Embedding;

pub use memory::InMemoryIndex;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Vector store HTTP error: {0}")]
    Http(String),
    #[error("Vector store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    #[error("Vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Serialize for VectorIndexError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<reqwest::Error> for VectorIndexError {
    fn from(e: reqwest::Error) -> Self {
        VectorIndexError::Http(e.to_string())
    }
}

/// Metadata stored alongside each vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    #[serde(rename = "docId")]
    pub document_id: String,
    pub page: u32,
    pub text: String,
}

/// A chunk paired with its embedding, ready to upsert
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub id: String,
    pub vector: Embedding,
    pub payload: ChunkPayload,
}

impl IndexedChunk {
    pub fn new(chunk: Chunk, vector: Embedding) -> Self {
        Self {
            id: chunk.id,
            vector,
            payload: ChunkPayload {
                document_id: chunk.document_id,
                page: chunk.page,
                text: chunk.text,
            },
        }
    }
}

/// One similarity search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub page: u32,
    pub text: String,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Vector length the index schema expects
    fn dimension(&self) -> usize;

    /// Create the backing collection if absent. Already existing is success.
    async fn ensure_collection(&self) -> Result<(), VectorIndexError>;

    /// Insert or replace points by id.
    async fn upsert(&self, items: &[IndexedChunk]) -> Result<(), VectorIndexError>;

    /// Up to `top_k` points of `document_id` nearest to `query`, best first.
    async fn search(
        &self,
        document_id: &str,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, VectorIndexError>;
}
