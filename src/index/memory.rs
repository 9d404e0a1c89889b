//! In-Process Vector Index
//!
//! Brute-force cosine search over points held in memory. Fast enough for a
//! handful of documents; used by the `memory` backend and in tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use super::{ChunkPayload, IndexedChunk, SearchHit, VectorIndex, VectorIndexError};
use crate::providers::Embedding;

struct StoredPoint {
    id: String,
    vector: Embedding,
    payload: ChunkPayload,
}

#[derive(Default)]
struct Points {
    /// Insertion order, which breaks score ties
    entries: Vec<StoredPoint>,
    /// Point id to position in `entries`
    positions: HashMap<String, usize>,
}

/// Vector index kept in process memory
pub struct InMemoryIndex {
    dimension: usize,
    points: RwLock<Points>,
}

impl InMemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            points: RwLock::new(Points::default()),
        }
    }

    /// Number of stored points
    pub fn len(&self) -> usize {
        self.points.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_dimension(&self, actual: usize) -> Result<(), VectorIndexError> {
        if actual != self.dimension {
            return Err(VectorIndexError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }
}

/// Calculate cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn ensure_collection(&self) -> Result<(), VectorIndexError> {
        Ok(())
    }

    async fn upsert(&self, items: &[IndexedChunk]) -> Result<(), VectorIndexError> {
        for item in items {
            self.check_dimension(item.vector.len())?;
        }

        let mut points = self.points.write();
        for item in items {
            let point = StoredPoint {
                id: item.id.clone(),
                vector: item.vector.clone(),
                payload: item.payload.clone(),
            };
            match points.positions.get(&item.id).copied() {
                Some(pos) => points.entries[pos] = point,
                None => {
                    let pos = points.entries.len();
                    points.positions.insert(item.id.clone(), pos);
                    points.entries.push(point);
                }
            }
        }

        debug!(count = items.len(), total = points.entries.len(), "Upserted points in memory");
        Ok(())
    }

    async fn search(
        &self,
        document_id: &str,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, VectorIndexError> {
        self.check_dimension(query.len())?;

        let points = self.points.read();
        let mut scored: Vec<SearchHit> = points
            .entries
            .iter()
            .filter(|p| p.payload.document_id == document_id)
            .map(|p| SearchHit {
                id: p.id.clone(),
                score: cosine_similarity(query, &p.vector),
                page: p.payload.page,
                text: p.payload.text.clone(),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}
