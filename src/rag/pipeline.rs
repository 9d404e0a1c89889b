//! Retrieval-Augmented Generation Pipeline
//!
//! Ingestion: extract → chunk → embed (one batch) → upsert.
//! Query: embed question → search the document → assemble context → chat →
//! citations.
//!
//! The pipeline holds no per-document state; every call is an independent
//! request/response cycle. Collaborator failures abort the call and are never
//! retried here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ulid::Ulid;

use super::citations::{citations_from_hits, Citation};
use super::context::{assemble_context, build_user_prompt, SYSTEM_INSTRUCTION};
use crate::config::{ConfigError, IndexBackend, PdfChatConfig};
use crate::documents::chunker::{split_pages, ChunkWindow, PageText};
use crate::documents::extractor::{ExtractError, PageTextSource, PdftotextExtractor};
use crate::index::{InMemoryIndex, IndexedChunk, VectorIndex, VectorIndexError};
use crate::providers::{ChatGateway, Embedding, EmbeddingGateway, GatewayError, OpenAiClient};
use crate::qdrant::QdrantIndex;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Document ID is required")]
    EmptyDocumentId,
    #[error("Question is required")]
    EmptyQuestion,
    #[error("No file provided")]
    EmptyFile,
    #[error("topK must be positive")]
    InvalidTopK,
    #[error("Text extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("Embedding failed: {0}")]
    Embedding(GatewayError),
    #[error("Chat completion failed: {0}")]
    Chat(GatewayError),
    #[error("Vector index error: {0}")]
    VectorIndex(VectorIndexError),
    #[error("Embedding dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Embedding gateway returned {vectors} vectors for {inputs} inputs")]
    VectorCountMismatch { inputs: usize, vectors: usize },
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Operation cancelled")]
    Cancelled,
}

impl Serialize for RagError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<VectorIndexError> for RagError {
    fn from(e: VectorIndexError) -> Self {
        match e {
            VectorIndexError::DimensionMismatch { expected, actual } => {
                RagError::DimensionMismatch { expected, actual }
            }
            other => RagError::VectorIndex(other),
        }
    }
}

/// Failure classes callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad caller input, rejected before any external call
    Validation,
    /// Provider, vector store or extractor failure
    Collaborator,
    /// Embedding and index schema disagree; fatal for the process
    Configuration,
    /// Internal invariant broken, e.g. vector count differs from input count
    Consistency,
    Cancelled,
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::EmptyDocumentId
            | RagError::EmptyQuestion
            | RagError::EmptyFile
            | RagError::InvalidTopK => ErrorKind::Validation,
            RagError::Extract(_)
            | RagError::Embedding(_)
            | RagError::Chat(_)
            | RagError::VectorIndex(_) => ErrorKind::Collaborator,
            RagError::DimensionMismatch { .. } | RagError::Config(_) => ErrorKind::Configuration,
            RagError::VectorCountMismatch { .. } => ErrorKind::Consistency,
            RagError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Tunables read once from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RagSettings {
    pub window: ChunkWindow,
    pub top_k: usize,
}

impl RagSettings {
    pub fn from_config(config: &PdfChatConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            window: config.chunking.window()?,
            top_k: config.retrieval.top_k,
        })
    }
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            window: ChunkWindow::default(),
            top_k: 4,
        }
    }
}

/// Result of a successful ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub document_id: String,
    pub chunk_count: usize,
    pub page_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// Answer text with the citations of every retrieved chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub answer: String,
    pub citations: Vec<Citation>,
}

pub struct RagPipeline {
    settings: RagSettings,
    extractor: Arc<dyn PageTextSource>,
    embedder: Arc<dyn EmbeddingGateway>,
    chat: Arc<dyn ChatGateway>,
    index: Arc<dyn VectorIndex>,
}

/// Run `fut` unless `cancel` fires first. Dropping the future aborts any
/// in-flight request.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, RagError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RagError::Cancelled),
        out = fut => Ok(out),
    }
}

/// Extract page text from an upload, rejecting empty input before the
/// extractor runs.
pub async fn extract_pages(
    extractor: &dyn PageTextSource,
    bytes: &[u8],
    cancel: &CancellationToken,
) -> Result<Vec<PageText>, RagError> {
    if bytes.is_empty() {
        return Err(RagError::EmptyFile);
    }
    Ok(until_cancelled(cancel, extractor.extract(bytes)).await??)
}

impl RagPipeline {
    pub fn new(
        settings: RagSettings,
        extractor: Arc<dyn PageTextSource>,
        embedder: Arc<dyn EmbeddingGateway>,
        chat: Arc<dyn ChatGateway>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            settings,
            extractor,
            embedder,
            chat,
            index,
        }
    }

    /// Wire up the OpenAI client, pdftotext and the configured index backend.
    pub fn from_config(config: &PdfChatConfig) -> Result<Self, RagError> {
        let settings = RagSettings::from_config(config)?;
        let openai = Arc::new(
            OpenAiClient::new(&config.openai).map_err(|e| ConfigError::Invalid(e.to_string()))?,
        );
        let index: Arc<dyn VectorIndex> = match config.index.backend {
            IndexBackend::Qdrant => Arc::new(
                QdrantIndex::new(&config.qdrant).map_err(|e| ConfigError::Invalid(e.to_string()))?,
            ),
            IndexBackend::Memory => Arc::new(InMemoryIndex::new(config.qdrant.vector_size)),
        };
        debug!(backend = ?config.index.backend, collection = %config.qdrant.collection, "Pipeline configured");

        Ok(Self::new(
            settings,
            Arc::new(PdftotextExtractor::new()),
            openai.clone(),
            openai,
            index,
        ))
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    /// Extract pages from uploaded file bytes and ingest them.
    pub async fn ingest_file(&self, bytes: &[u8], cancel: &CancellationToken) -> Result<IngestReport, RagError> {
        let pages = extract_pages(self.extractor.as_ref(), bytes, cancel).await?;
        self.ingest(&pages, cancel).await
    }

    /// Chunk, embed and index pages under a freshly generated document id.
    ///
    /// The collection is ensured first, even for a document whose pages are
    /// all blank; such a document is then reported with zero chunks and
    /// nothing is embedded. Not transactional: a failed upsert may leave some
    /// points written.
    pub async fn ingest(&self, pages: &[PageText], cancel: &CancellationToken) -> Result<IngestReport, RagError> {
        let document_id = Ulid::new().to_string();
        let chunks = split_pages(pages, &document_id, self.settings.window);
        info!(doc_id = %document_id, pages = pages.len(), chunks = chunks.len(), "Ingesting document");

        until_cancelled(cancel, self.index.ensure_collection()).await??;

        if chunks.is_empty() {
            warn!(doc_id = %document_id, "Document has no text; nothing indexed");
            return Ok(IngestReport {
                document_id,
                chunk_count: 0,
                page_count: pages.len(),
                ingested_at: Utc::now(),
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = until_cancelled(cancel, self.embedder.embed(&texts))
            .await?
            .map_err(RagError::Embedding)?;
        self.check_vectors(texts.len(), &vectors)?;

        // Positional zip: vector i belongs to chunk i
        let chunk_count = chunks.len();
        let items: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedChunk::new(chunk, vector))
            .collect();

        until_cancelled(cancel, self.index.upsert(&items)).await??;

        info!(doc_id = %document_id, chunks = chunk_count, "Ingested document");
        Ok(IngestReport {
            document_id,
            chunk_count,
            page_count: pages.len(),
            ingested_at: Utc::now(),
        })
    }

    /// Answer with the configured `top_k`.
    pub async fn answer(
        &self,
        document_id: &str,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<Answer, RagError> {
        self.answer_with_top_k(document_id, question, self.settings.top_k, cancel).await
    }

    /// Answer `question` from the `top_k` chunks of `document_id` nearest to it.
    ///
    /// The chat model is asked even when nothing is retrieved, so it can say
    /// it does not know. Its text is returned verbatim.
    pub async fn answer_with_top_k(
        &self,
        document_id: &str,
        question: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Answer, RagError> {
        if document_id.trim().is_empty() {
            return Err(RagError::EmptyDocumentId);
        }
        if question.trim().is_empty() {
            return Err(RagError::EmptyQuestion);
        }
        if top_k == 0 {
            return Err(RagError::InvalidTopK);
        }

        let query = [question.to_string()];
        let vectors = until_cancelled(cancel, self.embedder.embed(&query))
            .await?
            .map_err(RagError::Embedding)?;
        self.check_vectors(query.len(), &vectors)?;
        let query_vector = &vectors[0];

        let hits = until_cancelled(cancel, self.index.search(document_id, query_vector, top_k)).await??;
        debug!(doc_id = %document_id, hits = hits.len(), "Retrieved chunks");

        let context = assemble_context(&hits);
        let user_prompt = build_user_prompt(question, &context);
        let answer = until_cancelled(cancel, self.chat.complete(SYSTEM_INSTRUCTION, &user_prompt))
            .await?
            .map_err(RagError::Chat)?;

        info!(doc_id = %document_id, hits = hits.len(), "Answered question");
        Ok(Answer {
            answer,
            citations: citations_from_hits(&hits),
        })
    }

    /// One vector per input, each matching the index dimension
    fn check_vectors(&self, inputs: usize, vectors: &[Embedding]) -> Result<(), RagError> {
        if vectors.len() != inputs {
            return Err(RagError::VectorCountMismatch {
                inputs,
                vectors: vectors.len(),
            });
        }
        let expected = self.index.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
        Ok(())
    }
}
