// pdfchat Library
// Exports core modules for use by the CLI binary and embedding hosts

pub mod config;
pub mod documents;
pub mod index;
pub mod providers;
pub mod qdrant;
pub mod rag;

#[cfg(test)]
mod test_support;

// Re-export commonly used types for the CLI
pub use config::{
    ConfigError, PdfChatConfig, OpenAiConfig, QdrantConfig, ChunkingConfig, RetrievalConfig,
    IndexBackend, IndexConfig, app_dir, default_config_path,
};

pub use documents::{
    Chunk, ChunkWindow, ChunkerError, PageText, ExtractError, PageTextSource, PdftotextExtractor,
    normalize_whitespace,
};
pub use documents::chunker::{split, split_pages, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};

pub use index::{VectorIndex, VectorIndexError, IndexedChunk, ChunkPayload, SearchHit, InMemoryIndex};
pub use providers::{ChatGateway, EmbeddingGateway, Embedding, GatewayError, OpenAiClient};
pub use qdrant::QdrantIndex;

pub use rag::{
    RagPipeline, RagSettings, extract_pages, RagError, ErrorKind, IngestReport, Answer, Citation,
    SYSTEM_INSTRUCTION,
};
