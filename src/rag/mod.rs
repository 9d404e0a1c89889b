//! Retrieval-Augmented Generation
//!
//! Orchestrates ingestion and question answering over indexed documents.

pub mod citations;
pub mod context;
pub mod pipeline;

pub use citations::{citations_from_hits, make_snippet, Citation, SNIPPET_MAX_CHARS};
pub use context::{assemble_context, build_user_prompt, SYSTEM_INSTRUCTION};
pub use pipeline::{extract_pages, Answer, ErrorKind, IngestReport, RagError, RagPipeline, RagSettings};
