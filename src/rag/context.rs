//! Prompt Context Assembly
//!
//! Builds the numbered context block and the instructions sent to the chat
//! model. The `[Chunk N]` numbering here is the same rank carried by the
//! citations returned alongside the answer.

use crate::index::SearchHit;

/// Fixed instruction for the answering model
pub const SYSTEM_INSTRUCTION: &str = "You are a careful document assistant. \
Answer using ONLY the provided context from the user's document. \
If the answer is not in the context, say that you don't know. \
Cite the chunks you used with their labels, like [Chunk 2]. \
Do not give clinical or medical advice unless the user explicitly asks for it.";

/// Section header for the hit at `rank` (1-based)
pub fn chunk_label(rank: usize, page: u32) -> String {
    format!("[Chunk {} | Page {}]", rank, page)
}

/// Labeled sections in ranked order, separated by a blank line. Empty when
/// there are no hits.
pub fn assemble_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| format!("{}\n{}", chunk_label(i + 1, hit.page), hit.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The question followed by the context block
pub fn build_user_prompt(question: &str, context: &str) -> String {
    format!("Question: {}\n\nContext:\n{}", question, context)
}
