//! Answer Citations
//!
//! Maps ranked search hits to the citations returned with an answer.

use serde::{Deserialize, Serialize};

use crate::index::SearchHit;

/// Maximum snippet length in characters before truncation
pub const SNIPPET_MAX_CHARS: usize = 240;

const ELLIPSIS: char = '…';

/// Pointer from an answer back to a retrieved chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    /// 1-based rank, matching `[Chunk N]` in the prompt
    pub rank: usize,
    pub page: String,
    pub snippet: String,
}

/// Full text when it fits, else the first 240 chars plus an ellipsis
pub fn make_snippet(text: &str) -> String {
    match text.char_indices().nth(SNIPPET_MAX_CHARS) {
        None => text.to_string(),
        Some((cut, _)) => {
            let mut snippet = String::with_capacity(cut + ELLIPSIS.len_utf8());
            snippet.push_str(&text[..cut]);
            snippet.push(ELLIPSIS);
            snippet
        }
    }
}

/// One citation per hit, in hit order, ranks 1..=n
pub fn citations_from_hits(hits: &[SearchHit]) -> Vec<Citation> {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| Citation {
            rank: i + 1,
            page: hit.page.to_string(),
            snippet: make_snippet(&hit.text),
        })
        .collect()
}
