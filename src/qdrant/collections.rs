//! Qdrant Collection Schema
//!
//! Request bodies for the chunk collection and the document-scoped filter
//! every search uses.

use serde_json::{json, Value};

use crate::index::IndexedChunk;

/// Payload key holding the owning document id
pub const PAYLOAD_DOCUMENT_ID: &str = "docId";

/// Maximum points per upsert request
pub const UPSERT_BATCH_SIZE: usize = 256;

/// Body for `PUT /collections/{name}`
pub fn create_collection_body(vector_size: usize, distance: &str) -> Value {
    json!({
        "vectors": {
            "size": vector_size,
            "distance": distance,
        }
    })
}

/// Build a document-scoped filter
pub fn document_filter(document_id: &str) -> Value {
    json!({
        "must": [
            { "key": PAYLOAD_DOCUMENT_ID, "match": { "value": document_id } }
        ]
    })
}

/// Body for `POST /collections/{name}/points/search`
pub fn search_body(document_id: &str, query: &[f32], top_k: usize) -> Value {
    json!({
        "vector": query,
        "limit": top_k,
        "with_payload": true,
        "with_vector": false,
        "filter": document_filter(document_id),
    })
}

/// Body for `PUT /collections/{name}/points`
pub fn upsert_body(items: &[IndexedChunk]) -> Value {
    let points: Vec<Value> = items
        .iter()
        .map(|item| {
            json!({
                "id": item.id,
                "vector": item.vector,
                "payload": item.payload,
            })
        })
        .collect();
    json!({ "points": points })
}

/// Vector size from a `GET /collections/{name}` response, when the
/// collection uses a single unnamed vector.
pub fn configured_vector_size(info: &Value) -> Option<usize> {
    info["result"]["config"]["params"]["vectors"]["size"]
        .as_u64()
        .map(|s| s as usize)
}
