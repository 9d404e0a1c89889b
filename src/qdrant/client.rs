//! Qdrant HTTP Client
//!
//! Direct HTTP client for Qdrant's REST API. Uses reqwest instead of the
//! gRPC client crate to keep the dependency stack small.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::collections::{
    configured_vector_size, create_collection_body, search_body, upsert_body, UPSERT_BATCH_SIZE,
};
use crate::config::QdrantConfig;
use crate::index::{IndexedChunk, SearchHit, VectorIndex, VectorIndexError};

/// Qdrant-backed vector index for one collection
#[derive(Clone)]
pub struct QdrantIndex {
    http: Client,
    base_url: String,
    collection: String,
    vector_size: usize,
    distance: String,
}

impl QdrantIndex {
    pub fn new(config: &QdrantConfig) -> Result<Self, VectorIndexError> {
        if !(config.endpoint.starts_with("http://") || config.endpoint.starts_with("https://")) {
            return Err(VectorIndexError::InvalidInput(format!(
                "Qdrant endpoint must be an http(s) URL: {}",
                config.endpoint
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            headers.insert(
                "api-key",
                HeaderValue::from_str(key.trim())
                    .map_err(|_| VectorIndexError::InvalidInput("invalid Qdrant API key".to_string()))?,
            );
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            vector_size: config.vector_size,
            distance: config.distance.clone(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    /// Raw collection info, or `None` if the collection does not exist
    pub async fn collection_info(&self) -> Result<Option<Value>, VectorIndexError> {
        let resp = self.http.get(self.collection_url()).send().await?;
        let status = resp.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = resp.text().await?;
        if !status.is_success() {
            error!(status = %status, body = %text, "Qdrant HTTP error");
            return Err(VectorIndexError::Status { status: status.as_u16(), body: text });
        }

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| VectorIndexError::Deserialize(format!("{}: {}", e, text)))
    }

    async fn create_collection(&self) -> Result<(), VectorIndexError> {
        let resp = self
            .http
            .put(self.collection_url())
            .json(&create_collection_body(self.vector_size, &self.distance))
            .send()
            .await?;
        let status = resp.status();

        if status == StatusCode::CONFLICT {
            // Another ingestion created it first
            debug!(collection = %self.collection, "Collection already exists (409)");
            return Ok(());
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Qdrant HTTP error");
            return Err(VectorIndexError::Status { status: status.as_u16(), body: text });
        }

        info!(collection = %self.collection, size = self.vector_size, "Created collection");
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn dimension(&self) -> usize {
        self.vector_size
    }

    async fn ensure_collection(&self) -> Result<(), VectorIndexError> {
        match self.collection_info().await? {
            Some(info) => {
                match configured_vector_size(&info) {
                    Some(size) if size != self.vector_size => {
                        error!(collection = %self.collection, expected = self.vector_size, actual = size, "Collection vector size mismatch");
                        return Err(VectorIndexError::DimensionMismatch {
                            expected: self.vector_size,
                            actual: size,
                        });
                    }
                    Some(_) => {}
                    None => warn!(collection = %self.collection, "Could not read collection vector size"),
                }
                debug!(collection = %self.collection, "Collection exists");
                Ok(())
            }
            None => self.create_collection().await,
        }
    }

    async fn upsert(&self, items: &[IndexedChunk]) -> Result<(), VectorIndexError> {
        if items.is_empty() {
            return Ok(());
        }

        let url = format!("{}/points?wait=true", self.collection_url());
        for batch in items.chunks(UPSERT_BATCH_SIZE) {
            let resp = self.http.put(&url).json(&upsert_body(batch)).send().await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                error!(status = %status, body = %text, "Qdrant HTTP error");
                return Err(VectorIndexError::Status { status: status.as_u16(), body: text });
            }
        }

        info!(collection = %self.collection, count = items.len(), "Upserted points");
        Ok(())
    }

    async fn search(
        &self,
        document_id: &str,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, VectorIndexError> {
        debug!(collection = %self.collection, doc_id = %document_id, top_k = top_k, "Searching collection");
        let resp = self
            .http
            .post(format!("{}/points/search", self.collection_url()))
            .json(&search_body(document_id, query, top_k))
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            // No collection yet, so no document has any points
            debug!(collection = %self.collection, "Collection not found; no hits");
            return Ok(Vec::new());
        }
        let text = resp.text().await?;
        if !status.is_success() {
            error!(status = %status, body = %text, "Qdrant HTTP error");
            return Err(VectorIndexError::Status { status: status.as_u16(), body: text });
        }

        parse_search_response(&text)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Value>,
}

/// Hits in the order Qdrant ranked them. Points missing a page or text get
/// 0 / empty rather than failing the whole query.
fn parse_search_response(text: &str) -> Result<Vec<SearchHit>, VectorIndexError> {
    let parsed: SearchResponse = serde_json::from_str(text)
        .map_err(|e| VectorIndexError::Deserialize(format!("{}: {}", e, text)))?;

    Ok(parsed
        .result
        .into_iter()
        .map(|point| {
            let payload = point.payload.unwrap_or(Value::Null);
            let id = match point.id {
                Value::String(s) => s,
                other => other.to_string(),
            };
            SearchHit {
                id,
                score: point.score,
                page: payload["page"].as_u64().unwrap_or(0) as u32,
                text: payload["text"].as_str().unwrap_or_default().to_string(),
            }
        })
        .collect())
}
