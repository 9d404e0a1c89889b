//! OpenAI HTTP Client
//!
//! Direct client for OpenAI-compatible `/embeddings` and `/chat/completions`
//! endpoints. One pooled `reqwest::Client` is built at construction and
//! reused for every call.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{ChatGateway, Embedding, EmbeddingGateway, GatewayError};
use crate::config::OpenAiConfig;

/// Backoff ceiling exponent (500ms * 2^5 = 16s)
const MAX_BACKOFF_EXPONENT: u32 = 5;

/// OpenAI-compatible embeddings and chat client
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    embedding_model: String,
    chat_model: String,
    temperature: f32,
    max_retries: u32,
    batch_size: usize,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self, GatewayError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| GatewayError::InvalidConfig("missing OpenAI API key".to_string()))?;
        if config.batch_size == 0 {
            return Err(GatewayError::InvalidConfig("batch size must be positive".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| GatewayError::InvalidConfig("invalid OpenAI API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            batch_size: config.batch_size,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// POST a JSON body, retrying rate limits, server errors and transport
    /// failures. Returns the raw success body.
    async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<String, GatewayError> {
        let mut attempt = 0u32;
        loop {
            match self.http.post(url).json(body).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await?;
                    if status.is_success() {
                        return Ok(text);
                    }
                    if should_retry(status) && attempt < self.max_retries {
                        attempt += 1;
                        warn!(status = %status, attempt = attempt, url = %url, "Retrying OpenAI request");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    error!(status = %status, body = %text, "OpenAI HTTP error");
                    return Err(GatewayError::Status { status: status.as_u16(), body: text });
                }
                Err(e) => {
                    if is_retryable(&e) && attempt < self.max_retries {
                        attempt += 1;
                        warn!(error = %e, attempt = attempt, url = %url, "Retrying OpenAI request");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    error!(error = %e, url = %url, "OpenAI request failed");
                    return Err(e.into());
                }
            }
        }
    }
}

#[async_trait]
impl EmbeddingGateway for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, GatewayError> {
        let url = self.endpoint("embeddings");
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let request = EmbeddingRequest {
                model: &self.embedding_model,
                input: batch,
            };
            let body = self.post_json(&url, &request).await?;
            let parsed: EmbeddingResponse = serde_json::from_str(&body)
                .map_err(|e| GatewayError::Deserialize(e.to_string()))?;
            vectors.extend(parsed.into_vectors(batch.len())?);
        }

        debug!(count = vectors.len(), model = %self.embedding_model, "Generated embeddings");
        Ok(vectors)
    }
}

#[async_trait]
impl ChatGateway for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, GatewayError> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: self.temperature,
        };

        let body = self.post_json(&self.endpoint("chat/completions"), &request).await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Deserialize(e.to_string()))?;
        let content = parsed.into_content()?;

        info!(model = %self.chat_model, chars = content.len(), "Chat completion received");
        Ok(content)
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 * (1 << attempt.min(MAX_BACKOFF_EXPONENT)))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Embedding,
    index: usize,
}

impl EmbeddingResponse {
    /// Vectors in input order; the provider may return `data` out of order.
    fn into_vectors(mut self, expected: usize) -> Result<Vec<Embedding>, GatewayError> {
        if self.data.len() != expected {
            return Err(GatewayError::CountMismatch { expected, actual: self.data.len() });
        }
        self.data.sort_by_key(|d| d.index);
        Ok(self.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ChatResponse {
    /// First choice's content; a null content is an empty answer.
    fn into_content(self) -> Result<String, GatewayError> {
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| GatewayError::Deserialize("response has no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordedRequest, StubServer};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config_with_key(key: Option<&str>) -> OpenAiConfig {
        OpenAiConfig {
            api_key: key.map(str::to_string),
            ..OpenAiConfig::default()
        }
    }

    #[test]
    fn test_new_requires_api_key() {
        assert!(matches!(
            OpenAiClient::new(&config_with_key(None)),
            Err(GatewayError::InvalidConfig(_))
        ));
        assert!(matches!(
            OpenAiClient::new(&config_with_key(Some("   "))),
            Err(GatewayError::InvalidConfig(_))
        ));
        assert!(OpenAiClient::new(&config_with_key(Some("sk-test"))).is_ok());
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let mut config = config_with_key(Some("sk-test"));
        config.base_url = "http://localhost:1234/v1/".to_string();
        let client = OpenAiClient::new(&config).unwrap();
        assert_eq!(client.endpoint("embeddings"), "http://localhost:1234/v1/embeddings");
    }

    #[test]
    fn test_embedding_response_reordered_by_index() {
        let body = r#"{"data": [
            {"embedding": [0.2, 0.2], "index": 1},
            {"embedding": [0.1, 0.1], "index": 0}
        ]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        let vectors = parsed.into_vectors(2).unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.1], vec![0.2, 0.2]]);
    }

    #[test]
    fn test_embedding_response_count_checked() {
        let body = r#"{"data": [{"embedding": [0.1], "index": 0}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(
            parsed.into_vectors(3),
            Err(GatewayError::CountMismatch { expected: 3, actual: 1 })
        ));
    }

    #[test]
    fn test_chat_response_content() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "It is blue [Chunk 1]."}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.into_content().unwrap(), "It is blue [Chunk 1].");
    }

    #[test]
    fn test_chat_response_null_content_is_empty() {
        let body = r#"{"choices": [{"message": {"content": null}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.into_content().unwrap(), "");
    }

    #[test]
    fn test_chat_response_without_choices_fails() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(parsed.into_content(), Err(GatewayError::Deserialize(_))));
    }

    #[test]
    fn test_chat_request_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: [
                ChatMessage { role: "system", content: "sys" },
                ChatMessage { role: "user", content: "usr" },
            ],
            temperature: 0.0,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "usr");
        assert_eq!(value["temperature"], 0.0);
    }

    #[test]
    fn test_retry_policy() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::BAD_GATEWAY));
        assert!(!should_retry(StatusCode::UNAUTHORIZED));
        assert!(retry_backoff(2) > retry_backoff(1));
        assert_eq!(retry_backoff(10), retry_backoff(MAX_BACKOFF_EXPONENT));
    }

    fn stub_client(url: &str, max_retries: u32, batch_size: usize) -> OpenAiClient {
        let config = OpenAiConfig {
            api_key: Some("sk-test".to_string()),
            base_url: url.to_string(),
            max_retries,
            batch_size,
            ..OpenAiConfig::default()
        };
        OpenAiClient::new(&config).unwrap()
    }

    /// One single-element vector per input holding its length, listed in
    /// reverse order with the matching `index`
    fn embeddings_reply(req: &RecordedRequest) -> String {
        let inputs = req.json()["input"].as_array().cloned().unwrap_or_default();
        let data: Vec<Value> = inputs
            .iter()
            .enumerate()
            .rev()
            .map(|(i, text)| json!({"embedding": [text.as_str().unwrap_or("").len() as f32], "index": i}))
            .collect();
        json!({"object": "list", "data": data, "model": "text-embedding-3-small"}).to_string()
    }

    #[tokio::test]
    async fn test_embed_retries_rate_limit_then_succeeds() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let server = StubServer::start(move |req| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                (429, r#"{"error":{"message":"Rate limit reached"}}"#.to_string())
            } else {
                (200, embeddings_reply(req))
            }
        })
        .await;
        let client = stub_client(&server.url, 2, 16);

        let vectors = client.embed(&["abc".to_string()]).await.unwrap();
        assert_eq!(vectors, vec![vec![3.0]]);
        assert_eq!(server.request_count(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = StubServer::start(|_| (401, r#"{"error":{"message":"Incorrect API key"}}"#.to_string())).await;
        let client = stub_client(&server.url, 3, 16);

        let err = client.embed(&["abc".to_string()]).await.unwrap_err();
        assert!(matches!(err, GatewayError::Status { status: 401, ref body } if body.contains("Incorrect API key")));
        assert_eq!(server.request_count(), 1);
    }

    #[tokio::test]
    async fn test_server_errors_retried_up_to_limit() {
        let server = StubServer::start(|_| (503, r#"{"error":{"message":"overloaded"}}"#.to_string())).await;
        let client = stub_client(&server.url, 1, 16);

        let err = client.complete("sys", "usr").await.unwrap_err();
        assert!(matches!(err, GatewayError::Status { status: 503, .. }));
        assert_eq!(server.request_count(), 2);
    }

    #[tokio::test]
    async fn test_embed_batches_keep_input_order() {
        let server = StubServer::start(|req| (200, embeddings_reply(req))).await;
        let client = stub_client(&server.url, 0, 2);

        let texts: Vec<String> = ["a", "bb", "ccc", "dddd", "eeeee"].iter().map(|t| t.to_string()).collect();
        let vectors = client.embed(&texts).await.unwrap();

        assert_eq!(vectors, vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0], vec![5.0]]);
        let requests = server.requests();
        assert_eq!(requests.len(), 3);
        for request in &requests {
            assert_eq!(request.path, "/embeddings");
            assert!(request.json()["input"].as_array().unwrap().len() <= 2);
        }
        assert_eq!(requests[2].json()["input"], json!(["eeeee"]));
    }

    #[tokio::test]
    async fn test_complete_sends_both_messages() {
        let server = StubServer::start(|_| {
            (200, r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Blue [Chunk 1]."}}]}"#.to_string())
        })
        .await;
        let client = stub_client(&server.url, 0, 16);

        let answer = client.complete("Use only the context.", "Question: colour?").await.unwrap();
        assert_eq!(answer, "Blue [Chunk 1].");

        let request = server.requests()[0].json();
        assert_eq!(request["messages"][0]["role"], "system");
        assert_eq!(request["messages"][0]["content"], "Use only the context.");
        assert_eq!(request["messages"][1]["content"], "Question: colour?");
    }
}
