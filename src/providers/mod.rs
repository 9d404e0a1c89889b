//! Model Provider Gateways
//!
//! The embedding and chat capabilities the pipeline consumes, independent of
//! which provider serves them.

pub mod openai;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use openai::OpenAiClient;

/// Embedding vector
pub type Embedding = Vec<f32>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Provider HTTP error: {0}")]
    Http(String),
    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed provider response: {0}")]
    Deserialize(String),
    #[error("Provider returned {actual} embeddings for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),
}

impl Serialize for GatewayError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::Http(e.to_string())
    }
}

/// Converts text into fixed-length vectors.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// One vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, GatewayError>;
}

/// Produces free-text completions.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, GatewayError>;
}
