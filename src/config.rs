//! Process Configuration
//!
//! Loaded once at startup from `~/.pdfchat/config.json` (or an explicit
//! path), overlaid with environment secrets, validated, and then handed to
//! each component at construction.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::documents::chunker::{ChunkWindow, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};

/// Directory under the home directory holding pdfchat state
const APP_DIR_NAME: &str = ".pdfchat";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Home directory not found")]
    NoHomeDir,
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl Serialize for ConfigError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Retries after the first attempt on 429/5xx/transport errors
    pub max_retries: u32,
    /// Maximum inputs per embeddings request
    pub batch_size: usize,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            timeout_secs: 60,
            max_retries: 3,
            batch_size: 128,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QdrantConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub collection: String,
    /// Must equal the embedding model's output dimension
    pub vector_size: usize,
    pub distance: String,
    pub timeout_secs: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:6333".to_string(),
            api_key: None,
            collection: "pdf_chunks".to_string(),
            vector_size: 1536,
            distance: "Cosine".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn window(&self) -> Result<ChunkWindow, ConfigError> {
        ChunkWindow::new(self.chunk_size, self.overlap).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}

/// Which vector index implementation backs the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Qdrant,
    /// Process-local, lost on exit
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexConfig {
    pub backend: IndexBackend,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PdfChatConfig {
    pub openai: OpenAiConfig,
    pub qdrant: QdrantConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub index: IndexConfig,
}

/// Get the pdfchat app directory (~/.pdfchat)
pub fn app_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(APP_DIR_NAME))
        .ok_or(ConfigError::NoHomeDir)
}

/// Default config file location (~/.pdfchat/config.json)
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dir()?.join(CONFIG_FILE_NAME))
}

impl PdfChatConfig {
    /// Load, apply environment overrides and validate.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used and a missing file means built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = default_config_path()?;
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Overlay secrets and endpoints from the environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }
        if let Some(url) = non_empty("OPENAI_BASE_URL") {
            self.openai.base_url = url;
        }
        if let Some(url) = non_empty("QDRANT_URL") {
            self.qdrant.endpoint = url;
        }
        if let Some(key) = non_empty("QDRANT_API_KEY") {
            self.qdrant.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.window()?;
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid("retrieval.topK must be positive".to_string()));
        }
        if self.qdrant.vector_size == 0 {
            return Err(ConfigError::Invalid("qdrant.vectorSize must be positive".to_string()));
        }
        if self.openai.batch_size == 0 {
            return Err(ConfigError::Invalid("openai.batchSize must be positive".to_string()));
        }
        if self.qdrant.collection.trim().is_empty() {
            return Err(ConfigError::Invalid("qdrant.collection must not be empty".to_string()));
        }
        Ok(())
    }

    /// Fails for the `memory` backend, whose points are gone once the
    /// process exits. Commands that query a document ingested by an earlier
    /// run need this.
    pub fn require_persistent_index(&self) -> Result<(), ConfigError> {
        match self.index.backend {
            IndexBackend::Qdrant => Ok(()),
            IndexBackend::Memory => Err(ConfigError::Invalid(
                "index.backend \"memory\" keeps nothing between runs; use `chat` or the qdrant backend".to_string(),
            )),
        }
    }

    /// Copy safe for display, with API keys masked
    pub fn redacted(&self) -> Self {
        let mask = |key: &Option<String>| key.as_ref().map(|_| "********".to_string());
        let mut copy = self.clone();
        copy.openai.api_key = mask(&self.openai.api_key);
        copy.qdrant.api_key = mask(&self.qdrant.api_key);
        copy
    }
}
