//! pdfchat CLI
//!
//! Command-line interface for ingesting PDFs and asking questions about them.
//! Results are printed to stdout as JSON; logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pdfchat_lib::{
    // Config
    ConfigError, PdfChatConfig, default_config_path,
    // Documents
    ChunkWindow, ChunkerError, PdftotextExtractor, split_pages,
    // Pipeline
    Answer, ErrorKind, RagError, RagPipeline, extract_pages,
};

/// Default log filter when RUST_LOG is unset
const DEFAULT_LOG_FILTER: &str = "pdfchat=info,pdfchat_lib=info";

#[derive(Parser)]
#[command(name = "pdfchat")]
#[command(about = "pdfchat CLI - Ask questions about your PDFs", long_about = None)]
struct Cli {
    /// Config file (default: ~/.pdfchat/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, chunk, embed and index a PDF
    Ingest {
        /// Path to the PDF file
        path: PathBuf,
    },
    /// Ask a question about an ingested document
    Ask {
        /// Document ID returned by ingest
        document_id: String,
        /// Question text
        question: String,
        /// Number of chunks to retrieve (default: from config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Ingest a PDF, then answer questions read line by line from stdin
    Chat {
        /// Path to the PDF file
        path: PathBuf,
    },
    /// Show how a PDF would be chunked, without calling any service
    Chunk {
        /// Path to the PDF file
        path: PathBuf,
        /// Window size in characters (default: from config)
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Overlap in characters (default: from config)
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective config with secrets masked
    Show,
}

// ============ Output Types ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChunkOutput {
    page: u32,
    index: usize,
    start_pos: usize,
    end_pos: usize,
    chars: usize,
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChunkSummaryOutput {
    page_count: usize,
    chunk_count: usize,
    chunk_size: usize,
    overlap: usize,
    chunks: Vec<ChunkOutput>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatTurnOutput {
    question: String,
    #[serde(flatten)]
    answer: Answer,
}

#[derive(Serialize)]
struct ConfigInitOutput {
    status: &'static str,
    path: String,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
}

impl ErrorOutput {
    fn from_error(e: &anyhow::Error) -> Self {
        let kind = if let Some(rag) = e.downcast_ref::<RagError>() {
            Some(rag.kind())
        } else if e.downcast_ref::<ConfigError>().is_some() {
            Some(ErrorKind::Configuration)
        } else if e.downcast_ref::<ChunkerError>().is_some() {
            Some(ErrorKind::Validation)
        } else {
            None
        };
        Self {
            error: format!("{:#}", e),
            kind,
        }
    }
}

// ============ Main ============

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Ingest { path } => handle_ingest(config_path, &path, &cancel).await,
        Commands::Ask { document_id, question, top_k } => {
            handle_ask(config_path, &document_id, &question, top_k, &cancel).await
        }
        Commands::Chat { path } => handle_chat(config_path, &path, &cancel).await,
        Commands::Chunk { path, chunk_size, overlap } => {
            handle_chunk(config_path, &path, chunk_size, overlap, &cancel).await
        }
        Commands::Config { action } => handle_config(config_path, action),
    };

    match result {
        Ok(json) => println!("{}", json),
        Err(e) => {
            let error = ErrorOutput::from_error(&e);
            match serde_json::to_string(&error) {
                Ok(json) => println!("{}", json),
                Err(_) => eprintln!("{}", error.error),
            }
            std::process::exit(1);
        }
    }
}

// ============ Handlers ============

fn build_pipeline(config_path: Option<&Path>) -> anyhow::Result<RagPipeline> {
    let config = PdfChatConfig::load(config_path)?;
    Ok(RagPipeline::from_config(&config)?)
}

async fn read_pdf(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn handle_ingest(
    config_path: Option<&Path>,
    path: &Path,
    cancel: &CancellationToken,
) -> anyhow::Result<String> {
    let config = PdfChatConfig::load(config_path)?;
    if config.require_persistent_index().is_err() {
        warn!("Memory index is discarded on exit; use `chat` to ask questions about this file");
    }
    let pipeline = RagPipeline::from_config(&config)?;
    let bytes = read_pdf(path).await?;
    let report = pipeline.ingest_file(&bytes, cancel).await?;
    Ok(serde_json::to_string(&report)?)
}

async fn handle_ask(
    config_path: Option<&Path>,
    document_id: &str,
    question: &str,
    top_k: Option<usize>,
    cancel: &CancellationToken,
) -> anyhow::Result<String> {
    let config = PdfChatConfig::load(config_path)?;
    config.require_persistent_index()?;
    let pipeline = RagPipeline::from_config(&config)?;
    let top_k = top_k.unwrap_or(pipeline.settings().top_k);
    let answer = pipeline.answer_with_top_k(document_id, question, top_k, cancel).await?;
    Ok(serde_json::to_string(&answer)?)
}

/// Each answered line is printed as it completes; the final output is the
/// ingest report.
async fn handle_chat(
    config_path: Option<&Path>,
    path: &Path,
    cancel: &CancellationToken,
) -> anyhow::Result<String> {
    let pipeline = build_pipeline(config_path)?;
    let bytes = read_pdf(path).await?;
    let report = pipeline.ingest_file(&bytes, cancel).await?;
    info!(doc_id = %report.document_id, chunks = report.chunk_count, "Ready for questions");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return Err(RagError::Cancelled.into()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        match pipeline.answer(&report.document_id, question, cancel).await {
            Ok(answer) => {
                let turn = ChatTurnOutput {
                    question: question.to_string(),
                    answer,
                };
                println!("{}", serde_json::to_string(&turn)?);
            }
            // Later questions can still succeed after a provider hiccup
            Err(e) if e.kind() == ErrorKind::Collaborator => {
                let error = ErrorOutput::from_error(&anyhow::Error::new(e));
                println!("{}", serde_json::to_string(&error)?);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(serde_json::to_string(&report)?)
}

async fn handle_chunk(
    config_path: Option<&Path>,
    path: &Path,
    chunk_size: Option<usize>,
    overlap: Option<usize>,
    cancel: &CancellationToken,
) -> anyhow::Result<String> {
    let config = PdfChatConfig::load(config_path)?;
    let window = ChunkWindow::new(
        chunk_size.unwrap_or(config.chunking.chunk_size),
        overlap.unwrap_or(config.chunking.overlap),
    )?;

    let bytes = read_pdf(path).await?;
    let pages = extract_pages(&PdftotextExtractor::new(), &bytes, cancel).await?;
    let chunks = split_pages(&pages, "preview", window);

    let output = ChunkSummaryOutput {
        page_count: pages.len(),
        chunk_count: chunks.len(),
        chunk_size: window.chunk_size(),
        overlap: window.overlap(),
        chunks: chunks
            .into_iter()
            .map(|c| ChunkOutput {
                page: c.page,
                index: c.index,
                start_pos: c.start_pos,
                end_pos: c.end_pos,
                chars: c.text.chars().count(),
                text: c.text,
            })
            .collect(),
    };

    Ok(serde_json::to_string(&output)?)
}

fn handle_config(config_path: Option<&Path>, action: ConfigAction) -> anyhow::Result<String> {
    match action {
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(p) => p.to_path_buf(),
                None => default_config_path()?,
            };
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            PdfChatConfig::default().save(&path)?;
            let output = ConfigInitOutput {
                status: "created",
                path: path.display().to_string(),
            };
            Ok(serde_json::to_string(&output)?)
        }

        ConfigAction::Show => {
            let config = PdfChatConfig::load(config_path)?;
            Ok(serde_json::to_string_pretty(&config.redacted())?)
        }
    }
}
