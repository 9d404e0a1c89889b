//! PDF Page Text Extraction
//!
//! Turns uploaded PDF bytes into ordered per-page text using poppler's
//! `pdftotext`, which separates pages with form feeds.

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tempfile::TempPath;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::chunker::PageText;

/// Page separator emitted by pdftotext
const FORM_FEED: char = '\u{c}';

/// File name prefix of staged uploads
const STAGING_PREFIX: &str = "pdfchat_";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("pdftotext could not be run (is poppler installed?): {0}")]
    ToolMissing(String),
    #[error("pdftotext failed: {0}")]
    ToolFailed(String),
}

impl Serialize for ExtractError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Source of ordered page text for an uploaded file
#[async_trait]
pub trait PageTextSource: Send + Sync {
    /// Pages in document order, numbered from 1
    async fn extract(&self, bytes: &[u8]) -> Result<Vec<PageText>, ExtractError>;
}

/// Extractor backed by the `pdftotext` binary
#[derive(Debug, Clone)]
pub struct PdftotextExtractor {
    binary: PathBuf,
    /// Where the upload is staged; the system temp dir when unset
    scratch_dir: Option<PathBuf>,
}

impl PdftotextExtractor {
    pub fn new() -> Self {
        Self::with_binary("pdftotext")
    }

    /// Use a specific pdftotext binary instead of the one on PATH
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            scratch_dir: None,
        }
    }

    /// Stage uploads in `dir` instead of the system temp dir
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    fn staging_file(&self) -> std::io::Result<TempPath> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX).suffix(".pdf");
        let file = match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(file.into_temp_path())
    }
}

impl Default for PdftotextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageTextSource for PdftotextExtractor {
    async fn extract(&self, bytes: &[u8]) -> Result<Vec<PageText>, ExtractError> {
        // Removed on drop, including when the caller abandons this future
        let staged = self.staging_file()?;
        tokio::fs::write(&staged, bytes).await?;
        debug!(path = %staged.display(), bytes = bytes.len(), "Staged upload for pdftotext");

        let output = Command::new(&self.binary)
            .arg("-layout")
            .arg("-enc")
            .arg("UTF-8")
            .arg(&*staged)
            .arg("-")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ExtractError::ToolMissing(e.to_string()));

        if let Err(e) = staged.close() {
            warn!(error = %e, "Failed to remove staged PDF");
        }

        let output = output?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ExtractError::ToolFailed(stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let pages = split_form_feeds(&stdout);
        info!(pages = pages.len(), "Extracted PDF text");
        Ok(pages)
    }
}

/// Split pdftotext output into pages numbered from 1.
///
/// pdftotext terminates every page with a form feed, so the segment after
/// the last one is not a page.
pub fn split_form_feeds(output: &str) -> Vec<PageText> {
    let mut segments: Vec<&str> = output.split(FORM_FEED).collect();
    if segments.last().is_some_and(|s| s.trim().is_empty()) {
        segments.pop();
    }

    segments
        .into_iter()
        .enumerate()
        .map(|(i, text)| PageText::new(i as u32 + 1, text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    #[test]
    fn test_split_form_feeds_numbers_from_one() {
        let pages = split_form_feeds("first page\u{c}second page\u{c}");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0], PageText::new(1, "first page"));
        assert_eq!(pages[1], PageText::new(2, "second page"));
    }

    #[test]
    fn test_blank_pages_keep_their_numbers() {
        let pages = split_form_feeds("one\u{c}\u{c}three\u{c}");
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1].text, "");
        assert_eq!(pages[2].page, 3);
    }

    #[test]
    fn test_output_without_trailing_form_feed() {
        let pages = split_form_feeds("only page");
        assert_eq!(pages, vec![PageText::new(1, "only page")]);
    }

    #[test]
    fn test_trailing_whitespace_segment_dropped() {
        let pages = split_form_feeds("a\u{c}b\u{c}\n");
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn test_empty_output_has_no_pages() {
        assert!(split_form_feeds("").is_empty());
    }

    fn staged_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(STAGING_PREFIX))
            })
            .collect()
    }

    /// Executable shell script standing in for pdftotext
    #[cfg(unix)]
    fn fake_tool(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-pdftotext");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let scratch = tempfile::tempdir().unwrap();
        let extractor = PdftotextExtractor::with_binary("/nonexistent/pdftotext-binary")
            .scratch_dir(scratch.path());
        let err = extractor.extract(b"%PDF-1.4").await.unwrap_err();
        assert!(matches!(err, ExtractError::ToolMissing(_)));
        assert!(staged_files(scratch.path()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tool_output_split_into_pages() {
        let tools = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let tool = fake_tool(tools.path(), r"printf 'page one\fpage two\f'");
        let extractor = PdftotextExtractor::with_binary(tool).scratch_dir(scratch.path());

        let pages = extractor.extract(b"%PDF-1.4").await.unwrap();
        assert_eq!(pages, vec![PageText::new(1, "page one"), PageText::new(2, "page two")]);
        assert!(staged_files(scratch.path()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tool_failure_removes_staged_file() {
        let tools = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let tool = fake_tool(tools.path(), "echo 'Syntax Error: broken xref' >&2; exit 1");
        let extractor = PdftotextExtractor::with_binary(tool).scratch_dir(scratch.path());

        let err = extractor.extract(b"not a pdf").await.unwrap_err();
        assert!(matches!(err, ExtractError::ToolFailed(ref msg) if msg.contains("broken xref")));
        assert!(staged_files(scratch.path()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abandoned_extraction_removes_staged_file() {
        let tools = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let tool = fake_tool(tools.path(), "sleep 5");
        let extractor = PdftotextExtractor::with_binary(tool).scratch_dir(scratch.path());

        let outcome = tokio::time::timeout(Duration::from_millis(300), extractor.extract(b"%PDF-1.4")).await;
        assert!(outcome.is_err());
        assert!(staged_files(scratch.path()).is_empty());
    }
}
