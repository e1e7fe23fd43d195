//! Error types for the Markdown-to-PDF pipeline.
//!
//! [`ConvertError`] covers both failure classes of a batch run:
//!
//! * startup failures ([`ConvertError::UnknownTheme`]) abort the whole run
//!   before any file is touched;
//! * per-file failures (every other variant) are caught by the batch driver,
//!   reported against the offending file, and the batch moves on.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Startup ───────────────────────────────────────────────────────────
    /// The configured highlight theme is not bundled with the highlighter.
    #[error("highlight theme '{name}' is not available (available: {available})")]
    UnknownTheme { name: String, available: String },

    // ── Per-file ──────────────────────────────────────────────────────────
    /// Input could not be read, or is not valid UTF-8 text.
    #[error("cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The Markdown library failed to produce HTML.
    #[error("markdown rendering failed: {0}")]
    Markdown(String),

    /// A fenced code block could not be highlighted.
    #[error("syntax highlighting failed for language '{language}': {detail}")]
    Highlight { language: String, detail: String },

    /// The HTML document has no usable body.
    #[error("invalid HTML document: {0}")]
    Html(String),

    /// Layout or PDF assembly failed.
    #[error("PDF rendering failed: {0}")]
    Render(String),

    /// Output file could not be written.
    #[error("cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The JSON batch report could not be produced.
    #[error("cannot write report '{path}': {detail}")]
    Report { path: PathBuf, detail: String },
}

impl ConvertError {
    /// True for errors that abort the run before the batch loop starts.
    pub fn is_startup(&self) -> bool {
        matches!(self, ConvertError::UnknownTheme { .. })
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
