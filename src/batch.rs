//! Batch driver: find the inputs of one directory and convert each.
//!
//! Progress goes to a [`BatchObserver`]; every method has a no-op default,
//! so an observer only implements the events it cares about. The run
//! returns a [`BatchReport`] that can be written out as JSON.

use crate::config::BatchConfig;
use crate::convert::{ConversionOutcome, Converter, output_path_for};
use crate::error::{ConvertError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Receives batch events as files are converted.
pub trait BatchObserver {
    /// Called once with the number of files found (possibly zero).
    fn on_batch_start(&self, dir: &Path, total: usize) {
        let _ = (dir, total);
    }

    /// Called before each file; `index` is 1-based.
    fn on_file_start(&self, index: usize, total: usize, input: &Path, output: &Path) {
        let _ = (index, total, input, output);
    }

    fn on_file_converted(&self, input: &Path, outcome: &ConversionOutcome) {
        let _ = (input, outcome);
    }

    fn on_file_failed(&self, input: &Path, error: &ConvertError) {
        let _ = (input, error);
    }

    /// Called after the last file, only when at least one file was found.
    fn on_batch_complete(&self, report: &BatchReport) {
        let _ = report;
    }
}

/// Observer that ignores every event.
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Converted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,
    /// Characters drawn as `?` because the fonts cannot show them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substituted_chars: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub input_dir: PathBuf,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub files: Vec<FileReport>,
}

impl BatchReport {
    fn new(input_dir: &Path) -> Self {
        Self {
            input_dir: input_dir.to_path_buf(),
            total: 0,
            succeeded: 0,
            failed: 0,
            files: Vec::new(),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json().map_err(|e| ConvertError::Report {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        fs::write(path, json + "\n").map_err(|e| ConvertError::Report {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }
}

/// Regular, non-hidden files in `dir` whose final extension is exactly
/// `extension`, sorted by path. A missing directory yields no files.
pub fn discover_inputs(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "input directory does not exist");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(ConvertError::Read {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConvertError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || !path.is_file() {
            continue;
        }
        if path.extension() == Some(OsStr::new(extension)) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Convert every input of `config.input_dir`; per-file failures are
/// recorded and the batch carries on.
pub fn run_batch(
    config: &BatchConfig,
    converter: &Converter,
    observer: &dyn BatchObserver,
) -> Result<BatchReport> {
    let inputs = discover_inputs(&config.input_dir, &config.extension)?;
    let total = inputs.len();
    info!(dir = %config.input_dir.display(), total, "starting batch");
    observer.on_batch_start(&config.input_dir, total);

    let mut report = BatchReport::new(&config.input_dir);
    report.total = total;
    if total == 0 {
        return Ok(report);
    }

    for (i, input) in inputs.iter().enumerate() {
        let output = output_path_for(input);
        observer.on_file_start(i + 1, total, input, &output);
        match converter.convert_file(input, &output) {
            Ok(outcome) => {
                observer.on_file_converted(input, &outcome);
                report.succeeded += 1;
                report.files.push(FileReport {
                    input: input.clone(),
                    output,
                    status: FileStatus::Converted,
                    error: None,
                    pages: Some(outcome.pages),
                    substituted_chars: Some(outcome.substituted_chars),
                    bytes: Some(outcome.bytes),
                });
            }
            Err(e) => {
                warn!(input = %input.display(), error = %e, "conversion failed");
                observer.on_file_failed(input, &e);
                report.failed += 1;
                report.files.push(FileReport {
                    input: input.clone(),
                    output,
                    status: FileStatus::Failed,
                    error: Some(e.to_string()),
                    pages: None,
                    substituted_chars: None,
                    bytes: None,
                });
            }
        }
    }

    info!(succeeded = report.succeeded, failed = report.failed, "batch complete");
    observer.on_batch_complete(&report);
    Ok(report)
}
