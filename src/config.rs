//! Conversion and batch configuration.
//!
//! [`ConvertOptions`] controls how one file is rendered; [`BatchConfig`]
//! adds where the inputs come from. Both default to the values of a plain
//! `mdpdf` run with no arguments.

use crate::highlight::DEFAULT_THEME;
use crate::pdf_generator::{PageOrientation, PageSize};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory scanned when none is given.
pub const DEFAULT_INPUT_DIR: &str = "Concurency";
/// File extension (without the dot) of the inputs.
pub const DEFAULT_EXTENSION: &str = "md";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertOptions {
    pub page_size: PageSize,
    pub orientation: PageOrientation,
    /// Draw a "Page N of M" footer.
    pub page_numbers: bool,
    /// FlateDecode the page content streams.
    pub compress: bool,
    /// Name of the bundled syntax highlighting theme.
    pub highlight_theme: String,
    /// Also write the intermediate HTML document next to the PDF.
    pub emit_html: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            page_size: PageSize::A4,
            orientation: PageOrientation::Portrait,
            page_numbers: false,
            compress: true,
            highlight_theme: DEFAULT_THEME.to_string(),
            emit_html: false,
        }
    }
}

impl ConvertOptions {
    pub fn with_page_size(mut self, page_size: PageSize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_orientation(mut self, orientation: PageOrientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_page_numbers(mut self, enabled: bool) -> Self {
        self.page_numbers = enabled;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    pub fn with_highlight_theme(mut self, theme: &str) -> Self {
        self.highlight_theme = theme.to_string();
        self
    }

    pub fn with_emit_html(mut self, enabled: bool) -> Self {
        self.emit_html = enabled;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub input_dir: PathBuf,
    /// Matched case-sensitively against the final extension.
    pub extension: String,
    pub convert: ConvertOptions,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            extension: DEFAULT_EXTENSION.to_string(),
            convert: ConvertOptions::default(),
        }
    }
}

impl BatchConfig {
    pub fn new(input_dir: impl AsRef<Path>) -> Self {
        Self {
            input_dir: input_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn with_convert_options(mut self, convert: ConvertOptions) -> Self {
        self.convert = convert;
        self
    }
}
