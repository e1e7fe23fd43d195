//! Single-file conversion: Markdown -> HTML document -> PDF.
//!
//! A [`Converter`] loads the highlighter once and is reused for every file
//! of a batch. Each call reads the whole input, renders it in memory and
//! writes the output with one `fs::write`, so a failure never leaves a
//! half-written PDF behind.

use crate::config::ConvertOptions;
use crate::elements::parse_html;
use crate::error::{ConvertError, Result};
use crate::highlight::Highlighter;
use crate::markdown::MarkdownRenderer;
use crate::pdf_generator::{DocumentInfo, PageLayout, assemble_pdf};
use crate::renderer::PdfRenderer;
use crate::theme::{Theme, pt, wrap_document};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// What a successful conversion produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionOutcome {
    pub output: PathBuf,
    pub pages: usize,
    pub bytes: usize,
    /// Characters the base-14 fonts cannot show, drawn as `?`.
    pub substituted_chars: usize,
    /// Intermediate HTML document, when requested.
    pub html_output: Option<PathBuf>,
}

/// An HTML document rendered to PDF bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPdf {
    pub bytes: Vec<u8>,
    pub pages: usize,
    pub substituted_chars: usize,
}

/// The PDF that belongs to `input`: same directory and stem, `pdf` extension.
pub fn output_path_for(input: &Path) -> PathBuf {
    input.with_extension("pdf")
}

pub struct Converter {
    highlighter: Highlighter,
    theme: Theme,
    options: ConvertOptions,
    stylesheet: String,
}

impl Converter {
    /// Fails with [`ConvertError::UnknownTheme`] when the configured
    /// highlight theme is not bundled.
    pub fn new(options: ConvertOptions) -> Result<Self> {
        let highlighter = Highlighter::new(&options.highlight_theme)?;
        let theme = Theme::default();
        let mut stylesheet = theme.stylesheet();
        stylesheet.push_str(&highlighter.stylesheet()?);
        debug!(theme = highlighter.theme_name(), "converter ready");
        Ok(Self {
            highlighter,
            theme,
            options,
            stylesheet,
        })
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    pub fn page_layout(&self) -> PageLayout {
        let margin = pt(self.theme.page_margin_px) + pt(self.theme.body_margin_px);
        PageLayout::new(self.options.page_size, self.options.orientation, margin)
    }

    /// Render Markdown into a complete HTML document titled `title`.
    pub fn render_html(&self, markdown: &str, title: &str) -> Result<String> {
        let fragment = MarkdownRenderer::new(&self.highlighter).render(markdown)?;
        Ok(wrap_document(title, &fragment, &self.stylesheet))
    }

    /// Lay out an HTML document into PDF bytes.
    pub fn render_pdf(&self, html: &str) -> Result<RenderedPdf> {
        let palette = self.highlighter.palette();
        let document = parse_html(html, &palette)?;
        debug!(elements = document.elements.len(), "parsed HTML document");

        let layout = self.page_layout();
        let pages = PdfRenderer::new(&self.theme, layout)
            .with_page_numbers(self.options.page_numbers)
            .render(&document);
        let page_count = pages.len();
        let substituted_chars: usize = pages.iter().map(|p| p.content.substituted_chars()).sum();
        let info = DocumentInfo {
            title: document.title,
            producer: format!("mdpdf {}", env!("CARGO_PKG_VERSION")),
        };
        let bytes = assemble_pdf(pages, &layout, &info, self.options.compress)?;
        Ok(RenderedPdf {
            bytes,
            pages: page_count,
            substituted_chars,
        })
    }

    /// Convert `input` and write the PDF to `output`.
    pub fn convert_file(&self, input: &Path, output: &Path) -> Result<ConversionOutcome> {
        let raw = fs::read(input).map_err(|source| ConvertError::Read {
            path: input.to_path_buf(),
            source,
        })?;
        let text = String::from_utf8(raw).map_err(|e| ConvertError::Read {
            path: input.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        let markdown = text.strip_prefix('\u{feff}').unwrap_or(text.as_str());

        let title = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let html = self.render_html(markdown, &title)?;
        debug!(input = %input.display(), html_bytes = html.len(), "rendered HTML");

        let html_output = if self.options.emit_html {
            let path = output.with_extension("html");
            fs::write(&path, &html).map_err(|source| ConvertError::Write {
                path: path.clone(),
                source,
            })?;
            Some(path)
        } else {
            None
        };

        let pdf = self.render_pdf(&html)?;
        fs::write(output, &pdf.bytes).map_err(|source| ConvertError::Write {
            path: output.to_path_buf(),
            source,
        })?;
        if pdf.substituted_chars > 0 {
            warn!(
                input = %input.display(),
                count = pdf.substituted_chars,
                "characters outside WinAnsi were drawn as '?'"
            );
        }
        info!(output = %output.display(), pages = pdf.pages, bytes = pdf.bytes.len(), "wrote PDF");

        Ok(ConversionOutcome {
            output: output.to_path_buf(),
            pages: pdf.pages,
            bytes: pdf.bytes.len(),
            substituted_chars: pdf.substituted_chars,
            html_output,
        })
    }

    /// Convert one file, logging any failure; returns whether it succeeded.
    ///
    /// A convenience for library callers that only need the flag.
    /// [`run_batch`](crate::batch::run_batch) calls [`Converter::convert_file`]
    /// instead, so it can hand the outcome or the error to its observer.
    pub fn convert_one(&self, input: &Path, output: &Path) -> bool {
        match self.convert_file(input, output) {
            Ok(_) => true,
            Err(e) => {
                error!(input = %input.display(), "Error converting {}: {}", input.display(), e);
                false
            }
        }
    }
}
