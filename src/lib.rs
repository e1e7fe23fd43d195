//! # mdpdf
//!
//! Batch-convert the Markdown files of a directory into styled PDF documents.
//!
//! Every file goes through two stages:
//!
//! - **Markdown -> HTML**: GitHub-flavoured Markdown is rendered to an HTML
//!   document with a fixed inline stylesheet; fenced code blocks are syntax
//!   highlighted.
//! - **HTML -> PDF**: the document is parsed back into block elements, laid
//!   out with the same theme onto A4 or Letter pages, and written as a PDF
//!   using the standard base-14 fonts.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mdpdf::{BatchConfig, Converter, NoopObserver, run_batch};
//!
//! let config = BatchConfig::new("docs");
//! let converter = Converter::new(config.convert.clone()).expect("theme is bundled");
//! let report = run_batch(&config, &converter, &NoopObserver).expect("directory is readable");
//! println!("{}/{} converted", report.succeeded, report.total);
//! ```
//!
//! ## Modules
//!
//! - [`markdown`]: Markdown to HTML fragment
//! - [`highlight`]: fenced code highlighting and theme colours
//! - [`theme`]: the fixed stylesheet and document wrapper
//! - [`elements`]: HTML document to layout elements
//! - [`renderer`]: layout engine and pagination
//! - [`table_renderer`]: table column widths and rows
//! - [`pdf_generator`]: PDF objects, fonts and content streams
//! - [`convert`]: one file end to end
//! - [`batch`]: directory scan, progress events and report

pub mod batch;
pub mod config;
pub mod convert;
pub mod elements;
pub mod error;
pub mod fonts;
pub mod highlight;
pub mod markdown;
pub mod pdf_generator;
pub mod renderer;
pub mod table_renderer;
pub mod theme;

pub use batch::{BatchObserver, BatchReport, FileReport, FileStatus, NoopObserver, discover_inputs, run_batch};
pub use config::{BatchConfig, ConvertOptions};
pub use convert::{ConversionOutcome, Converter, RenderedPdf, output_path_for};
pub use error::{ConvertError, Result};
pub use pdf_generator::{PageOrientation, PageSize};
