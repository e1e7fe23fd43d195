use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use mdpdf::config::{DEFAULT_EXTENSION, DEFAULT_INPUT_DIR};
use mdpdf::highlight::{DEFAULT_THEME, Highlighter};
use mdpdf::{
    BatchConfig, BatchObserver, BatchReport, ConversionOutcome, ConvertError, ConvertOptions,
    Converter, PageOrientation, PageSize, run_batch,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mdpdf")]
#[command(about = "Convert every Markdown file in a folder to a styled PDF")]
#[command(version)]
struct Cli {
    #[arg(long, env = "MDPDF_DIR", default_value = DEFAULT_INPUT_DIR, help = "Folder scanned for Markdown files")]
    dir: PathBuf,
    #[arg(long, default_value = DEFAULT_EXTENSION, help = "Extension of the input files")]
    ext: String,
    #[arg(long, value_enum, default_value = "a4", help = "Page size")]
    page_size: PageSizeArg,
    #[arg(long, help = "Use landscape orientation")]
    landscape: bool,
    #[arg(long, help = "Add a \"Page N of M\" footer")]
    page_numbers: bool,
    #[arg(long, help = "Write uncompressed content streams")]
    no_compress: bool,
    #[arg(long, env = "MDPDF_THEME", default_value = DEFAULT_THEME, help = "Syntax highlighting theme")]
    theme: String,
    #[arg(long, help = "Also write the intermediate HTML next to each PDF")]
    emit_html: bool,
    #[arg(long, help = "Write a JSON report of the run to this file")]
    report: Option<PathBuf>,
    #[arg(long, help = "Exit with status 1 if any file fails or the run cannot start")]
    strict: bool,
    #[arg(short, long, action = clap::ArgAction::Count, help = "More log output on stderr (-v, -vv)")]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum PageSizeArg {
    A4,
    Letter,
}

impl From<PageSizeArg> for PageSize {
    fn from(v: PageSizeArg) -> Self {
        match v {
            PageSizeArg::A4 => PageSize::A4,
            PageSizeArg::Letter => PageSize::Letter,
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Prints the per-file progress lines and the final summary to stdout.
struct ConsoleReporter;

impl BatchObserver for ConsoleReporter {
    fn on_batch_start(&self, dir: &Path, total: usize) {
        if total == 0 {
            println!("No markdown files found in the {} folder", dir.display());
        } else {
            println!("Found {} markdown files to convert", total);
        }
    }

    fn on_file_start(&self, _index: usize, _total: usize, input: &Path, output: &Path) {
        println!("Converting: {} -> {}", display_name(input), display_name(output));
    }

    fn on_file_converted(&self, _input: &Path, outcome: &ConversionOutcome) {
        println!("✓ Successfully converted: {}", display_name(&outcome.output));
    }

    fn on_file_failed(&self, input: &Path, error: &ConvertError) {
        println!("Error converting {}: {}", input.display(), error);
        println!("✗ Failed to convert: {}", display_name(input));
    }

    fn on_batch_complete(&self, report: &BatchReport) {
        println!(
            "\nConversion completed! {}/{} files converted successfully.",
            report.succeeded, report.total
        );
        println!(
            "Check the {} folder for the generated PDF files.",
            report.input_dir.display()
        );
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    println!("Starting conversion of markdown files to PDF...");

    let orientation = if cli.landscape {
        PageOrientation::Landscape
    } else {
        PageOrientation::Portrait
    };
    let options = ConvertOptions::default()
        .with_page_size(cli.page_size.into())
        .with_orientation(orientation)
        .with_page_numbers(cli.page_numbers)
        .with_compression(!cli.no_compress)
        .with_highlight_theme(&cli.theme)
        .with_emit_html(cli.emit_html);
    let config = BatchConfig::new(&cli.dir)
        .with_extension(&cli.ext)
        .with_convert_options(options.clone());

    let converter = match Converter::new(options) {
        Ok(c) => c,
        Err(e) if e.is_startup() => {
            println!("Error: {}", e);
            println!(
                "Please choose one of the bundled themes with --theme, e.g. --theme \"{}\"",
                DEFAULT_THEME
            );
            tracing::debug!(themes = ?Highlighter::available_themes(), "bundled themes");
            return Ok(if cli.strict {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            });
        }
        Err(e) => return Err(e).context("failed to prepare the converter"),
    };

    let report = run_batch(&config, &converter, &ConsoleReporter)
        .with_context(|| format!("failed to scan {}", cli.dir.display()))?;

    if let Some(path) = &cli.report {
        report
            .write_json(path)
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }

    if cli.strict && !report.all_succeeded() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
