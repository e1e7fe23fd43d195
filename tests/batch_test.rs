use std::fs;
use std::path::Path;
use std::process::Command;

/// Run the built `mdpdf` binary in `cwd`, returning (stdout, stderr, exit code).
fn run_mdpdf(cwd: &Path, args: &[&str]) -> (String, String, i32) {
    let bin = std::path::PathBuf::from(env!("CARGO_BIN_EXE_mdpdf"));

    let output = Command::new(&bin)
        .args(args)
        .current_dir(cwd)
        .env_remove("MDPDF_DIR")
        .env_remove("MDPDF_THEME")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute mdpdf");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.code().unwrap_or(-1))
}

const SAMPLE: &str = "# Threads\n\nSpawning a thread:\n\n\
```rust\nfn main() {\n    std::thread::spawn(|| println!(\"hi\"));\n}\n```\n\n\
| Primitive | Use |\n|-----------|-----|\n| Mutex | shared state |\n\n\
> Prefer channels.\n\n- one\n- two\n";

#[test]
fn test_default_folder_converts_all_files() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("Concurency");
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("a.md"), SAMPLE).unwrap();
    fs::write(dir.join("b.md"), "Just text.\n").unwrap();
    fs::write(dir.join("notes.txt"), "ignored").unwrap();

    let (stdout, stderr, code) = run_mdpdf(root.path(), &[]);
    println!("stdout: {}", stdout);
    println!("stderr: {}", stderr);
    assert_eq!(code, 0);

    assert!(stdout.starts_with("Starting conversion of markdown files to PDF..."));
    assert!(stdout.contains("Found 2 markdown files to convert"));
    assert!(stdout.contains("Converting: a.md -> a.pdf"));
    assert!(stdout.contains("✓ Successfully converted: b.pdf"));
    assert!(stdout.contains("Conversion completed! 2/2 files converted successfully."));
    assert!(stdout.contains("Check the Concurency folder for the generated PDF files."));

    for name in ["a.pdf", "b.pdf"] {
        let bytes = fs::read(dir.join(name)).unwrap();
        assert!(bytes.starts_with(b"%PDF-"), "{} is not a PDF", name);
        assert!(bytes.ends_with(b"%%EOF\n"));
    }
    assert!(!dir.join("notes.pdf").exists());
}

#[test]
fn test_no_files_found() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("docs");
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("readme.txt"), "x").unwrap();

    let (stdout, _, code) = run_mdpdf(root.path(), &["--dir", "docs"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("No markdown files found in the docs folder"));
    assert!(!stdout.contains("Conversion completed!"));
    assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
}

#[test]
fn test_missing_folder_is_treated_as_empty() {
    let root = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_mdpdf(root.path(), &[]);
    assert_eq!(code, 0);
    assert!(stdout.contains("No markdown files found in the Concurency folder"));
}

#[test]
fn test_failed_file_does_not_stop_batch() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path();
    fs::write(dir.join("a.md"), "first\n").unwrap();
    fs::write(dir.join("b.md"), [0x66, 0x6f, 0xff, 0x0a]).unwrap();
    fs::write(dir.join("c.md"), "third\n").unwrap();

    let dir_arg = dir.to_string_lossy().to_string();
    let (stdout, _, code) = run_mdpdf(dir, &["--dir", &dir_arg]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Error converting"));
    assert!(stdout.contains("✗ Failed to convert: b.md"));
    assert!(stdout.contains("Conversion completed! 2/3 files converted successfully."));
    assert!(dir.join("a.pdf").exists());
    assert!(!dir.join("b.pdf").exists());
    assert!(dir.join("c.pdf").exists());

    // files are processed in name order
    let a = stdout.find("Converting: a.md").unwrap();
    let b = stdout.find("Converting: b.md").unwrap();
    let c = stdout.find("Converting: c.md").unwrap();
    assert!(a < b && b < c);
}

#[test]
fn test_strict_exit_code() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path();
    fs::write(dir.join("bad.md"), [0xc3, 0x28]).unwrap();
    let dir_arg = dir.to_string_lossy().to_string();

    let (_, _, code) = run_mdpdf(dir, &["--dir", &dir_arg]);
    assert_eq!(code, 0);
    let (_, _, code) = run_mdpdf(dir, &["--dir", &dir_arg, "--strict"]);
    assert_eq!(code, 1);
}

#[test]
fn test_rerun_overwrites_with_identical_bytes() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path();
    fs::write(dir.join("doc.md"), SAMPLE).unwrap();
    let dir_arg = dir.to_string_lossy().to_string();

    let (_, _, code) = run_mdpdf(dir, &["--dir", &dir_arg]);
    assert_eq!(code, 0);
    let first = fs::read(dir.join("doc.pdf")).unwrap();
    let (_, _, code) = run_mdpdf(dir, &["--dir", &dir_arg]);
    assert_eq!(code, 0);
    let second = fs::read(dir.join("doc.pdf")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_uncompressed_output_shows_styling() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path();
    fs::write(dir.join("doc.md"), SAMPLE).unwrap();
    let dir_arg = dir.to_string_lossy().to_string();

    let (_, _, code) = run_mdpdf(dir, &["--dir", &dir_arg, "--no-compress", "--page-numbers"]);
    assert_eq!(code, 0);
    let pdf = String::from_utf8_lossy(&fs::read(dir.join("doc.pdf")).unwrap()).to_string();

    assert!(pdf.contains("/BaseFont /Helvetica-Bold"));
    assert!(pdf.contains("/BaseFont /Courier"));
    assert!(pdf.contains("/F2 21 Tf"), "h1 is not bold at 21pt");
    assert!(pdf.contains("re f"), "no filled backgrounds");
    assert!(pdf.contains(" RG"), "no stroked rules");
    assert!(pdf.contains("(Page 1 of 1) Tj"));
    assert!(pdf.contains("/MediaBox [0 0 595.28 841.89]"));
}

#[test]
fn test_report_and_emit_html() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("in");
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("one.md"), "# One\n").unwrap();
    let report = root.path().join("report.json");

    let (_, _, code) = run_mdpdf(
        root.path(),
        &["--dir", "in", "--emit-html", "--page-size", "letter", "--report", "report.json"],
    );
    assert_eq!(code, 0);
    assert!(dir.join("one.html").exists());

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(value["total"], 1);
    assert_eq!(value["succeeded"], 1);
    assert_eq!(value["files"][0]["status"], "converted");
    assert_eq!(value["files"][0]["pages"], 1);
}

#[test]
fn test_unknown_theme_aborts_before_converting() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path();
    fs::write(dir.join("a.md"), "text\n").unwrap();
    let dir_arg = dir.to_string_lossy().to_string();

    let (stdout, _, code) = run_mdpdf(dir, &["--dir", &dir_arg, "--theme", "no-such-theme"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("no-such-theme"));
    assert!(stdout.contains("Please choose one of the bundled themes"));
    assert!(!stdout.contains("Converting:"));
    assert!(!dir.join("a.pdf").exists());

    let (_, _, code) = run_mdpdf(dir, &["--dir", &dir_arg, "--theme", "no-such-theme", "--strict"]);
    assert_eq!(code, 1);
}

#[test]
fn test_unencodable_characters_are_reported() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path();
    fs::write(dir.join("cjk.md"), "# 并发 → Rust\n\nplain\n").unwrap();
    let dir_arg = dir.to_string_lossy().to_string();

    let (stdout, stderr, code) = run_mdpdf(dir, &["--dir", &dir_arg, "--report", "report.json"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("1/1 files converted successfully."));
    assert!(stderr.contains("were drawn as '?'"), "stderr: {}", stderr);

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join("report.json")).unwrap()).unwrap();
    assert_eq!(value["files"][0]["substituted_chars"], 3);
}
