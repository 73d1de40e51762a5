//! Integration tests for local file sources: markdown and plain text
//! ingest, PDF extraction failure handling, and the required/optional
//! source policy.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn rchat_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("rchat");
    path
}

fn write_config(root: &Path, sources_toml: &str) -> PathBuf {
    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();
    fs::create_dir_all(root.join("files")).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/rchat.db"

[chunking]
max_tokens = 300

[persona]
name = "Gabriel"

{sources}
"#,
        root = root.display(),
        sources = sources_toml.replace("{root}", &root.display().to_string())
    );

    let config_path = root.join("config").join("rchat.toml");
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn run_rchat(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rchat_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rchat: {}", e));
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn markdown_and_text_sources_build() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let config_path = write_config(
        root,
        r#"[[sources]]
name = "resume"
kind = "file"
path = "{root}/files/resume.md"
description = "work history"

[[sources]]
name = "notes"
kind = "file"
path = "{root}/files/notes.txt"
description = "engineering notes"
"#,
    );
    fs::write(
        root.join("files").join("resume.md"),
        "# Resume\n\nSoftware Engineer, Acme Corp, 2019-2021.",
    )
    .unwrap();
    fs::write(
        root.join("files").join("notes.txt"),
        "Talks about SQLite internals.",
    )
    .unwrap();

    let (stdout, stderr, success) = run_rchat(&config_path, &["bootstrap"]);
    assert!(
        success,
        "bootstrap failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("built 'resume'"));
    assert!(stdout.contains("built 'notes'"));
    assert!(stdout.contains("ready (2 indexes"));
}

#[test]
fn corrupt_pdf_in_required_source_aborts_bootstrap() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let config_path = write_config(
        root,
        r#"[[sources]]
name = "resume"
kind = "file"
path = "{root}/files/resume.pdf"
description = "work history"
"#,
    );
    fs::write(root.join("files").join("resume.pdf"), b"not a valid pdf").unwrap();

    let (stdout, stderr, success) = run_rchat(&config_path, &["bootstrap"]);
    assert!(!success, "bootstrap must fail: {}", stdout);
    assert!(
        stderr.contains("resume"),
        "error should name the source: {}",
        stderr
    );
}

#[test]
fn corrupt_pdf_in_optional_source_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let config_path = write_config(
        root,
        r#"[[sources]]
name = "resume"
kind = "file"
path = "{root}/files/resume.md"
description = "work history"

[[sources]]
name = "extras"
kind = "file"
path = "{root}/files/extras.pdf"
description = "extra material"
required = false
"#,
    );
    fs::write(
        root.join("files").join("resume.md"),
        "# Resume\n\nSoftware Engineer, Acme Corp, 2019-2021.",
    )
    .unwrap();
    fs::write(root.join("files").join("extras.pdf"), b"not a valid pdf").unwrap();

    let (stdout, stderr, success) = run_rchat(&config_path, &["bootstrap"]);
    assert!(
        success,
        "optional failure must not abort: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("skipping optional source 'extras'"));
    assert!(stdout.contains("ready (1 indexes"));
}

#[test]
fn missing_required_file_aborts_bootstrap() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let config_path = write_config(
        root,
        r#"[[sources]]
name = "resume"
kind = "file"
path = "{root}/files/absent.md"
description = "work history"
"#,
    );

    let (stdout, stderr, success) = run_rchat(&config_path, &["bootstrap"]);
    assert!(!success, "bootstrap must fail: {}", stdout);
    assert!(stderr.contains("resume"), "stderr: {}", stderr);
}

#[test]
fn sources_command_flags_missing_files() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let config_path = write_config(
        root,
        r#"[[sources]]
name = "resume"
kind = "file"
path = "{root}/files/absent.md"
description = "work history"
"#,
    );

    let (stdout, _, success) = run_rchat(&config_path, &["sources"]);
    assert!(success, "sources listing should not fail: {}", stdout);
    assert!(stdout.contains("(missing)"));
    assert!(stdout.contains("not reachable"));
}

#[test]
fn unsupported_extension_is_unavailable() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let config_path = write_config(
        root,
        r#"[[sources]]
name = "resume"
kind = "file"
path = "{root}/files/resume.docx"
description = "work history"
"#,
    );
    fs::write(root.join("files").join("resume.docx"), b"zip bytes").unwrap();

    let (stdout, stderr, success) = run_rchat(&config_path, &["bootstrap"]);
    assert!(!success, "unsupported format must fail: {}", stdout);
    assert!(stderr.contains("resume"), "stderr: {}", stderr);
}
