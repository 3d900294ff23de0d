use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;

fn doctext() -> Command {
    Command::cargo_bin("doctext").unwrap()
}

/// Writes a config file with tools that cannot be found.
fn hermetic_config(dir: &Path) -> PathBuf {
    let path = dir.join("config.json");
    let config = serde_json::json!({
        "tools": {
            "ghostscript": "/nonexistent/gs",
            "surya_ocr": "/nonexistent/surya_ocr",
            "llm_caller": "/nonexistent/llm-caller",
            "ebook_convert": "/nonexistent/ebook-convert"
        },
        "extraction": { "retry_delay_ms": 1 }
    });
    std::fs::write(&path, config.to_string()).unwrap();
    path
}

#[test]
fn test_help() {
    doctext()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("extract"))
        .stdout(predicate::str::contains("batch"));
}

#[test]
fn test_extract_text_file_then_cached() {
    let dir = tempfile::tempdir().unwrap();
    let config = hermetic_config(dir.path());
    let input = dir.path().join("notes.txt");
    std::fs::write(&input, "Meeting notes for Monday").unwrap();

    doctext()
        .arg("-c")
        .arg(&config)
        .arg("extract")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Meeting notes for Monday"));

    let output = doctext()
        .arg("-c")
        .arg(&config)
        .args(["extract", "--json"])
        .arg(&input)
        .output()
        .unwrap();
    assert!(output.status.success());
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["extractor_used"], "cached");
    let text_path = PathBuf::from(result["output_path"].as_str().unwrap());
    assert!(text_path.ends_with("text.txt"));
    assert_eq!(
        std::fs::read_to_string(text_path).unwrap(),
        "Meeting notes for Monday"
    );
}

#[test]
fn test_extract_to_explicit_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = hermetic_config(dir.path());
    let input = dir.path().join("page.html");
    std::fs::write(&input, "<html><body><h1>Release notes</h1></body></html>").unwrap();
    let output = dir.path().join("out").join("page.txt");

    doctext()
        .arg("-c")
        .arg(&config)
        .args(["extract", "--quiet", "-o"])
        .arg(&output)
        .arg(&input)
        .assert()
        .success();

    assert_eq!(std::fs::read_to_string(output).unwrap(), "Release notes");
}

#[test]
fn test_extract_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = hermetic_config(dir.path());

    doctext()
        .arg("-c")
        .arg(&config)
        .arg("extract")
        .arg(dir.path().join("missing.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_extract_pinned_engine_without_tool_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = hermetic_config(dir.path());
    let input = dir.path().join("scan.png");
    std::fs::write(&input, b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR").unwrap();

    doctext()
        .arg("-c")
        .arg(&config)
        .args(["extract", "--ocr", "surya_ocr"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("surya_ocr"));
}

#[test]
fn test_batch_with_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = hermetic_config(dir.path());
    let docs = dir.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join("a.txt"), "First document text").unwrap();
    std::fs::write(docs.join("b.md"), "# Second document").unwrap();
    std::fs::write(docs.join("c.txt"), "short").unwrap();
    let out = dir.path().join("texts");
    let report = dir.path().join("report.json");

    doctext()
        .arg("-c")
        .arg(&config)
        .args(["batch", "--continue-on-error", "-o"])
        .arg(&out)
        .arg("--report")
        .arg(&report)
        .arg(format!("{}/*", docs.display()))
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 3 files"));

    assert!(out.join("a.txt.txt").is_file());
    assert!(out.join("b.md.txt").is_file());
    assert!(!out.join("c.txt.txt").exists());

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report).unwrap()).unwrap();
    assert_eq!(report["total"], 3);
    assert_eq!(report["succeeded"], 2);
    assert_eq!(report["failed"], 1);
}

#[test]
fn test_batch_same_file_names_get_separate_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let config = hermetic_config(dir.path());
    for (sub, text) in [("q1", "First quarter summary"), ("q2", "Second quarter summary")] {
        let folder = dir.path().join(sub);
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("report.txt"), text).unwrap();
    }
    std::fs::write(dir.path().join("q1").join("report.md"), "# Quarter notes").unwrap();
    let out = dir.path().join("texts");
    let report = dir.path().join("report.json");

    doctext()
        .arg("-c")
        .arg(&config)
        .args(["batch", "-o"])
        .arg(&out)
        .arg("--report")
        .arg(&report)
        .arg(format!("{}/q1/*", dir.path().display()))
        .arg(format!("{}/q2/*", dir.path().display()))
        .assert()
        .success();

    let mut texts: Vec<String> = std::fs::read_dir(&out)
        .unwrap()
        .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
        .collect();
    texts.sort();
    assert_eq!(
        texts,
        vec![
            "# Quarter notes".to_string(),
            "First quarter summary".to_string(),
            "Second quarter summary".to_string(),
        ]
    );
    assert!(out.join("report.md.txt").is_file());

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report).unwrap()).unwrap();
    assert_eq!(report["succeeded"], 3);
    for file in report["files"].as_array().unwrap() {
        assert_ne!(file["extractor_used"], "cached");
    }
}

#[test]
fn test_batch_stops_on_first_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = hermetic_config(dir.path());
    std::fs::write(dir.path().join("a.txt"), "tiny").unwrap();

    doctext()
        .arg("-c")
        .arg(&config)
        .arg("batch")
        .arg(format!("{}/*.txt", dir.path().display()))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Processing failed"));
}

#[test]
fn test_engines_lists_unavailable_tools() {
    let dir = tempfile::tempdir().unwrap();
    let config = hermetic_config(dir.path());

    let output = doctext()
        .arg("-c")
        .arg(&config)
        .args(["engines", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["strategy"], "interactive");
    assert_eq!(json["engines"][0]["name"], "surya_ocr");
    assert_eq!(json["engines"][0]["available"], false);
    assert_eq!(json["tools"][1]["name"], "ebook-convert");
}

#[test]
fn test_config_init_get_set() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("conf").join("config.json");

    doctext()
        .arg("-c")
        .arg(&config)
        .args(["config", "init"])
        .assert()
        .success();
    assert!(config.is_file());

    doctext()
        .arg("-c")
        .arg(&config)
        .args(["config", "set", "ocr.max_concurrency", "8"])
        .assert()
        .success();

    doctext()
        .arg("-c")
        .arg(&config)
        .args(["config", "get", "ocr.max_concurrency"])
        .assert()
        .success()
        .stdout(predicate::str::contains("8"));

    doctext()
        .arg("-c")
        .arg(&config)
        .args(["config", "set", "ocr.max_concurrency", "50"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_concurrency"));

    doctext()
        .arg("-c")
        .arg(&config)
        .args(["config", "get", "ocr.nonexistent"])
        .assert()
        .failure();
}
