//! Command-line tests for the harvester binary.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn test_help_lists_commands() {
    cargo_bin_cmd!("regulation-harvester")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("crawl"))
        .stdout(predicate::str::contains("plan"));
}

#[test]
fn test_crawl_rejects_zero_concurrency() {
    let temp = tempdir().unwrap();
    cargo_bin_cmd!("regulation-harvester")
        .args(["crawl", "-j", "0", "-o"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid concurrency limit: 0"));
}

#[test]
fn test_crawl_rejects_invalid_root_url() {
    let temp = tempdir().unwrap();
    cargo_bin_cmd!("regulation-harvester")
        .args(["crawl", "--root-url", "not a url", "-o"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid URL"));
}

#[test]
fn test_crawl_rejects_unknown_format() {
    cargo_bin_cmd!("regulation-harvester")
        .args(["crawl", "--format", "xml"])
        .assert()
        .failure();
}

#[test]
fn test_error_log_receives_failures() {
    let temp = tempdir().unwrap();
    let log = temp.path().join("errors.log");
    // Nothing listens on port 9; the catalog fetch fails and is logged.
    cargo_bin_cmd!("regulation-harvester")
        .args([
            "plan",
            "--root-url",
            "http://127.0.0.1:9/Law/LawSearchLaw.aspx",
            "--error-log",
        ])
        .arg(&log)
        .assert()
        .failure();

    let content = std::fs::read_to_string(&log).unwrap();
    assert!(content.contains("will retry"));
}
