//! End-to-end tests for the CLI binary (offline commands only).

use assert_cmd::Command;
use predicates::prelude::*;

fn bookstore() -> Command {
    Command::cargo_bin("bookstore").expect("binary builds")
}

#[test]
fn test_help_lists_subcommands() {
    bookstore()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("get"))
        .stdout(predicate::str::contains("mirrors"));
}

#[test]
fn test_version_prints_crate_version() {
    bookstore()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_subcommand_fails() {
    bookstore()
        .arg("frobnicate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_mirrors_prints_configured_mirrors_offline() {
    // The mirrors command reads process-local state only; no network.
    bookstore()
        .arg("mirrors")
        .assert()
        .success()
        .stdout(predicate::str::contains("healthy"));
}

#[test]
fn test_mirrors_reset_reports_cleared() {
    bookstore()
        .args(["mirrors", "--reset"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cleared"));
}

#[test]
fn test_get_rejects_invalid_url() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    bookstore()
        .current_dir(dir.path())
        .args(["get", "not a url", "--name", "x.epub"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid URL"));
}
