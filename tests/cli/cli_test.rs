//! CLI contract tests.

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;

fn main_source() -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/main.rs");
    match fs::read_to_string(&path) {
        Ok(source) => source,
        Err(err) => panic!("main source should load from {}: {err}", path.display()),
    }
}

#[test]
fn main_defines_primary_subcommands() {
    let source = main_source();
    for subcommand in ["Start", "Migrate", "Remind", "Dashboard", "Check"] {
        assert!(source.contains(subcommand), "missing {subcommand}");
    }
    assert!(source.contains("dry_run"));
}

#[test]
fn help_lists_subcommands() {
    let output = Command::cargo_bin("taskdesk")
        .expect("binary should build")
        .arg("--help")
        .output()
        .expect("binary should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for subcommand in ["start", "migrate", "remind", "dashboard", "check"] {
        assert!(stdout.contains(subcommand), "missing {subcommand} in help");
    }
}

#[test]
fn unknown_subcommand_fails() {
    Command::cargo_bin("taskdesk")
        .expect("binary should build")
        .arg("frobnicate")
        .assert()
        .failure();
}

#[test]
fn migrate_creates_the_database() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let db = tmp.path().join("tasks.db");
    Command::cargo_bin("taskdesk")
        .expect("binary should build")
        .current_dir(tmp.path())
        .env("TASKDESK_DATABASE", &db)
        .env_remove("TASKDESK_CONFIG")
        .arg("migrate")
        .assert()
        .success();
    assert!(db.exists());
}
