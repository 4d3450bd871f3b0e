//! Binary-level tests for the autosync CLI

use std::path::Path;
use std::process::Command as StdCommand;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// autosync command with log and config locations inside `home`
fn autosync(home: &Path) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("autosync");
    cmd.env("HOME", home)
        .env("XDG_DATA_HOME", home.join("data"))
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

fn git(dir: &Path, args: &[&str]) {
    let status = StdCommand::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("Failed to run git");
    assert!(status.success(), "git {:?} failed", args);
}

#[test]
fn test_help() {
    let home = TempDir::new().unwrap();
    autosync(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--once"))
        .stdout(predicate::str::contains("--debounce-secs"));
}

#[test]
fn test_not_a_repository_exits_with_hint() {
    let home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();

    autosync(home.path())
        .arg(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("not a git repository"))
        .stdout(predicate::str::contains("git init"));
}

#[test]
fn test_once_without_remote_fails_with_hint() {
    let home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    git(dir.path(), &["init"]);
    git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(dir.path(), &["config", "user.email", "test@test.com"]);
    git(dir.path(), &["config", "user.name", "Test"]);
    git(dir.path(), &["config", "commit.gpgsign", "false"]);
    std::fs::write(dir.path().join("todo.txt"), "ship it\n").unwrap();

    autosync(home.path())
        .arg(dir.path())
        .arg("--once")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[hint]"))
        .stdout(predicate::str::contains("git remote add origin"));
}

#[test]
fn test_once_with_nothing_to_commit_succeeds() {
    let home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    git(dir.path(), &["init"]);

    autosync(home.path())
        .arg(dir.path())
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains("no changes"));
}
