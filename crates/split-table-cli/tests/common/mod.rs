#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("splitable"))
}

pub fn db_path(tmp: &TempDir) -> PathBuf {
    tmp.path().join("ops.db")
}

/// `splitable --db <db> <args>`, asserting success and returning stdout.
pub fn run_ok(db: &Path, args: &[&str]) -> TestResult<String> {
    let output = cli()
        .arg("--db")
        .arg(db)
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    Ok(String::from_utf8(output)?)
}

/// Catalog entries as JSON, optionally including purged ones.
pub fn metas_json(db: &Path, all: bool) -> TestResult<Vec<Value>> {
    let mut args = vec!["metas", "--format", "json"];
    if all {
        args.push("--all");
    }
    let out = run_ok(db, &args)?;
    match serde_json::from_str(&out)? {
        Value::Array(items) => Ok(items),
        other => Err(format!("expected a JSON array, got {other}").into()),
    }
}

pub fn insert_at(db: &Path, at: &str, extra: &[&str]) -> TestResult<String> {
    let mut args = vec![
        "insert",
        "--obj-type",
        "user",
        "--obj-id",
        "7",
        "--action",
        "login",
        "--at",
        at,
    ];
    args.extend_from_slice(extra);
    run_ok(db, &args)
}
