//! End-to-end workflows against the `splitable` binary.

use predicates::str::contains;
use tempfile::TempDir;

mod common;

use common::{TestResult, cli, db_path, insert_at, metas_json, run_ok};

#[test]
fn fresh_database_is_out_of_sync_until_synced() -> TestResult {
    let tmp = TempDir::new()?;
    let db = db_path(&tmp);

    cli()
        .arg("--db")
        .arg(&db)
        .arg("check-sync")
        .assert()
        .failure()
        .code(1)
        .stderr(contains("out of sync"));

    let sql = run_ok(&db, &["sync-sql"])?;
    assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"opslog_metadata\""), "{sql}");
    assert!(sql.contains("INSERT INTO \"opslog_metadata\""), "{sql}");

    let out = run_ok(&db, &["sync"])?;
    assert!(out.contains("Synced split table opslog"));

    let out = run_ok(&db, &["check-sync"])?;
    assert!(out.contains("is in sync"));
    assert!(run_ok(&db, &["sync-sql"])?.trim().is_empty());

    let metas = metas_json(&db, false)?;
    assert_eq!(metas.len(), 1);
    assert_eq!(metas[0]["start"], 1);
    assert!(metas[0]["end"].is_null());
    Ok(())
}

#[test]
fn inserts_roll_over_past_max_duration() -> TestResult {
    let tmp = TempDir::new()?;
    let db = db_path(&tmp);
    run_ok(&db, &["sync"])?;

    let span = ["--max-duration", "1d"];
    let out = insert_at(&db, "2025-01-01T00:00:00Z", &span)?;
    assert!(out.contains("Inserted event 1"), "{out}");
    insert_at(&db, "2025-01-01T06:00:00Z", &span)?;
    let out = insert_at(&db, "2025-01-04T00:00:00Z", &span)?;
    assert!(out.contains("Inserted event 3"), "{out}");

    let metas = metas_json(&db, false)?;
    assert_eq!(metas.len(), 2);
    assert_eq!(metas[0]["start"], 1);
    assert_eq!(metas[0]["end"], 2);
    assert_eq!(metas[1]["start"], 3);
    assert_eq!(metas[1]["table"], "opslog_1735948800");

    let first = metas[0]["table"].as_str().ok_or("table name")?;
    let out = run_ok(&db, &["export", "--segment", first, "--format", "json"])?;
    let rows: serde_json::Value = serde_json::from_str(&out)?;
    assert_eq!(rows.as_array().map(Vec::len), Some(2));
    assert_eq!(rows[1]["id"], 2);
    assert_eq!(rows[1]["action"], "login");

    let out = run_ok(&db, &["describe"])?;
    assert!(out.contains("Rows: 3"), "{out}");
    assert!(out.contains("UNION ALL"), "{out}");
    Ok(())
}

#[test]
fn purge_keeps_newest_segments_and_soft_deletes() -> TestResult {
    let tmp = TempDir::new()?;
    let db = db_path(&tmp);
    run_ok(&db, &["sync"])?;

    let span = ["--max-duration", "1h"];
    insert_at(&db, "2025-01-01T00:00:00Z", &span)?;
    insert_at(&db, "2025-01-01T02:00:00Z", &span)?;
    insert_at(&db, "2025-01-01T04:00:00Z", &span)?;
    assert_eq!(metas_json(&db, false)?.len(), 3);

    let out = run_ok(&db, &["purge"])?;
    assert!(out.contains("No segment limit configured"), "{out}");

    let out = run_ok(&db, &["purge", "--max-segments", "1"])?;
    assert_eq!(out.matches("Purged segment").count(), 2, "{out}");

    let live = metas_json(&db, false)?;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0]["start"], 3);

    let all = metas_json(&db, true)?;
    assert_eq!(all.len(), 3);
    assert_eq!(all[0]["deleted"], true);
    assert!(!all[0]["delete_at"].is_null());

    let out = run_ok(&db, &["purge", "--max-segments", "1"])?;
    assert!(out.contains("Nothing to purge"), "{out}");
    Ok(())
}

#[test]
fn invalid_inputs_fail_with_messages() -> TestResult {
    let tmp = TempDir::new()?;
    let db = db_path(&tmp);

    cli()
        .arg("--db")
        .arg(&db)
        .args(["metas", "--max-duration", "7x"])
        .assert()
        .failure()
        .stderr(contains("Invalid --max-duration '7x'"));

    run_ok(&db, &["sync"])?;

    cli()
        .arg("--db")
        .arg(&db)
        .args(["export", "--segment", "opslog_missing"])
        .assert()
        .failure()
        .stderr(contains("not a live segment"));

    cli()
        .arg("--db")
        .arg(&db)
        .args([
            "insert", "--obj-type", "user", "--obj-id", "1", "--action", "x", "--at", "yesterday",
        ])
        .assert()
        .failure()
        .stderr(contains("Invalid --at 'yesterday'"));
    Ok(())
}

#[test]
fn config_file_drives_table_name_and_limits() -> TestResult {
    let tmp = TempDir::new()?;
    let db = db_path(&tmp);
    let config = tmp.path().join("split.json");
    std::fs::write(
        &config,
        r#"{"table":"audit","index_column":"id","date_column":"ops_time","max_duration":"1d"}"#,
    )?;
    let config = config.to_string_lossy().to_string();

    run_ok(&db, &["sync", "--config", &config])?;
    insert_at(&db, "2025-01-01T00:00:00Z", &["--config", &config])?;
    insert_at(&db, "2025-01-03T00:00:00Z", &["--config", &config])?;

    let out = run_ok(&db, &["metas", "--config", &config])?;
    assert!(out.contains("audit_1735862400"), "{out}");

    cli()
        .arg("--db")
        .arg(&db)
        .args(["metas", "--config", "/nonexistent/split.json"])
        .assert()
        .failure()
        .stderr(contains("Failed to read config file"));
    Ok(())
}
