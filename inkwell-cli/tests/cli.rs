use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn inkwell(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("inkwell").unwrap();
    cmd.env("HOME", home)
        .env_remove("RUST_LOG")
        .env_remove("GOOGLE_VISION_API_KEY")
        .env_remove("OPENAI_API_KEY");
    cmd
}

/// A home with a config pointing at an export holding one root notebook.
fn home_with_export() -> TempDir {
    let home = TempDir::new().unwrap();
    let export = home.path().join("export");
    fs::create_dir_all(export.join("pages/n1")).unwrap();
    fs::write(export.join("pages/n1/1.png"), b"png").unwrap();
    fs::write(
        export.join("listing.json"),
        r#"[
            {"ID": "n1", "VissibleName": "Journal", "Parent": "", "Type": "DocumentType", "hash": "h1"},
            {"ID": "n2", "VissibleName": "Old", "Parent": "trash", "Type": "DocumentType", "hash": "h1"}
        ]"#,
    )
    .unwrap();

    let config = format!(
        "source:\n  listing_path: \"{}\"\n  pages_dir: \"{}\"\n",
        export.join("listing.json").display(),
        export.join("pages").display()
    );
    fs::create_dir_all(home.path().join(".inkwell")).unwrap();
    fs::write(home.path().join(".inkwell/config.yaml"), config).unwrap();
    home
}

fn write_state(home: &Path, json: &str) {
    fs::create_dir_all(home.join(".inkwell")).unwrap();
    fs::write(home.join(".inkwell/state.json"), json).unwrap();
}

#[test]
fn init_writes_default_config_once() {
    let home = TempDir::new().unwrap();
    inkwell(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default config"));
    let config = fs::read_to_string(home.path().join(".inkwell/config.yaml")).unwrap();
    assert!(config.contains("max_notebooks_per_run"));

    inkwell(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn status_on_fresh_home_reports_nothing_synced() {
    let home = TempDir::new().unwrap();
    inkwell(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No notebooks synced yet"));
}

#[test]
fn status_lists_records_and_pending_destinations() {
    let home = TempDir::new().unwrap();
    fs::create_dir_all(home.path().join(".inkwell")).unwrap();
    fs::write(
        home.path().join(".inkwell/config.yaml"),
        "obsidian:\n  enabled: true\n  vault_path: /tmp/vault\n",
    )
    .unwrap();
    write_state(
        home.path(),
        r#"{"notebooks": {"n1": {"version": "h1", "destinations": ["obsidian"]}}}"#,
    );

    inkwell(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("n1"))
        .stdout(predicate::str::contains("missing a destination"));

    let output = inkwell(home.path())
        .args(["status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["summary"]["notebooks"], 1);
    assert_eq!(json["notebooks"][0]["id"], "n1");
    assert_eq!(json["notebooks"][0]["pending"][0], "apple_notes");
}

#[test]
fn status_counts_notebooks_that_keep_failing() {
    let home = TempDir::new().unwrap();
    write_state(
        home.path(),
        r#"{"notebooks": {}, "failed": {"e1": {"version": "h1", "failures": 3, "last_failed_at": "2024-05-01T12:00:00Z"}}}"#,
    );

    inkwell(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 notebook(s) failed their last attempt"));

    let output = inkwell(home.path())
        .args(["status", "--json"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["summary"]["failing"], 1);
    assert_eq!(json["summary"]["notebooks"], 0);
}

#[test]
fn legacy_logs_are_imported_by_status() {
    let home = TempDir::new().unwrap();
    fs::create_dir_all(home.path().join(".inkwell")).unwrap();
    fs::write(
        home.path().join(".inkwell/processed_notebooks_AppleNotesDestination.json"),
        r#"{"n7": 4}"#,
    )
    .unwrap();

    inkwell(home.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"n7\""))
        .stdout(predicate::str::contains("\"apple_notes\""));
}

#[test]
fn dry_run_lists_the_plan_and_writes_nothing() {
    let home = home_with_export();
    inkwell(home.path())
        .args(["sync", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 notebook(s) would be processed"))
        .stdout(predicate::str::contains("Journal"))
        .stdout(predicate::str::contains("never synced"))
        .stdout(predicate::str::contains("Old").not());

    assert!(!home.path().join(".inkwell/state.json").exists());
    assert!(!home.path().join(".inkwell/cache").exists());
    assert!(home.path().join(".inkwell/logs/sync.log").exists());
}

#[test]
fn dry_run_skips_up_to_date_notebooks() {
    let home = home_with_export();
    write_state(
        home.path(),
        r#"{"notebooks": {"n1": {"version": "h1", "destinations": ["apple_notes"]}}}"#,
    );
    inkwell(home.path())
        .args(["sync", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to do"))
        .stdout(predicate::str::contains("1 up to date"));
}

#[test]
fn single_notebook_run_forces_an_up_to_date_notebook() {
    let home = home_with_export();
    write_state(
        home.path(),
        r#"{"notebooks": {"n1": {"version": "h1", "destinations": ["apple_notes"]}}}"#,
    );
    inkwell(home.path())
        .args(["sync", "--dry-run", "--notebook", "Journal"])
        .assert()
        .success()
        .stdout(predicate::str::contains("forced"));
}

#[test]
fn unknown_notebook_is_an_error() {
    let home = home_with_export();
    inkwell(home.path())
        .args(["sync", "--dry-run", "--notebook", "Nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nope"));
}

#[test]
fn real_sync_requires_credentials() {
    let home = home_with_export();
    inkwell(home.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Google Vision API key"));
    assert!(!home.path().join(".inkwell/state.json").exists());
}

#[test]
fn corrupt_state_is_reported() {
    let home = home_with_export();
    write_state(home.path(), "{ not json");
    inkwell(home.path())
        .args(["sync", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("corrupt"));
}

#[test]
fn cache_prune_on_empty_cache() {
    let home = TempDir::new().unwrap();
    inkwell(home.path())
        .args(["cache", "prune"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 notebook(s) removed"));
}
