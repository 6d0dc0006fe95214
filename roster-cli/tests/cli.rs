use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn roster_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("roster"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("ROSTER_CLIENT_SECRET");
    cmd
}

fn init(home: &Path) {
    roster_cmd(home)
        .args([
            "init",
            "--mailbox",
            "contacts@example.test",
            "--collection",
            "company contacts",
        ])
        .assert()
        .success()
        .stdout(contains("config.yaml"));
}

#[test]
fn init_writes_default_config_once() {
    let home = TempDir::new().unwrap();
    init(home.path());

    let path = home.path().join(".roster").join("config.yaml");
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("mailbox: contacts@example.test"));
    assert!(written.contains("kind: contacts"));

    roster_cmd(home.path())
        .args(["init", "--mailbox", "x@example.test", "--collection", "x"])
        .assert()
        .failure()
        .stderr(contains("--force"));
}

#[test]
fn init_honors_explicit_config_path() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("elsewhere").join("roster.yaml");
    roster_cmd(home.path())
        .args(["init", "--mailbox", "m@example.test", "--collection", "c"])
        .arg("--config")
        .arg(&path)
        .assert()
        .success();
    assert!(path.exists());
    assert!(!home.path().join(".roster").join("config.yaml").exists());
}

#[test]
fn status_before_first_sync() {
    let home = TempDir::new().unwrap();
    init(home.path());

    roster_cmd(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("company contacts"))
        .stdout(contains("never"))
        .stdout(contains("missing"));
}

#[test]
fn status_json_reads_identity_store() {
    let home = TempDir::new().unwrap();
    init(home.path());
    let store = home
        .path()
        .join(".roster")
        .join("identities")
        .join("company_contacts.json");
    fs::create_dir_all(store.parent().unwrap()).unwrap();
    fs::write(
        &store,
        r#"{
  "synced_at": "2026-01-05T08:00:00Z",
  "entries": [
    { "remote_id": "AAMk-1", "fingerprint": "aa", "key": "contact:ada|acme" },
    { "remote_id": "AAMk-2", "fingerprint": "bb" }
  ]
}"#,
    )
    .unwrap();

    let output = roster_cmd(home.path())
        .args(["status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["entries"], 2);
    assert_eq!(json["keyed_entries"], 1);
    assert_eq!(json["last_sync_at"], "2026-01-05T08:00:00Z");
    assert_eq!(json["sources"].as_array().unwrap().len(), 2);
}

#[test]
fn status_reads_legacy_control_file() {
    let home = TempDir::new().unwrap();
    init(home.path());
    let store = home
        .path()
        .join(".roster")
        .join("identities")
        .join("company_contacts.json");
    fs::create_dir_all(store.parent().unwrap()).unwrap();
    fs::write(&store, r#"[{ "contact_id": "AAMk-9", "hash": "cc" }]"#).unwrap();

    let output = roster_cmd(home.path())
        .args(["status", "--json"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["entries"], 1);
    assert!(json["last_sync_at"].is_null());
}

#[test]
fn commands_without_config_point_to_init() {
    let home = TempDir::new().unwrap();
    roster_cmd(home.path())
        .args(["sync", "--dry-run"])
        .assert()
        .failure()
        .stderr(contains("roster init"));
}

#[test]
fn purge_requires_confirmation() {
    let home = TempDir::new().unwrap();
    init(home.path());
    roster_cmd(home.path())
        .arg("purge")
        .assert()
        .failure()
        .stderr(contains("--yes"));
}

#[test]
fn sync_without_secret_fails_before_any_request() {
    let home = TempDir::new().unwrap();
    init(home.path());
    roster_cmd(home.path())
        .args(["sync", "--dry-run"])
        .assert()
        .failure()
        .stderr(contains("ROSTER_CLIENT_SECRET"));
}
