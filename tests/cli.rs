use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::{prelude::PredicateBooleanExt, str::contains};
use tempfile::TempDir;

const BIN_NAME: &str = "todolite-backup";

fn command(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin(BIN_NAME).expect("binary exists");
    cmd.env("TODOLITE_DATA_DIR", data_dir)
        .env_remove("TODOLITE_CONFIG")
        .env_remove("TODOLITE_DATABASE")
        .env("RUST_LOG", "warn");
    cmd
}

fn create_task_db(path: &Path) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE tasks (id INTEGER PRIMARY KEY, title TEXT NOT NULL);
         INSERT INTO tasks (title) VALUES ('write report'), ('water plants');",
    )
    .unwrap();
}

fn backups_in(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("todolite_backup_"))
        .collect()
}

#[test]
fn create_without_database_fails() {
    let temp = TempDir::new().unwrap();

    command(temp.path())
        .arg("create")
        .assert()
        .failure()
        .stderr(contains("No backup was created"));

    assert!(backups_in(&temp.path().join("backups")).is_empty());
}

#[test]
fn create_then_list_and_latest() {
    let temp = TempDir::new().unwrap();
    create_task_db(&temp.path().join("tasks.db"));

    command(temp.path())
        .arg("create")
        .assert()
        .success()
        .stdout(contains("Backup created: todolite_backup_").and(contains(".db.gz")));

    assert_eq!(backups_in(&temp.path().join("backups")).len(), 1);

    command(temp.path())
        .args(["list", "--verbose"])
        .assert()
        .success()
        .stdout(contains("Total: 1 backup(s)"));

    command(temp.path())
        .arg("latest")
        .assert()
        .success()
        .stdout(contains("Latest backup:"));
}

#[test]
fn restore_requires_force() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("tasks.db");
    create_task_db(&db);
    command(temp.path()).arg("create").assert().success();

    fs::write(&db, b"changed after backup").unwrap();

    command(temp.path())
        .args(["restore", "latest"])
        .assert()
        .success()
        .stdout(contains("--force"));
    assert_eq!(fs::read(&db).unwrap(), b"changed after backup");

    command(temp.path())
        .args(["restore", "latest", "--force"])
        .assert()
        .success()
        .stdout(contains("Restore complete!"));

    let conn = rusqlite::Connection::open(&db).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn recover_restores_missing_database() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("tasks.db");
    create_task_db(&db);
    command(temp.path()).arg("create").assert().success();

    command(temp.path())
        .arg("recover")
        .assert()
        .success()
        .stdout(contains("nothing to recover"));

    fs::remove_file(&db).unwrap();

    command(temp.path())
        .arg("recover")
        .assert()
        .success()
        .stdout(contains("restored"));
    assert!(db.exists());
}

#[test]
fn validate_reports_damaged_file() {
    let temp = TempDir::new().unwrap();
    let bad = temp.path().join("todolite_backup_20240101_000000.db");
    fs::write(&bad, vec![0x5Au8; 2048]).unwrap();

    command(temp.path())
        .arg("validate")
        .arg(&bad)
        .assert()
        .failure()
        .stdout(contains("INVALID"));
}

#[test]
fn dest_add_shows_in_config() {
    let temp = TempDir::new().unwrap();
    let extra = temp.path().join("usb");

    command(temp.path())
        .args(["dest", "add"])
        .arg(&extra)
        .assert()
        .success()
        .stdout(contains("Added destination"));

    command(temp.path())
        .arg("config")
        .assert()
        .success()
        .stdout(contains(extra.display().to_string()));

    command(temp.path())
        .args(["dest", "remove", "/not/configured"])
        .assert()
        .failure();
}

#[test]
fn run_once_writes_every_destination() {
    let temp = TempDir::new().unwrap();
    create_task_db(&temp.path().join("tasks.db"));
    let second = temp.path().join("second");
    let config = format!(
        r#"{{"backup": {{"destinations": [{:?}, {:?}], "compress": false}}}}"#,
        temp.path().join("first").display().to_string(),
        second.display().to_string()
    );
    fs::write(temp.path().join("config.json"), config).unwrap();

    command(temp.path())
        .args(["run", "--once"])
        .assert()
        .success()
        .stdout(contains("2 artifact(s)"));

    let names = backups_in(&second);
    assert_eq!(names.len(), 1);
    assert!(names[0].ends_with(".db"));
}

#[test]
fn run_stops_when_stdin_closes() {
    let temp = TempDir::new().unwrap();
    create_task_db(&temp.path().join("tasks.db"));

    command(temp.path())
        .arg("run")
        .write_stdin("")
        .assert()
        .success()
        .stdout(contains("Backup scheduler stopped."));
}
