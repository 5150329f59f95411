use rusqlite::Connection;
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn run_cli(args: &[&str], envs: &[(&str, &Path)], body: &serde_json::Value) -> Output {
    let exe = env!("CARGO_BIN_EXE_rapord");
    let mut cmd = Command::new(exe);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env_remove("RAPORD_SOURCE_DB")
        .env_remove("RAPORD_DEST_DB");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    let mut child = cmd.spawn().expect("spawn rapord sync");
    {
        let mut stdin = child.stdin.take().expect("stdin");
        stdin
            .write_all(body.to_string().as_bytes())
            .expect("write body");
    }
    child.wait_with_output().expect("wait")
}

/// Splits an SSE body into the JSON payload of each `data:` frame.
fn frames(stdout: &[u8]) -> Vec<serde_json::Value> {
    let text = String::from_utf8_lossy(stdout);
    text.split("\n\n")
        .filter(|f| !f.trim().is_empty())
        .map(|f| {
            let payload = f.strip_prefix("data: ").expect("data frame");
            serde_json::from_str(payload).expect("frame json")
        })
        .collect()
}

fn stores(dir: &Path) -> (PathBuf, PathBuf) {
    let source = dir.join("lokal.sqlite3");
    let mirror = dir.join("server.sqlite3");
    Connection::open(&source)
        .expect("source")
        .execute_batch(
            "CREATE TABLE tabel_mapel(id TEXT PRIMARY KEY, nama_mapel TEXT, urutan INTEGER);
             INSERT INTO tabel_mapel VALUES('m1', 'Matematika', 1), ('m2', 'Seni Budaya', 2);",
        )
        .expect("seed source");
    Connection::open(&mirror)
        .expect("mirror")
        .execute_batch(
            "CREATE TABLE tabel_mapel(id TEXT PRIMARY KEY, nama_mapel TEXT, urutan INTEGER);
             INSERT INTO tabel_mapel VALUES('m9', 'Mapel Lama', 9);",
        )
        .expect("seed mirror");
    (source, mirror)
}

fn admin_request(tables: &[&str]) -> serde_json::Value {
    json!({
        "level": "Admin",
        "schemas": [{ "schemaName": "main", "selectedTables": tables }]
    })
}

#[test]
fn cli_streams_sse_frames_for_a_session() {
    let dir = temp_dir("rapord-cli-sse");
    let (source, mirror) = stores(&dir);
    let config = dir.join("sync.json");
    std::fs::write(
        &config,
        json!({
            "source": { "path": source.to_string_lossy() },
            "destination": { "path": mirror.to_string_lossy() }
        })
        .to_string(),
    )
    .expect("write config");

    let output = run_cli(
        &["sync", &config.to_string_lossy()],
        &[],
        &admin_request(&["tabel_mapel"]),
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(output.stdout.starts_with(b"data: "));
    let events = frames(&output.stdout);
    let kinds: Vec<&str> = events.iter().filter_map(|e| e["type"].as_str()).collect();
    assert_eq!(kinds, vec!["progress", "complete", "done"]);
    assert_eq!(events[1]["recordCount"], 2);
    assert_eq!(events[2]["tablesSynced"], 1);

    let names: Vec<String> = Connection::open(&mirror)
        .expect("reopen")
        .prepare("SELECT nama_mapel FROM tabel_mapel ORDER BY urutan")
        .expect("prepare")
        .query_map([], |r| r.get(0))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows");
    assert_eq!(names, vec!["Matematika", "Seni Budaya"]);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn cli_takes_store_paths_from_environment() {
    let dir = temp_dir("rapord-cli-env");
    let (source, mirror) = stores(&dir);

    let output = run_cli(
        &["sync"],
        &[("RAPORD_SOURCE_DB", &source), ("RAPORD_DEST_DB", &mirror)],
        &admin_request(&["tabel_mapel", "tabel_hilang"]),
    );
    // One table failed, so the exit status reports it.
    assert_eq!(output.status.code(), Some(1));
    let events = frames(&output.stdout);
    let kinds: Vec<&str> = events.iter().filter_map(|e| e["type"].as_str()).collect();
    assert_eq!(kinds, vec!["progress", "complete", "progress", "error", "done"]);
    assert_eq!(events[3]["table"], "tabel_hilang");
    assert_eq!(events[4]["tablesSynced"], 1);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn cli_unreadable_config_ends_with_error_then_done() {
    let dir = temp_dir("rapord-cli-badconfig");
    let missing = dir.join("nope.json");
    let output = run_cli(
        &["sync", &missing.to_string_lossy()],
        &[],
        &admin_request(&["tabel_mapel"]),
    );
    assert_eq!(output.status.code(), Some(1));
    let events = frames(&output.stdout);
    let kinds: Vec<&str> = events.iter().filter_map(|e| e["type"].as_str()).collect();
    assert_eq!(kinds, vec!["error", "done"]);
    assert_eq!(events[1]["totalRecords"], 0);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn cli_refuses_non_admin_before_streaming() {
    let output = run_cli(
        &["sync"],
        &[],
        &json!({ "level": "Guru", "schemas": [] }),
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(!output.stderr.is_empty());
}
