mod config;
mod db;
mod ipc;
mod layout;
mod logging;
mod report;
mod sync;

use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;

use config::SyncConfig;
use sync::{SseWriter, SyncError, SyncRequest};

fn main() {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => serve_ipc(),
        Some("sync") => std::process::exit(run_sync_cli(args.get(1).map(PathBuf::from))),
        Some(other) => {
            eprintln!("unknown command: {}", other);
            eprintln!("usage: rapord [sync [config.json]]");
            std::process::exit(2);
        }
    }
}

/// JSON-lines request loop on stdin/stdout.
fn serve_ipc() {
    let mut state = ipc::AppState::default();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sidecar started");

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                let reply = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", reply);
                let _ = stdout.flush();
                continue;
            }
        };

        tracing::debug!(id = %req.id, method = %req.method, "request");
        let resp = {
            let mut notifier = ipc::Notifier::new(req.id.clone(), &mut stdout);
            ipc::handle_request(&mut state, req, &mut notifier)
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}

/// `rapord sync [config.json]`: reads a sync request from stdin and streams
/// the session as Server-Sent-Event frames on stdout.
fn run_sync_cli(config_path: Option<PathBuf>) -> i32 {
    let mut body = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut body) {
        eprintln!("{}", SyncError::from(e));
        return 2;
    }
    let request: SyncRequest = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("invalid sync request: {}", e);
            return 2;
        }
    };
    if let Err(e) = request.authorize() {
        eprintln!("{}", e);
        return 1;
    }

    let mut sink = SseWriter::new(io::stdout());
    let loaded = match config_path {
        Some(path) => SyncConfig::load_file(&path),
        None => Ok(SyncConfig::default()),
    };
    let summary = match loaded {
        Ok(mut config) => {
            config.apply_env_overrides();
            sync::run_session(&config, &request.tables(), &mut sink)
        }
        Err(e) => sync::session::abort(&e, &mut sink),
    };

    if summary.fatal.is_some() || summary.tables_failed > 0 {
        1
    } else {
        0
    }
}
