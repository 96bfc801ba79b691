mod columns;
mod config;
mod db;
mod focus;
mod grid;
mod ipc;
mod model;
mod report;
mod store;

use serde_json::json;
use std::io::{self, BufRead, Write};

fn main() {
    // stdout carries the IPC stream; logs go to stderr only.
    env_logger::Builder::from_env(env_logger::Env::default().filter_or(config::LOG_ENV, "info"))
        .target(env_logger::Target::Stderr)
        .init();

    let mut state = ipc::AppState::new(config::Settings::from_env());
    log::info!("gradesheetd {} ready", env!("CARGO_PKG_VERSION"));

    let stdin = io::stdin();
    let mut stdout = io::stdout();

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
                // Can't reply without id.
                log::warn!("unparseable request line: {}", e);
                let resp = json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        log::debug!("request {} {}", req.id, req.method);
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
