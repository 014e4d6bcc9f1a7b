mod auth;
mod calc;
mod config;
mod db;
mod error;
mod fees;
mod ids;
mod ipc;
mod models;
mod render;
mod reports;
mod results;
mod uploads;

use std::io::{self, BufRead, Write};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    // stdout carries responses, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_from_env("COLLEGED_LOG"))
                .unwrap_or_else(|_| EnvFilter::new(config::Config::default().log_filter)),
        )
        .init();
}

fn main() {
    init_tracing();

    let cfg = match config::Config::load() {
        Ok(c) => c,
        Err(e) => {
            error!("configuration error: {:#}", e);
            std::process::exit(2);
        }
    };
    info!("colleged starting v{}", config::APP_VERSION);

    let startup_workspace = cfg.workspace.clone();
    let mut state = ipc::AppState::new(cfg);
    if let Some(path) = startup_workspace {
        if let Err(e) = ipc::open_workspace(&mut state, &path) {
            error!(workspace = %path.display(), error = %e, "could not open configured workspace");
        }
    }

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
                // No id to echo back.
                let resp = ipc::err("", "bad_json", e.to_string(), None);
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("stdin closed; shutting down");
}
