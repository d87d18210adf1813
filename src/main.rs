use anyhow::Context;
use repo_prompter::app::{self, helpers::lock_state, proxy::StdoutProxy, state::AppState};
use repo_prompter::config::settings::JsonFileStore;
use repo_prompter::config::{MemoryStore, SettingsStore};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Reads one JSON IPC message per stdin line and writes one JSON event per
/// stdout line. Logs go to stderr.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let store: Arc<dyn SettingsStore> = match JsonFileStore::open_default() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!("Settings unavailable ({}); nothing will be persisted", e);
            Arc::new(MemoryStore::new())
        }
    };

    let state = Arc::new(Mutex::new(AppState::new(store)));
    let proxy = StdoutProxy;

    // A folder passed on the command line is opened before any message is read.
    if let Some(path) = std::env::args_os().nth(1) {
        let open = serde_json::json!({ "command": "openRepo", "payload": path.to_string_lossy() });
        if let Some(task) = app::handle_ipc_message(&open.to_string(), proxy, state.clone()) {
            task.await.context("Initial scan task panicked")?;
        }
    }

    tracing::info!("Application initialized. Waiting for commands on stdin.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read from stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        // Commands run one after another so piped scripts see the effect of
        // every earlier command.
        if let Some(task) = app::handle_ipc_message(&line, proxy, state.clone()) {
            if let Err(e) = task.await {
                tracing::error!("Command task failed: {}", e);
            }
        }
    }

    let saver = lock_state(&state).saver();
    if let Some(saver) = saver {
        saver.flush().await;
    }
    tracing::info!("Input closed. Exiting.");
    Ok(())
}
