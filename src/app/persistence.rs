//! Debounced writes of per-root settings.
//!
//! Selection toggles and instruction edits arrive in bursts. The saver keeps
//! the latest snapshot per root and writes it once no new snapshot has arrived
//! for the quiet period.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::config::{self, RepoSettings, SettingsStore};

pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_millis(500);

enum SaveCommand {
    Save { root: PathBuf, settings: RepoSettings },
    Flush(oneshot::Sender<()>),
}

/// Handle to the background saver task. Cloning shares the same task.
#[derive(Clone)]
pub struct DebouncedSaver {
    sender: mpsc::UnboundedSender<SaveCommand>,
}

impl DebouncedSaver {
    /// Spawns the saver on the current tokio runtime.
    pub fn spawn(store: Arc<dyn SettingsStore>, delay: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_saver(store, delay, receiver));
        Self { sender }
    }

    /// Queues `settings` for `root`, replacing any snapshot still pending.
    pub fn schedule(&self, root: PathBuf, settings: RepoSettings) {
        if self.sender.send(SaveCommand::Save { root, settings }).is_err() {
            tracing::warn!("Settings saver has stopped; dropping pending save");
        }
    }

    /// Writes everything pending right away and waits for the write.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.sender.send(SaveCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_saver(
    store: Arc<dyn SettingsStore>,
    delay: Duration,
    mut receiver: mpsc::UnboundedReceiver<SaveCommand>,
) {
    let mut pending: HashMap<PathBuf, RepoSettings> = HashMap::new();

    loop {
        let command = if pending.is_empty() {
            receiver.recv().await
        } else {
            match tokio::time::timeout(delay, receiver.recv()).await {
                Ok(command) => command,
                Err(_) => {
                    write_pending(store.as_ref(), &mut pending);
                    continue;
                }
            }
        };

        match command {
            Some(SaveCommand::Save { root, settings }) => {
                pending.insert(root, settings);
            }
            Some(SaveCommand::Flush(done)) => {
                write_pending(store.as_ref(), &mut pending);
                let _ = done.send(());
            }
            None => {
                write_pending(store.as_ref(), &mut pending);
                tracing::debug!("Settings saver stopped");
                return;
            }
        }
    }
}

fn write_pending(store: &dyn SettingsStore, pending: &mut HashMap<PathBuf, RepoSettings>) {
    for (root, settings) in pending.drain() {
        match config::save_repo_settings(store, &root, &settings) {
            Ok(()) => tracing::debug!("Persisted settings for {}", root.display()),
            Err(e) => tracing::warn!("Failed to persist settings for {}: {}", root.display(), e),
        }
    }
}
