//! Background work started by commands: scans, prompt assembly and change application.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use super::events::UserEvent;
use super::helpers::{lock_state, notify_state};
use super::proxy::EventProxy;
use super::state::AppState;
use crate::core::{ChangeApplier, CoreError, DirectoryScanner, PromptAssembler, ScanProgress};

/// Starts a scan of `path`.
///
/// With `preserve_state` the current root keeps its selection, filters and
/// instructions (a rescan). Otherwise `path` is opened as a new root and its
/// persisted state is restored first. Only the most recently started scan may
/// publish its result; older ones are discarded when they finish.
pub fn start_scan_on_path<P: EventProxy>(
    path: PathBuf,
    proxy: P,
    state: Arc<Mutex<AppState>>,
    preserve_state: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if !path.is_dir() {
            tracing::warn!("Refusing to scan {}: not a directory", path.display());
            proxy.send_event(UserEvent::ShowError(format!(
                "Selected path is not a valid directory: {}",
                path.display()
            )));
            return;
        }

        let (generation, filters, options) = {
            let mut state_guard = lock_state(&state);
            if !preserve_state || state_guard.current_root.as_deref() != Some(path.as_path()) {
                state_guard.open_root(&path);
            }

            state_guard.is_scanning = true;
            state_guard.scan_progress = ScanProgress {
                current_scanning_path: "Initializing scan...".to_string(),
                ..Default::default()
            };
            let generation = state_guard.next_scan_generation();
            notify_state(&state_guard, &proxy);

            (
                generation,
                state_guard.filters.clone(),
                state_guard.ui_settings.scan_options(),
            )
        };

        tracing::info!("Starting scan #{} of {}", generation, path.display());

        let progress_proxy = proxy.clone();
        let scan_path = path.clone();
        let scan_result = tokio::task::spawn_blocking(move || {
            let scanner = DirectoryScanner::with_options(&filters, options);
            scanner.scan_with_progress(&scan_path, |progress| {
                progress_proxy.send_event(UserEvent::ScanProgress(progress));
            })
        })
        .await;

        let mut state_guard = lock_state(&state);
        if state_guard.scan_generation != generation {
            tracing::info!("Scan #{} was superseded; discarding its result", generation);
            return;
        }

        state_guard.is_scanning = false;
        match scan_result.map_err(CoreError::from).and_then(|result| result) {
            Ok(descriptors) => {
                let count = descriptors.len();
                state_guard.apply_scan_result(descriptors);
                state_guard.scan_progress = ScanProgress {
                    files_scanned: count,
                    current_scanning_path: format!("Scan complete. Found {count} files."),
                    ..Default::default()
                };
                state_guard.persist_repo_state();
            }
            Err(e) => {
                tracing::error!("Scan #{} failed: {}", generation, e);
                state_guard.scan_progress.current_scanning_path = format!("Scan failed: {e}");
                proxy.send_event(UserEvent::ShowError(format!("Scan failed: {e}")));
            }
        }
        notify_state(&state_guard, &proxy);
    })
}

/// Assembles the prompt from the current selection on the blocking pool.
pub fn generate_prompt_task<P: EventProxy>(
    proxy: P,
    state: Arc<Mutex<AppState>>,
) -> JoinHandle<()> {
    let job = {
        let state_guard = lock_state(&state);
        state_guard.current_root.clone().map(|root| {
            (
                root,
                state_guard.selected_paths(),
                state_guard.instructions.clone(),
                state_guard.active_templates(),
                state_guard.ui_settings.include_file_tree,
            )
        })
    };

    tokio::spawn(async move {
        let Some((root, selected, instructions, templates, include_tree)) = job else {
            proxy.send_event(UserEvent::ShowError("No folder is open.".to_string()));
            return;
        };

        let result = tokio::task::spawn_blocking(move || {
            PromptAssembler::assemble(&root, &selected, &instructions, &templates, include_tree)
        })
        .await;

        match result {
            Ok(prompt) => proxy.send_event(UserEvent::PromptGenerated(prompt)),
            Err(e) => {
                tracing::error!("Prompt assembly task failed: {}", e);
                proxy.send_event(UserEvent::ShowError(format!("Prompt generation failed: {e}")));
            }
        }
    })
}

/// Applies an XML change payload under the current root, then rescans it so
/// the tree reflects created and deleted files.
pub fn apply_changes_task<P: EventProxy>(
    payload: String,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) -> JoinHandle<()> {
    let root = lock_state(&state).current_root.clone();

    tokio::spawn(async move {
        let Some(root) = root else {
            proxy.send_event(UserEvent::ShowError("No folder is open.".to_string()));
            return;
        };

        let apply_root = root.clone();
        let results = tokio::task::spawn_blocking(move || {
            ChangeApplier::apply_payload(&apply_root, &payload)
        })
        .await;

        match results {
            Ok(results) => {
                let failed = results.iter().filter(|r| !r.success).count();
                tracing::info!("Applied {} changes, {} failed", results.len(), failed);
                proxy.send_event(UserEvent::ChangesApplied(results));
                // A failed rescan reports its own error.
                let _ = start_scan_on_path(root, proxy, state, true).await;
            }
            Err(e) => {
                tracing::error!("Change application task failed: {}", e);
                proxy.send_event(UserEvent::ShowError(format!("Applying changes failed: {e}")));
            }
        }
    })
}
