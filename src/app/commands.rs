//! Contains all the command handlers that are callable from the frontend via IPC.
//!
//! Each function in this module corresponds to a specific `IpcMessage::command`.
//! These handlers are responsible for interacting with the `AppState` and the `core`
//! logic, and for sending `UserEvent`s back to the UI.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Deserialize;
use tokio::task::JoinHandle;

use super::events::UserEvent;
use super::helpers::{lock_state, notify_state, with_state_and_notify};
use super::proxy::EventProxy;
use super::state::AppState;
use super::tasks::{apply_changes_task, generate_prompt_task, start_scan_on_path};
use crate::config;
use crate::core::ignore::{parse_pattern_lines, write_ignore_file};
use crate::core::Template;

#[derive(Debug, Deserialize)]
pub struct FolderSelectionPayload {
    pub path: String,
    pub selected: bool,
}

#[derive(Debug, Deserialize)]
pub struct NewTemplatePayload {
    pub name: String,
    pub content: String,
}

/// Sends the current state, typically when the frontend has just loaded.
pub fn initialize<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    let state_guard = lock_state(&state);
    notify_state(&state_guard, &proxy);
}

/// Opens `path` as the new root and scans it.
pub fn open_repo<P: EventProxy>(
    path: PathBuf,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) -> JoinHandle<()> {
    tracing::info!("Opening repository {}", path.display());
    start_scan_on_path(path, proxy, state, false)
}

/// Re-scans the current root, keeping selection, filters and instructions.
pub fn rescan_directory<P: EventProxy>(
    proxy: P,
    state: Arc<Mutex<AppState>>,
) -> Option<JoinHandle<()>> {
    let current_root = lock_state(&state).current_root.clone();
    match current_root {
        Some(root) => Some(start_scan_on_path(root, proxy, state, true)),
        None => {
            tracing::warn!("Rescan requested without an open folder");
            None
        }
    }
}

/// Toggles the selection state of a single text file.
pub fn toggle_file<P: EventProxy>(path: String, proxy: P, state: Arc<Mutex<AppState>>) {
    with_state_and_notify(&state, &proxy, |s| {
        let tree = &s.tree;
        let now_selected = s.selection.toggle_file(tree, &path);
        tracing::debug!("Toggled '{}' -> {}", path, now_selected);
        s.rebuild_tree();
        s.persist_repo_state();
    });
}

/// Selects or clears every text file under a folder. An empty path is the root.
pub fn set_folder_selection<P: EventProxy>(
    payload: FolderSelectionPayload,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    with_state_and_notify(&state, &proxy, |s| {
        let Some(node) = s.tree.find(&payload.path) else {
            tracing::warn!("Folder '{}' is not part of the current tree", payload.path);
            return;
        };
        let tree = &s.tree;
        let changed = s.selection.set_folder(tree, node, payload.selected);
        tracing::debug!("Folder '{}' selection changed {} files", payload.path, changed);
        s.rebuild_tree();
        s.persist_repo_state();
    });
}

pub fn select_all<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    with_state_and_notify(&state, &proxy, |s| {
        let tree = &s.tree;
        s.selection.select_all(tree);
        s.rebuild_tree();
        s.persist_repo_state();
    });
}

pub fn clear_selection<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    with_state_and_notify(&state, &proxy, |s| {
        s.selection.clear();
        s.rebuild_tree();
        s.persist_repo_state();
    });
}

pub fn set_instructions<P: EventProxy>(
    instructions: String,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    with_state_and_notify(&state, &proxy, |s| {
        s.instructions = instructions;
        s.persist_repo_state();
    });
}

/// Replaces the filter list of the current root and rescans with it.
///
/// Accepts either a list of patterns or newline-delimited text.
pub fn set_filters<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) -> Option<JoinHandle<()>> {
    let filters = match payload {
        serde_json::Value::String(text) => parse_pattern_lines(&text),
        other => match serde_json::from_value::<Vec<String>>(other) {
            Ok(patterns) => patterns,
            Err(e) => {
                tracing::warn!("Failed to deserialize filters from payload: {}", e);
                proxy.send_event(UserEvent::ShowError(format!("Invalid filters: {e}")));
                return None;
            }
        },
    };

    {
        let mut state_guard = lock_state(&state);
        tracing::info!("Updating filters: {} patterns", filters.len());
        state_guard.set_custom_filters(filters);
        state_guard.persist_repo_state();
    }

    rescan_directory(proxy, state)
}

/// Writes the current filters to the root's ignore file.
pub fn save_ignore_file<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    let state_guard = lock_state(&state);
    let Some(root) = state_guard.current_root.as_ref() else {
        proxy.send_event(UserEvent::ShowError("No folder is open.".to_string()));
        return;
    };

    if let Err(e) = write_ignore_file(root, &state_guard.filters) {
        tracing::error!("Failed to write ignore file: {}", e);
        proxy.send_event(UserEvent::ShowError(format!("Failed to save ignore file: {e}")));
    }
}

pub fn add_template<P: EventProxy>(
    payload: NewTemplatePayload,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    with_state_and_notify(&state, &proxy, |s| {
        let id = unique_template_id(&s.templates);
        tracing::info!("Adding template '{}' ({})", payload.name, id);
        s.templates.push(Template {
            id,
            name: payload.name,
            content: payload.content,
        });
        save_templates(s);
    });
}

pub fn delete_template<P: EventProxy>(id: String, proxy: P, state: Arc<Mutex<AppState>>) {
    with_state_and_notify(&state, &proxy, |s| {
        let before = s.templates.len();
        s.templates.retain(|t| t.id != id);
        s.active_template_ids.retain(|active| active != &id);
        if s.templates.len() == before {
            tracing::warn!("No template with id '{}'", id);
            return;
        }
        save_templates(s);
    });
}

/// Sets which templates go into the prompt, in the given order.
pub fn set_active_templates<P: EventProxy>(
    ids: Vec<String>,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    with_state_and_notify(&state, &proxy, |s| {
        let mut active: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if s.templates.iter().any(|t| t.id == id) && !active.contains(&id) {
                active.push(id);
            } else {
                tracing::debug!("Ignoring unknown or duplicate template id '{}'", id);
            }
        }
        s.active_template_ids = active;
    });
}

pub fn set_include_file_tree<P: EventProxy>(
    include: bool,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    with_state_and_notify(&state, &proxy, |s| {
        s.ui_settings.include_file_tree = include;
        if let Err(e) = config::save_ui_settings(s.store.as_ref(), &s.ui_settings) {
            tracing::warn!("Failed to save UI settings: {}", e);
        }
    });
}

pub fn generate_prompt<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) -> JoinHandle<()> {
    generate_prompt_task(proxy, state)
}

pub fn apply_changes<P: EventProxy>(
    payload: String,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) -> JoinHandle<()> {
    apply_changes_task(payload, proxy, state)
}

fn save_templates(state: &AppState) {
    if let Err(e) = config::save_templates(state.store.as_ref(), &state.templates) {
        tracing::warn!("Failed to save templates: {}", e);
    }
}

fn unique_template_id(existing: &[Template]) -> String {
    let base = format!("tpl-{}", Utc::now().format("%Y%m%d%H%M%S%3f"));
    let mut id = base.clone();
    let mut suffix = 1;
    while existing.iter().any(|t| t.id == id) {
        suffix += 1;
        id = format!("{base}-{suffix}");
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_ids_are_unique() {
        let first = unique_template_id(&[]);
        let existing = vec![Template {
            id: first.clone(),
            name: "A".into(),
            content: String::new(),
        }];
        let second = unique_template_id(&existing);
        assert_ne!(first, second);
        assert!(second.starts_with("tpl-"));
    }
}
