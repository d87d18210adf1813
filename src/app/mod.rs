//! The headless application layer: shared state, IPC dispatch and background tasks.

pub mod commands;
pub mod events;
pub mod helpers;
pub mod persistence;
pub mod proxy;
pub mod state;
pub mod tasks;
pub mod view_model;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use events::{IpcMessage, UserEvent};
use proxy::EventProxy;
use state::AppState;

/// Parses one IPC message and dispatches it to its command handler.
///
/// Commands that touch the filesystem at length (scans, prompt assembly,
/// change application) run as tokio tasks whose handle is returned; everything
/// else completes before this function returns. Must be called from within a
/// tokio runtime.
pub fn handle_ipc_message<P: EventProxy>(
    message: &str,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) -> Option<JoinHandle<()>> {
    let msg = match serde_json::from_str::<IpcMessage>(message) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!("Failed to parse IPC message: {}", e);
            proxy.send_event(UserEvent::ShowError(format!("Invalid message: {e}")));
            return None;
        }
    };

    tracing::debug!("IPC command '{}'", msg.command);
    let payload = msg.payload;

    match msg.command.as_str() {
        "initialize" => {
            commands::initialize(proxy, state);
            None
        }
        "openRepo" => parse_payload::<PathBuf, _>("openRepo", payload, &proxy)
            .map(|path| commands::open_repo(path, proxy, state)),
        "rescan" => commands::rescan_directory(proxy, state),
        "toggleFile" => {
            if let Some(path) = parse_payload("toggleFile", payload, &proxy) {
                commands::toggle_file(path, proxy, state);
            }
            None
        }
        "setFolderSelection" => {
            if let Some(selection) = parse_payload("setFolderSelection", payload, &proxy) {
                commands::set_folder_selection(selection, proxy, state);
            }
            None
        }
        "selectAll" => {
            commands::select_all(proxy, state);
            None
        }
        "clearSelection" => {
            commands::clear_selection(proxy, state);
            None
        }
        "setInstructions" => {
            if let Some(text) = parse_payload("setInstructions", payload, &proxy) {
                commands::set_instructions(text, proxy, state);
            }
            None
        }
        "setFilters" => commands::set_filters(payload, proxy, state),
        "saveIgnoreFile" => {
            commands::save_ignore_file(proxy, state);
            None
        }
        "addTemplate" => {
            if let Some(template) = parse_payload("addTemplate", payload, &proxy) {
                commands::add_template(template, proxy, state);
            }
            None
        }
        "deleteTemplate" => {
            if let Some(id) = parse_payload("deleteTemplate", payload, &proxy) {
                commands::delete_template(id, proxy, state);
            }
            None
        }
        "setActiveTemplates" => {
            if let Some(ids) = parse_payload("setActiveTemplates", payload, &proxy) {
                commands::set_active_templates(ids, proxy, state);
            }
            None
        }
        "setIncludeFileTree" => {
            if let Some(include) = parse_payload("setIncludeFileTree", payload, &proxy) {
                commands::set_include_file_tree(include, proxy, state);
            }
            None
        }
        "generatePrompt" => Some(commands::generate_prompt(proxy, state)),
        "applyChanges" => parse_payload::<String, _>("applyChanges", payload, &proxy)
            .map(|xml| commands::apply_changes(xml, proxy, state)),
        unknown => {
            tracing::warn!("Unknown IPC command: {}", unknown);
            None
        }
    }
}

fn parse_payload<T: DeserializeOwned, P: EventProxy>(
    command: &str,
    payload: serde_json::Value,
    proxy: &P,
) -> Option<T> {
    match serde_json::from_value::<T>(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Invalid payload for '{}': {}", command, e);
            proxy.send_event(UserEvent::ShowError(format!(
                "Invalid payload for '{command}': {e}"
            )));
            None
        }
    }
}
