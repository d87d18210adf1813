//! Defines the event and message structures exchanged with the frontend.

use serde::{Deserialize, Serialize};

use super::view_model::UiState;
use crate::core::{AssembledPrompt, ChangeResult, ScanProgress};

/// Events sent from the backend to the frontend.
///
/// Serialized as `{ "event": "<name>", "payload": ... }`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum UserEvent {
    /// A complete state update to re-render the UI.
    StateUpdate(Box<UiState>),
    /// A progress update during a directory scan.
    ScanProgress(ScanProgress),
    /// The assembled prompt, ready to be previewed or copied.
    PromptGenerated(AssembledPrompt),
    /// One result per decoded change record, in payload order.
    ChangesApplied(Vec<ChangeResult>),
    /// An error message to be displayed to the user.
    ShowError(String),
}

/// A message received from the frontend.
#[derive(Deserialize, Debug)]
pub struct IpcMessage {
    /// The name of the command to execute.
    pub command: String,
    /// The payload associated with the command, as a JSON value.
    #[serde(default)]
    pub payload: serde_json::Value,
}
