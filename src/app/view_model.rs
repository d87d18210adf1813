//! Responsible for transforming the `AppState` into a `UiState` view model.
//!
//! This module acts as a presentation layer, preparing data specifically for
//! consumption by the UI.

use serde::Serialize;

use super::state::AppState;
use crate::core::selection::TreeNodeView;
use crate::core::{ScanProgress, Template};

/// A serializable representation of the application state for the UI.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub current_root: Option<String>,
    pub recent_repos: Vec<String>,
    pub tree: Vec<TreeNodeView>,
    pub total_files_found: usize,
    pub selected_files_count: usize,
    pub selected_tokens: usize,
    pub total_tokens: usize,
    pub filters: Vec<String>,
    pub instructions: String,
    pub templates: Vec<Template>,
    pub active_template_ids: Vec<String>,
    pub include_file_tree: bool,
    pub is_scanning: bool,
    pub status_message: String,
    pub scan_progress: ScanProgress,
}

/// Creates the complete `UiState` from the current `AppState`.
pub fn generate_ui_state(state: &AppState) -> UiState {
    let root = state.tree.root();
    let tree = if state.is_scanning {
        Vec::new()
    } else {
        state.tree.to_view()
    };

    let status_message = if state.is_scanning {
        format!(
            "Scanning... {} files processed. {} large files skipped ({})",
            state.scan_progress.files_scanned,
            state.scan_progress.large_files_skipped,
            state.scan_progress.current_scanning_path
        )
    } else {
        state.scan_progress.current_scanning_path.clone()
    };

    UiState {
        current_root: state
            .current_root
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned()),
        recent_repos: state
            .recent_repos
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect(),
        tree,
        total_files_found: state.descriptors.len(),
        selected_files_count: state.tree.selected_file_count(root),
        selected_tokens: state.tree.selected_tokens(root),
        total_tokens: state.tree.total_tokens(root),
        filters: state.filters.clone(),
        instructions: state.instructions.clone(),
        templates: state.templates.clone(),
        active_template_ids: state.active_template_ids.clone(),
        include_file_tree: state.ui_settings.include_file_tree,
        is_scanning: state.is_scanning,
        status_message,
        scan_progress: state.scan_progress.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use crate::core::{FileDescriptor, SelectionState, SelectionStatus};
    use std::sync::Arc;

    #[test]
    fn test_ui_state_reports_selection_totals() {
        let mut state = AppState::new(Arc::new(MemoryStore::new()));
        state.selection = SelectionState::from_paths(["src/a.rs"]);
        state.apply_scan_result(vec![
            FileDescriptor::text("src/a.rs", 4),
            FileDescriptor::text("src/b.rs", 6),
            FileDescriptor::binary("logo.png"),
        ]);

        let ui = generate_ui_state(&state);
        assert_eq!(ui.total_files_found, 3);
        assert_eq!(ui.selected_files_count, 1);
        assert_eq!(ui.selected_tokens, 4);
        assert_eq!(ui.total_tokens, 10);
        assert_eq!(ui.tree[0].name, "src");
        assert_eq!(ui.tree[0].selection_state, SelectionStatus::Partial);
    }

    #[test]
    fn test_tree_is_hidden_while_scanning() {
        let mut state = AppState::new(Arc::new(MemoryStore::new()));
        state.apply_scan_result(vec![FileDescriptor::text("a.rs", 1)]);
        state.is_scanning = true;
        state.scan_progress.files_scanned = 7;

        let ui = generate_ui_state(&state);
        assert!(ui.tree.is_empty());
        assert!(ui.status_message.starts_with("Scanning... 7 files processed."));
    }
}
