//! Defines the central, mutable state of the application.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{self, RepoSettings, SettingsStore, UiSettings};
use crate::core::ignore::{default_patterns, read_ignore_file};
use crate::core::{FileDescriptor, ScanProgress, SelectionState, SelectionTree, Template};

use super::persistence::{DebouncedSaver, DEFAULT_SAVE_DELAY};

/// Holds the complete, mutable state of the application.
///
/// This struct is wrapped in an `Arc<Mutex<...>>` to allow for safe, shared access
/// from the IPC handlers and the background tasks.
pub struct AppState {
    /// The settings store every persisted value goes through.
    pub store: Arc<dyn SettingsStore>,
    /// The root folder currently loaded, if any.
    pub current_root: Option<PathBuf>,
    /// The flat result of the last completed scan.
    pub descriptors: Vec<FileDescriptor>,
    /// Hierarchical view of `descriptors`, rebuilt after every selection change.
    pub tree: SelectionTree,
    pub selection: SelectionState,
    /// The ignore patterns used for the current root.
    pub filters: Vec<String>,
    /// Whether `filters` were set for this root rather than derived from its
    /// ignore file or the defaults. Only set filters are persisted.
    pub custom_filters: bool,
    pub instructions: String,
    pub templates: Vec<Template>,
    /// Ids of the templates included in the next prompt, in prompt order.
    pub active_template_ids: Vec<String>,
    pub ui_settings: UiSettings,
    pub recent_repos: Vec<PathBuf>,
    pub is_scanning: bool,
    pub scan_progress: ScanProgress,
    /// Incremented for every scan; results of older scans are discarded.
    pub scan_generation: u64,
    saver: Option<DebouncedSaver>,
}

impl AppState {
    /// Creates the state and loads the global namespaces from `store`.
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        let templates = config::load_templates(store.as_ref());
        let ui_settings = config::load_ui_settings(store.as_ref());
        let recent_repos = config::load_global_settings(store.as_ref()).recent_repos;

        Self {
            store,
            current_root: None,
            descriptors: Vec::new(),
            tree: SelectionTree::build(&[], &SelectionState::new()),
            selection: SelectionState::new(),
            filters: default_patterns(),
            custom_filters: false,
            instructions: String::new(),
            templates,
            active_template_ids: Vec::new(),
            ui_settings,
            recent_repos,
            is_scanning: false,
            scan_progress: ScanProgress {
                current_scanning_path: "Ready.".to_string(),
                ..Default::default()
            },
            scan_generation: 0,
            saver: None,
        }
    }

    /// Resets everything tied to the loaded root.
    pub fn reset_directory_state(&mut self) {
        self.current_root = None;
        self.descriptors.clear();
        self.selection.clear();
        self.rebuild_tree();
        self.filters = default_patterns();
        self.custom_filters = false;
        self.instructions.clear();
        self.is_scanning = false;
        self.scan_progress = ScanProgress {
            current_scanning_path: "Ready.".to_string(),
            ..Default::default()
        };
    }

    /// Makes `root` the current root and restores its persisted state.
    ///
    /// The outgoing root's settings are written synchronously first, so a
    /// snapshot still waiting in the saver is never read back stale.
    ///
    /// Filters come from the persisted per-root list, else from the root's
    /// ignore file, else from the defaults.
    pub fn open_root(&mut self, root: &Path) {
        self.save_repo_state_now();
        self.reset_directory_state();
        let repo = config::load_repo_settings(self.store.as_ref(), root);

        self.custom_filters = repo.filters.is_some();
        self.filters = repo
            .filters
            .or_else(|| read_ignore_file(root))
            .unwrap_or_else(default_patterns);
        self.selection = SelectionState::from_paths(repo.selected_files);
        self.instructions = repo.instructions;
        self.current_root = Some(root.to_path_buf());

        match config::record_opened_repo(self.store.as_ref(), root) {
            Ok(global) => self.recent_repos = global.recent_repos,
            Err(e) => tracing::warn!("Failed to record opened repository: {}", e),
        }
    }

    /// Replaces the filters of the current root with an explicit list.
    pub fn set_custom_filters(&mut self, filters: Vec<String>) {
        self.filters = filters;
        self.custom_filters = true;
    }

    /// Installs a fresh scan result, dropping selections that no longer exist.
    pub fn apply_scan_result(&mut self, descriptors: Vec<FileDescriptor>) {
        let dropped = self.selection.retain_known(&descriptors);
        if dropped > 0 {
            tracing::info!("Dropped {} selected paths not present in the new scan", dropped);
        }
        self.descriptors = descriptors;
        self.rebuild_tree();
    }

    pub fn rebuild_tree(&mut self) {
        self.tree = SelectionTree::build(&self.descriptors, &self.selection);
    }

    /// Starts a new scan generation and returns its number.
    pub fn next_scan_generation(&mut self) -> u64 {
        self.scan_generation += 1;
        self.scan_generation
    }

    /// Selected paths in display order.
    pub fn selected_paths(&self) -> Vec<String> {
        self.selection.selected_in_tree_order(&self.tree)
    }

    /// Active templates in the order they were activated. Unknown ids are skipped.
    pub fn active_templates(&self) -> Vec<Template> {
        self.active_template_ids
            .iter()
            .filter_map(|id| self.templates.iter().find(|t| &t.id == id).cloned())
            .collect()
    }

    /// Snapshot of the per-root settings as they should be persisted.
    pub fn repo_settings(&self) -> RepoSettings {
        let persisted = match &self.current_root {
            Some(root) => config::load_repo_settings(self.store.as_ref(), root),
            None => RepoSettings::default(),
        };
        RepoSettings {
            filters: self.custom_filters.then(|| self.filters.clone()),
            selected_files: self.selection.paths().map(str::to_string).collect(),
            instructions: self.instructions.clone(),
            last_opened: persisted.last_opened,
        }
    }

    /// Queues the per-root settings for a debounced write. Outside a tokio
    /// runtime the write happens immediately.
    pub fn persist_repo_state(&mut self) {
        let Some(root) = self.current_root.clone() else {
            return;
        };
        let settings = self.repo_settings();

        if self.saver.is_none() && tokio::runtime::Handle::try_current().is_ok() {
            self.saver = Some(DebouncedSaver::spawn(self.store.clone(), DEFAULT_SAVE_DELAY));
        }

        match &self.saver {
            Some(saver) => saver.schedule(root, settings),
            None => {
                if let Err(e) = config::save_repo_settings(self.store.as_ref(), &root, &settings) {
                    tracing::warn!("Failed to persist settings for {}: {}", root.display(), e);
                }
            }
        }
    }

    /// Writes the current root's settings to the store right away.
    fn save_repo_state_now(&self) {
        let Some(root) = self.current_root.as_deref() else {
            return;
        };
        if let Err(e) = config::save_repo_settings(self.store.as_ref(), root, &self.repo_settings()) {
            tracing::warn!("Failed to persist settings for {}: {}", root.display(), e);
        }
    }

    /// Handle to the saver, if one was started.
    pub fn saver(&self) -> Option<DebouncedSaver> {
        self.saver.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use crate::utils::test_helpers::write_file;

    #[test]
    fn test_open_root_prefers_persisted_filters_then_ignore_file() {
        let store: Arc<dyn SettingsStore> = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), ".repo_ignore", "# local\n*.tmp\n").unwrap();

        let mut state = AppState::new(store.clone());
        state.open_root(dir.path());
        assert_eq!(state.filters, vec!["*.tmp".to_string()]);

        let persisted = RepoSettings {
            filters: Some(vec!["*.png".to_string()]),
            selected_files: vec!["a.js".to_string()],
            instructions: "Fix bug".to_string(),
            last_opened: None,
        };
        config::save_repo_settings(store.as_ref(), dir.path(), &persisted).unwrap();

        let mut state = AppState::new(store.clone());
        state.open_root(dir.path());
        assert_eq!(state.filters, vec!["*.png".to_string()]);
        assert!(state.selection.is_selected("a.js"));
        assert_eq!(state.instructions, "Fix bug");
        assert_eq!(state.recent_repos, vec![dir.path().to_path_buf()]);
    }

    #[test]
    fn test_open_root_without_anything_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = AppState::new(Arc::new(MemoryStore::new()));
        state.open_root(dir.path());
        assert_eq!(state.filters, default_patterns());
    }

    #[test]
    fn test_scan_result_drops_vanished_selection() {
        let mut state = AppState::new(Arc::new(MemoryStore::new()));
        state.selection = SelectionState::from_paths(["a.js", "gone.js"]);

        state.apply_scan_result(vec![
            FileDescriptor::text("a.js", 3),
            FileDescriptor::binary("logo.png"),
        ]);

        assert_eq!(state.selected_paths(), vec!["a.js".to_string()]);
        assert_eq!(state.tree.selected_tokens(state.tree.root()), 3);
    }

    #[test]
    fn test_persist_outside_runtime_writes_directly() {
        let store: Arc<dyn SettingsStore> = Arc::new(MemoryStore::new());
        let mut state = AppState::new(store.clone());
        state.current_root = Some(PathBuf::from("/work/repo"));
        state.instructions = "Explain".to_string();

        state.persist_repo_state();

        let saved = config::load_repo_settings(store.as_ref(), Path::new("/work/repo"));
        assert_eq!(saved.instructions, "Explain");
        assert!(saved.filters.is_none());

        state.set_custom_filters(vec!["*.png".to_string()]);
        state.persist_repo_state();
        let saved = config::load_repo_settings(store.as_ref(), Path::new("/work/repo"));
        assert_eq!(saved.filters, Some(vec!["*.png".to_string()]));
    }

    #[test]
    fn test_derived_filters_follow_later_ignore_file() {
        let store: Arc<dyn SettingsStore> = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();

        let mut state = AppState::new(store.clone());
        state.open_root(dir.path());
        state.persist_repo_state();
        assert_eq!(state.filters, default_patterns());

        write_file(dir.path(), ".repo_ignore", "*.md\n").unwrap();
        let mut state = AppState::new(store);
        state.open_root(dir.path());
        assert_eq!(state.filters, vec!["*.md".to_string()]);
        assert!(!state.custom_filters);
    }

    #[tokio::test]
    async fn test_reopen_sees_state_still_pending_in_saver() {
        let store: Arc<dyn SettingsStore> = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();

        let mut state = AppState::new(store);
        state.open_root(dir.path());
        state.selection.set("a.js", true);
        state.instructions = "Fix bug".to_string();
        state.persist_repo_state();

        state.open_root(other.path());
        state.open_root(dir.path());

        assert!(state.selection.is_selected("a.js"));
        assert_eq!(state.instructions, "Fix bug");
    }

    #[test]
    fn test_active_templates_follow_activation_order() {
        let mut state = AppState::new(Arc::new(MemoryStore::new()));
        state.templates = vec![
            Template { id: "a".into(), name: "A".into(), content: "first".into() },
            Template { id: "b".into(), name: "B".into(), content: "second".into() },
        ];
        state.active_template_ids = vec!["b".into(), "missing".into(), "a".into()];

        let contents: Vec<_> = state.active_templates().into_iter().map(|t| t.content).collect();
        assert_eq!(contents, vec!["second", "first"]);
    }
}
