pub mod settings;
pub mod store;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::scanner::ScanOptions;
use crate::core::Template;
pub use store::{MemoryStore, SettingsStore};

pub const GLOBAL_SETTINGS_KEY: &str = "globalSettings";
pub const UI_SETTINGS_KEY: &str = "uiSettings";
pub const TEMPLATES_KEY: &str = "templates";
pub const MAX_RECENT_REPOS: usize = 10;

/// Store key of the per-root namespace.
pub fn repo_key(root: &Path) -> String {
    format!("repos.{}", root.display())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalSettings {
    pub last_opened_repo: Option<PathBuf>,
    pub recent_repos: Vec<PathBuf>,
}

impl GlobalSettings {
    /// Moves `root` to the front of the recent list and marks it last opened.
    pub fn record_opened(&mut self, root: &Path) {
        self.recent_repos.retain(|r| r != root);
        self.recent_repos.insert(0, root.to_path_buf());
        self.recent_repos.truncate(MAX_RECENT_REPOS);
        self.last_opened_repo = Some(root.to_path_buf());
    }
}

/// Everything remembered about one root folder.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RepoSettings {
    /// `None` until the user saves a filter list for this root.
    pub filters: Option<Vec<String>>,
    pub selected_files: Vec<String>,
    pub instructions: String,
    pub last_opened: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UiSettings {
    pub include_file_tree: bool,
    pub strict_utf8: bool,
    pub max_file_size_mb: u64,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            include_file_tree: true,
            strict_utf8: false,
            max_file_size_mb: 20,
        }
    }
}

impl UiSettings {
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            strict_utf8: self.strict_utf8,
            max_file_size: self.max_file_size_mb.saturating_mul(1024 * 1024),
        }
    }
}

/// Reads `key` as `T`. Missing or undecodable values fall back to the default.
pub fn load<T>(store: &dyn SettingsStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match store.get(key) {
        None | Some(serde_json::Value::Null) => T::default(),
        Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!("Invalid settings under '{}': {}. Using defaults.", key, e);
            T::default()
        }),
    }
}

pub fn save<T: Serialize>(store: &dyn SettingsStore, key: &str, value: &T) -> Result<()> {
    store.set(key, serde_json::to_value(value)?)
}

pub fn load_global_settings(store: &dyn SettingsStore) -> GlobalSettings {
    load(store, GLOBAL_SETTINGS_KEY)
}

pub fn load_ui_settings(store: &dyn SettingsStore) -> UiSettings {
    load(store, UI_SETTINGS_KEY)
}

pub fn save_ui_settings(store: &dyn SettingsStore, settings: &UiSettings) -> Result<()> {
    save(store, UI_SETTINGS_KEY, settings)
}

pub fn load_templates(store: &dyn SettingsStore) -> Vec<Template> {
    load(store, TEMPLATES_KEY)
}

pub fn save_templates(store: &dyn SettingsStore, templates: &[Template]) -> Result<()> {
    save(store, TEMPLATES_KEY, &templates)
}

pub fn load_repo_settings(store: &dyn SettingsStore, root: &Path) -> RepoSettings {
    load(store, &repo_key(root))
}

pub fn save_repo_settings(
    store: &dyn SettingsStore,
    root: &Path,
    settings: &RepoSettings,
) -> Result<()> {
    save(store, &repo_key(root), settings)
}

/// Records `root` as the last opened repository and stamps its `lastOpened`.
pub fn record_opened_repo(store: &dyn SettingsStore, root: &Path) -> Result<GlobalSettings> {
    let mut global = load_global_settings(store);
    global.record_opened(root);
    save(store, GLOBAL_SETTINGS_KEY, &global)?;

    let mut repo = load_repo_settings(store, root);
    repo.last_opened = Some(Utc::now());
    save_repo_settings(store, root, &repo)?;

    tracing::info!("Recorded {} as last opened repository", root.display());
    Ok(global)
}
