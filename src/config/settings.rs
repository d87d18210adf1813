use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::store::SettingsStore;

const APP_NAME: &str = "RepoPrompter";
const SETTINGS_FILE: &str = "settings.json";

/// Returns the platform-specific configuration directory for the application.
pub fn get_config_directory() -> Option<PathBuf> {
    ProjectDirs::from("com", "repoprompter", APP_NAME)
        .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
}

/// Returns the full path to the settings file.
pub fn get_settings_file_path() -> Option<PathBuf> {
    get_config_directory().map(|dir| dir.join(SETTINGS_FILE))
}

/// A [`SettingsStore`] backed by a single JSON document on disk.
///
/// Every `set` rewrites the whole document through a temporary file in the
/// same directory, so a crash mid-write leaves the previous version intact.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Opens the store in the platform config directory.
    pub fn open_default() -> Result<Self> {
        let path = get_settings_file_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Self::open(path)
    }

    /// Opens the store at `path`. A missing file starts empty. A corrupted
    /// file is logged and replaced by an empty document on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let values = if !path.exists() {
            tracing::info!("Settings file not found, starting empty at {:?}", path);
            Map::new()
        } else {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings file {}", path.display()))?;
            match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => {
                    tracing::info!("Loaded settings from {:?}", path);
                    map
                }
                Ok(_) => {
                    tracing::warn!(
                        "Settings file at {:?} is not a JSON object. Falling back to defaults.",
                        path
                    );
                    Map::new()
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse settings file at {:?}: {}. Falling back to defaults.",
                        path,
                        e
                    );
                    Map::new()
                }
            }
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &Map<String, Value>) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Settings path has no parent directory"))?;

        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
            tracing::info!("Created config directory: {:?}", dir);
        }

        let json = serde_json::to_string_pretty(values)?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(json.as_bytes())?;
        file.persist(&self.path)
            .with_context(|| format!("Failed to replace settings file {}", self.path.display()))?;

        tracing::debug!("Saved settings to {:?}", self.path);
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .ok()
            .and_then(|values| values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("settings store lock poisoned"))?;
        values.insert(key.to_string(), value);
        self.persist(&values)
    }
}

// Platform-specific configuration paths for reference:
// macOS:   ~/Library/Application Support/com.repoprompter.RepoPrompter/
// Linux:   ~/.config/repoprompter/
// Windows: %APPDATA%/repoprompter/RepoPrompter/config/
