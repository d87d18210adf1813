//! Applies whole-file create/update/delete operations under a root directory.

pub mod xml;

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::CoreError;
use crate::utils::paths::resolve_within_root;

/// The operation a change record asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Create,
    /// Also accepted as `modify`.
    Update,
    Delete,
}

impl FromStr for ChangeOperation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" | "modify" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(CoreError::UnknownOperation(s.trim().to_string())),
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A validated change record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub path: String,
    pub operation: ChangeOperation,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub summary: String,
}

impl ChangeRequest {
    pub fn new(path: impl Into<String>, operation: ChangeOperation, code: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            operation,
            code: code.into(),
            summary: String::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }
}

/// A record that was rejected while decoding, before anything touched disk.
#[derive(Debug)]
pub struct RejectedChange {
    pub path: String,
    pub error: CoreError,
}

/// Outcome of one change record. Results keep the order of the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeResult {
    pub path: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChangeResult {
    pub fn ok(path: impl Into<String>, summary: &str) -> Self {
        Self {
            path: path.into(),
            success: true,
            summary: Some(summary.to_string()).filter(|s| !s.is_empty()),
            error: None,
        }
    }

    pub fn failed(path: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            success: false,
            summary: None,
            error: Some(error.to_string()),
        }
    }
}

pub struct ChangeApplier;

impl ChangeApplier {
    /// Applies `changes` in order. A failing record never stops the batch.
    pub fn apply(root_path: &Path, changes: &[ChangeRequest]) -> Vec<ChangeResult> {
        changes
            .iter()
            .map(|change| Self::apply_one(root_path, change))
            .collect()
    }

    /// Like [`ChangeApplier::apply`], but also reports records that were
    /// rejected at decode time, in their original position.
    pub fn apply_records(
        root_path: &Path,
        records: Vec<Result<ChangeRequest, RejectedChange>>,
    ) -> Vec<ChangeResult> {
        records
            .into_iter()
            .map(|record| match record {
                Ok(change) => Self::apply_one(root_path, &change),
                Err(rejected) => {
                    tracing::warn!("Rejected change for '{}': {}", rejected.path, rejected.error);
                    ChangeResult::failed(rejected.path, rejected.error)
                }
            })
            .collect()
    }

    /// Decodes an XML change payload and applies it. A payload that cannot be
    /// decoded yields a single failed result.
    pub fn apply_payload(root_path: &Path, payload: &str) -> Vec<ChangeResult> {
        match xml::parse_change_payload(payload) {
            Ok(records) => Self::apply_records(root_path, records),
            Err(e) => {
                tracing::error!("Could not decode change payload: {}", e);
                vec![ChangeResult::failed("", e)]
            }
        }
    }

    fn apply_one(root_path: &Path, change: &ChangeRequest) -> ChangeResult {
        match Self::execute(root_path, change) {
            Ok(()) => {
                tracing::info!("Applied {} to '{}'", change.operation, change.path);
                ChangeResult::ok(&change.path, &change.summary)
            }
            Err(e) => {
                tracing::warn!("Failed to {} '{}': {}", change.operation, change.path, e);
                ChangeResult::failed(&change.path, e)
            }
        }
    }

    fn execute(root_path: &Path, change: &ChangeRequest) -> Result<(), CoreError> {
        let full_path = resolve_within_root(root_path, &change.path)?;

        match change.operation {
            ChangeOperation::Create => {
                if let Some(parent) = full_path.parent() {
                    fs::create_dir_all(parent).map_err(|e| CoreError::io(e, parent))?;
                }
                fs::write(&full_path, &change.code).map_err(|e| CoreError::io(e, &full_path))
            }
            ChangeOperation::Update => {
                match full_path.parent() {
                    Some(parent) if parent.is_dir() => {}
                    Some(parent) => return Err(CoreError::MissingParent(parent.to_path_buf())),
                    None => return Err(CoreError::PathEscapesRoot(change.path.clone())),
                }
                fs::write(&full_path, &change.code).map_err(|e| CoreError::io(e, &full_path))
            }
            ChangeOperation::Delete => {
                fs::remove_file(&full_path).map_err(|e| CoreError::io(e, &full_path))
            }
        }
    }
}
