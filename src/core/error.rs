//! Defines the custom error type for the `core` module.

use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for the `core` module.
///
/// Most core operations are partial-failure tolerant and fold these errors into
/// per-item outcomes (a skipped descriptor, an inline prompt marker, a failed
/// `ChangeResult`). The enum still gives every failure a precise cause so that
/// the per-item message is meaningful.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Represents an I/O error, typically from file system operations.
    #[error("I/O error for path {1}: {0}")]
    Io(#[source] std::io::Error, PathBuf),

    /// Represents an error that occurred when a Tokio task was joined.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Represents a path that was expected to be a directory but was not.
    #[error("Path is not a valid directory: {0}")]
    NotADirectory(PathBuf),

    /// A relative path resolved outside of the root directory.
    #[error("Invalid file path: {0}")]
    PathEscapesRoot(String),

    /// An update targeted a file whose parent directory does not exist.
    #[error("Parent directory does not exist: {0}")]
    MissingParent(PathBuf),

    /// A change record named an operation other than create, update, modify or delete.
    #[error("Unknown operation: '{0}' (expected create, update, modify or delete)")]
    UnknownOperation(String),

    /// A change record lacked a required element.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// The change payload could not be decoded at all.
    #[error("Malformed change payload: {0}")]
    InvalidPayload(String),
}

impl CoreError {
    /// Convenience constructor pairing an I/O error with the path it concerns.
    pub fn io(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io(err, path.into())
    }
}
