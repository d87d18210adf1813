pub mod changes;
pub mod error;
pub mod ignore;
pub mod prompt;
pub mod scanner;
pub mod selection;
pub mod tree_generator;

use serde::{Deserialize, Serialize};

/// Metadata for one file found by a scan.
///
/// `path` is root-relative, `/`-separated and unique within a scan result.
/// `is_text` and `token_count` are independent: a text file with zero tokens
/// is an empty text file, never a binary one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub path: String,
    pub token_count: usize,
    pub is_text: bool,
}

impl FileDescriptor {
    pub fn text(path: impl Into<String>, token_count: usize) -> Self {
        Self {
            path: path.into(),
            token_count,
            is_text: true,
        }
    }

    pub fn binary(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            token_count: 0,
            is_text: false,
        }
    }
}

/// A reusable block of text prepended to prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    pub content: String,
}

pub use changes::{ChangeApplier, ChangeOperation, ChangeRequest, ChangeResult};
pub use error::CoreError;
pub use ignore::PatternMatcher;
pub use prompt::{AssembledPrompt, PromptAssembler};
pub use scanner::{DirectoryScanner, ScanOptions, ScanProgress};
pub use selection::{NodeId, SelectionState, SelectionStatus, SelectionTree};
pub use tree_generator::TreeGenerator;
