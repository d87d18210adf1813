//! Generates an ASCII representation of the selected files.

use std::collections::BTreeMap;
use std::path::Path;

/// A utility struct for generating an ASCII directory tree.
///
/// This struct is stateless and provides methods as associated functions.
pub struct TreeGenerator;

/// A transient node used for building the ASCII tree.
#[derive(Debug, Default)]
struct TreeNode {
    folders: BTreeMap<String, TreeNode>,
    files: Vec<String>,
}

impl TreeGenerator {
    /// Renders the given root-relative, `/`-separated paths below a line
    /// naming the root. Folders come before files at each level and both are
    /// sorted by name.
    pub fn generate_tree<S: AsRef<str>>(paths: &[S], root_path: &Path) -> String {
        let mut root = TreeNode::default();
        for path in paths {
            Self::insert_into_tree(&mut root, path.as_ref());
        }

        let root_name = root_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root_path.display().to_string());

        let mut result = format!("{root_name}/\n");
        Self::render_children(&root, &mut result, "");
        result
    }

    /// Inserts a path into the tree structure.
    fn insert_into_tree(root: &mut TreeNode, path: &str) {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((file, folders)) = segments.split_last() else {
            return;
        };

        let mut current = root;
        for folder in folders {
            current = current.folders.entry((*folder).to_string()).or_default();
        }
        if !current.files.iter().any(|f| f == file) {
            current.files.push((*file).to_string());
        }
    }

    /// Renders the children of a tree node.
    fn render_children(node: &TreeNode, result: &mut String, prefix: &str) {
        let mut files: Vec<&String> = node.files.iter().collect();
        files.sort();

        let total = node.folders.len() + files.len();
        let mut index = 0;

        for (name, child) in &node.folders {
            index += 1;
            let is_last = index == total;
            let connector = if is_last { "└── " } else { "├── " };
            result.push_str(&format!("{prefix}{connector}{name}/\n"));

            let new_prefix = if is_last {
                format!("{prefix}    ")
            } else {
                format!("{prefix}│   ")
            };
            Self::render_children(child, result, &new_prefix);
        }

        for name in files {
            index += 1;
            let connector = if index == total { "└── " } else { "├── " };
            result.push_str(&format!("{prefix}{connector}{name}\n"));
        }
    }
}
