//! Hierarchical selection view over a flat scan result.
//!
//! The tree is a projection: it is rebuilt from `(descriptors, SelectionState)`
//! whenever either changes, and callers mutate the [`SelectionState`], never
//! the nodes. Aggregates (full/partial selection, token totals) are computed
//! bottom-up once per build.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::FileDescriptor;

/// Index of a node inside a [`SelectionTree`].
///
/// Ids are only meaningful for the tree that handed them out through
/// [`SelectionTree::root`], [`SelectionTree::find`] or
/// [`SelectionTree::children`]. The per-node queries panic on an id from
/// another tree or from before a rebuild that is out of range; use
/// [`SelectionTree::get`] to check one.
pub type NodeId = usize;

const ROOT: NodeId = 0;

/// Aggregate selection state of a node, as shown by a tri-state checkbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionStatus {
    Full,
    Partial,
    None,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    File { descriptor: usize, selected: bool },
    Folder { children: Vec<NodeId> },
}

#[derive(Debug, Clone, Copy, Default)]
struct Aggregate {
    text_files: usize,
    selected_text_files: usize,
    total_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    /// Root-relative path; empty for the root.
    pub path: String,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    aggregate: Aggregate,
}

impl TreeNode {
    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File { .. })
    }
}

/// The set of selected file paths for one root.
///
/// Only text files are ever selectable; paths that disappear from a new scan
/// are dropped through [`SelectionState::retain_known`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionState {
    selected: BTreeSet<String>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selected: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_selected(&self, path: &str) -> bool {
        self.selected.contains(path)
    }

    pub fn set(&mut self, path: &str, selected: bool) {
        if selected {
            self.selected.insert(path.to_string());
        } else {
            self.selected.remove(path);
        }
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.selected.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Drops every path that is not a text file of the new scan.
    /// Returns the number of dropped paths.
    pub fn retain_known(&mut self, descriptors: &[FileDescriptor]) -> usize {
        let known: BTreeSet<&str> = descriptors
            .iter()
            .filter(|d| d.is_text)
            .map(|d| d.path.as_str())
            .collect();
        let before = self.selected.len();
        self.selected.retain(|path| known.contains(path.as_str()));
        before - self.selected.len()
    }

    /// Flips the selection of a single text file. Binary or unknown paths are
    /// left untouched. Returns the resulting selection state of the path.
    pub fn toggle_file(&mut self, tree: &SelectionTree, path: &str) -> bool {
        let selectable = tree
            .find(path)
            .and_then(|id| tree.descriptor(id))
            .is_some_and(|d| d.is_text);

        if !selectable {
            return false;
        }

        let now_selected = !self.is_selected(path);
        self.set(path, now_selected);
        now_selected
    }

    /// Selects or clears every text file under `node`. Binary files are never
    /// touched. Returns the number of files whose state changed.
    pub fn set_folder(&mut self, tree: &SelectionTree, node: NodeId, selected: bool) -> usize {
        let mut changed = 0;
        for path in tree.text_files_under(node) {
            if self.is_selected(path) != selected {
                self.set(path, selected);
                changed += 1;
            }
        }
        changed
    }

    pub fn select_all(&mut self, tree: &SelectionTree) -> usize {
        self.set_folder(tree, tree.root(), true)
    }

    /// Selected paths in display order (folders first, then alphabetical).
    pub fn selected_in_tree_order(&self, tree: &SelectionTree) -> Vec<String> {
        tree.files_in_order()
            .into_iter()
            .filter_map(|id| {
                let node = tree.node(id);
                match node.kind {
                    NodeKind::File { descriptor, .. }
                        if tree.descriptors[descriptor].is_text
                            && self.is_selected(&node.path) =>
                    {
                        Some(node.path.clone())
                    }
                    _ => None,
                }
            })
            .collect()
    }
}

/// A serializable snapshot of one node, used by the view model.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNodeView {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    pub is_text: bool,
    pub total_tokens: usize,
    pub selection_state: SelectionStatus,
    pub children: Vec<TreeNodeView>,
}

/// Typed arena of folder and file nodes built from a scan result.
#[derive(Debug, Clone)]
pub struct SelectionTree {
    nodes: Vec<TreeNode>,
    descriptors: Vec<FileDescriptor>,
    index: HashMap<String, NodeId>,
}

impl SelectionTree {
    /// Builds the tree and computes all aggregates.
    ///
    /// Descriptors whose path collides with an existing node (duplicates, or a
    /// file and a folder of the same name) are skipped with a warning.
    pub fn build(descriptors: &[FileDescriptor], selection: &SelectionState) -> Self {
        let mut tree = Self {
            nodes: vec![TreeNode {
                name: String::new(),
                path: String::new(),
                parent: None,
                kind: NodeKind::Folder {
                    children: Vec::new(),
                },
                aggregate: Aggregate::default(),
            }],
            descriptors: Vec::with_capacity(descriptors.len()),
            index: HashMap::with_capacity(descriptors.len() * 2),
        };

        for descriptor in descriptors {
            tree.insert(descriptor, selection);
        }

        tree.sort_children();
        tree.compute_aggregates();
        tree
    }

    fn insert(&mut self, descriptor: &FileDescriptor, selection: &SelectionState) {
        let segments: Vec<&str> = descriptor
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let Some(last) = segments.len().checked_sub(1) else {
            tracing::warn!("Skipping descriptor with empty path");
            return;
        };

        let mut parent = ROOT;
        let mut current_path = String::with_capacity(descriptor.path.len());

        for (i, segment) in segments.iter().enumerate() {
            if !current_path.is_empty() {
                current_path.push('/');
            }
            current_path.push_str(segment);

            if let Some(&existing) = self.index.get(&current_path) {
                if i == last || self.nodes[existing].is_file() {
                    tracing::warn!("Skipping conflicting path '{}'", descriptor.path);
                    return;
                }
                parent = existing;
                continue;
            }

            let kind = if i == last {
                NodeKind::File {
                    descriptor: self.descriptors.len(),
                    selected: descriptor.is_text && selection.is_selected(&current_path),
                }
            } else {
                NodeKind::Folder {
                    children: Vec::new(),
                }
            };

            let id = self.nodes.len();
            self.nodes.push(TreeNode {
                name: (*segment).to_string(),
                path: current_path.clone(),
                parent: Some(parent),
                kind,
                aggregate: Aggregate::default(),
            });
            if let NodeKind::Folder { children } = &mut self.nodes[parent].kind {
                children.push(id);
            }
            self.index.insert(current_path.clone(), id);
            parent = id;
        }

        self.descriptors.push(descriptor.clone());
    }

    /// Folders before files, then case-sensitive by name.
    fn sort_children(&mut self) {
        for id in 0..self.nodes.len() {
            let mut children = match &mut self.nodes[id].kind {
                NodeKind::Folder { children } => std::mem::take(children),
                NodeKind::File { .. } => continue,
            };

            children.sort_by(|&a, &b| {
                let (a, b) = (&self.nodes[a], &self.nodes[b]);
                a.is_file()
                    .cmp(&b.is_file())
                    .then_with(|| a.name.cmp(&b.name))
            });

            if let NodeKind::Folder { children: slot } = &mut self.nodes[id].kind {
                *slot = children;
            }
        }
    }

    /// Children always have a larger id than their parent, so a reverse sweep
    /// visits every node after all of its descendants.
    fn compute_aggregates(&mut self) {
        for id in (0..self.nodes.len()).rev() {
            if let NodeKind::File {
                descriptor,
                selected,
            } = self.nodes[id].kind
            {
                let d = &self.descriptors[descriptor];
                self.nodes[id].aggregate = Aggregate {
                    text_files: usize::from(d.is_text),
                    selected_text_files: usize::from(selected),
                    total_tokens: d.token_count,
                };
            }

            if let Some(parent) = self.nodes[id].parent {
                let child = self.nodes[id].aggregate;
                let agg = &mut self.nodes[parent].aggregate;
                agg.text_files += child.text_files;
                agg.selected_text_files += child.selected_text_files;
                agg.total_tokens += child.total_tokens;
            }
        }
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    /// # Panics
    ///
    /// If `id` was not issued by this tree.
    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    /// The node for `id`, or `None` if this tree has no such node.
    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    /// Number of nodes, the root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Looks a node up by root-relative path. The empty path is the root.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            Some(ROOT)
        } else {
            self.index.get(trimmed).copied()
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id].kind {
            NodeKind::Folder { children } => children,
            NodeKind::File { .. } => &[],
        }
    }

    pub fn descriptor(&self, id: NodeId) -> Option<&FileDescriptor> {
        match self.nodes[id].kind {
            NodeKind::File { descriptor, .. } => Some(&self.descriptors[descriptor]),
            NodeKind::Folder { .. } => None,
        }
    }

    /// A file is fully selected when it is selected. A folder is fully selected
    /// when it has at least one text file below it and all of them are selected.
    pub fn is_fully_selected(&self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        match node.kind {
            NodeKind::File { selected, .. } => selected,
            NodeKind::Folder { .. } => {
                let agg = node.aggregate;
                agg.text_files > 0 && agg.selected_text_files == agg.text_files
            }
        }
    }

    /// True when some, but not all, text files under a folder are selected.
    pub fn is_partially_selected(&self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        match node.kind {
            NodeKind::File { .. } => false,
            NodeKind::Folder { .. } => {
                let agg = node.aggregate;
                agg.selected_text_files > 0 && agg.selected_text_files < agg.text_files
            }
        }
    }

    pub fn status(&self, id: NodeId) -> SelectionStatus {
        if self.is_fully_selected(id) {
            SelectionStatus::Full
        } else if self.is_partially_selected(id) {
            SelectionStatus::Partial
        } else {
            SelectionStatus::None
        }
    }

    /// Sum of token counts of every file below (or at) `id`.
    pub fn total_tokens(&self, id: NodeId) -> usize {
        self.nodes[id].aggregate.total_tokens
    }

    /// Number of text files below (or at) `id`.
    pub fn text_file_count(&self, id: NodeId) -> usize {
        self.nodes[id].aggregate.text_files
    }

    /// Number of selected text files below (or at) `id`.
    pub fn selected_file_count(&self, id: NodeId) -> usize {
        self.nodes[id].aggregate.selected_text_files
    }

    /// Token total of the selected files below (or at) `id`.
    pub fn selected_tokens(&self, id: NodeId) -> usize {
        self.files_in_order_from(id)
            .into_iter()
            .filter(|&f| self.is_fully_selected(f))
            .filter_map(|f| self.descriptor(f))
            .map(|d| d.token_count)
            .sum()
    }

    /// Paths of every text file below (or at) `id`, in display order.
    pub fn text_files_under(&self, id: NodeId) -> Vec<&str> {
        self.files_in_order_from(id)
            .into_iter()
            .filter(|&f| self.descriptor(f).is_some_and(|d| d.is_text))
            .map(|f| self.nodes[f].path.as_str())
            .collect()
    }

    /// All file nodes in display order.
    pub fn files_in_order(&self) -> Vec<NodeId> {
        self.files_in_order_from(ROOT)
    }

    fn files_in_order_from(&self, start: NodeId) -> Vec<NodeId> {
        let mut files = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            match &self.nodes[id].kind {
                NodeKind::File { .. } => files.push(id),
                NodeKind::Folder { children } => stack.extend(children.iter().rev()),
            }
        }
        files
    }

    /// Serializable view of the root's children.
    pub fn to_view(&self) -> Vec<TreeNodeView> {
        self.children(ROOT)
            .iter()
            .map(|&id| self.view_of(id))
            .collect()
    }

    fn view_of(&self, id: NodeId) -> TreeNodeView {
        let node = &self.nodes[id];
        TreeNodeView {
            name: node.name.clone(),
            path: node.path.clone(),
            is_directory: !node.is_file(),
            is_text: self.descriptor(id).map_or(true, |d| d.is_text),
            total_tokens: self.total_tokens(id),
            selection_state: self.status(id),
            children: self.children(id).iter().map(|&c| self.view_of(c)).collect(),
        }
    }
}
