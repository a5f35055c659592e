//! The overlay tree.
//!
//! Nodes live in an arena (`Vec<VfsNode>`) and refer to each other by [`NodeId`]. A child owns
//! nothing; the parent link is a plain index used for `..` and for rebuilding virtual paths, so
//! there are no ownership cycles. Slots of deleted nodes are reused, so a [`NodeId`] must not be
//! kept across a [`VfsTree::delete_node`] of that node.
//!
//! All paths taken by the methods here must already be canonical virtual paths (see
//! [`normalize_virtual_path`](crate::normalize_virtual_path)); the facade normalizes before it
//! calls in.

use std::collections::HashMap;
use std::path::PathBuf;

use super::entry::NodeKind;

/// Index of a node inside its [`VfsTree`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct VfsNode {
    name: String,
    parent: Option<NodeId>,
    children: HashMap<String, NodeId>, // keyed by the upper-cased name
    kind: NodeKind,
}

impl VfsNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

#[derive(Debug, Clone)]
pub struct VfsTree {
    nodes: Vec<VfsNode>,
    free: Vec<NodeId>,
}

impl Default for VfsTree {
    fn default() -> Self {
        Self::new()
    }
}

impl VfsTree {
    /// Creates a tree holding only the root: a nameless, parentless, non-writable directory.
    pub fn new() -> Self {
        Self {
            nodes: vec![VfsNode {
                name: String::new(),
                parent: None,
                children: HashMap::new(),
                kind: NodeKind::directory(None),
            }],
            free: Vec::new(),
        }
    }

    /// Number of nodes reachable in the tree, the root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &VfsNode {
        &self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0].children.values().copied()
    }

    fn parent_or_self(&self, id: NodeId) -> NodeId {
        self.nodes[id.0].parent.unwrap_or(id)
    }

    fn alloc(&mut self, parent: NodeId, name: String, kind: NodeKind) -> NodeId {
        let node = VfsNode {
            name: name.clone(),
            parent: Some(parent),
            children: HashMap::new(),
            kind,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = node;
                id
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        };
        self.nodes[parent.0].children.insert(name, id);
        id
    }

    /// Inserts or replaces the child `name` of the directory `parent`.
    ///
    /// - no child with that name: the new node is inserted;
    /// - the existing child is a file: it is replaced in place, whatever the new node is;
    /// - the existing child is a directory and the new node is a file: nothing changes;
    /// - both are directories: the existing one is kept with its children, and takes over the
    ///   new backing path (if any), which makes it writable.
    ///
    /// Returns the node now registered under `name`.
    pub fn create_node(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> NodeId {
        debug_assert!(self.nodes[parent.0].is_dir(), "parent must be a directory");
        let name = name.to_uppercase();

        let Some(existing) = self.nodes[parent.0].children.get(&name).copied() else {
            return self.alloc(parent, name, kind);
        };

        if !self.nodes[existing.0].is_dir() {
            // a file has no children, so the slot can take a directory as well
            let replaced = std::mem::replace(&mut self.nodes[existing.0].kind, kind);
            tracing::debug!(
                path = %self.vfs_path(existing),
                old = %replaced.verbose_path(),
                new = %self.nodes[existing.0].kind.verbose_path(),
                "Virtual overwrite"
            );
            return existing;
        }

        match kind {
            NodeKind::Directory {
                absolute_path: Some(path),
            } => {
                let current = &mut self.nodes[existing.0].kind;
                if current.absolute_path() != Some(path.as_path()) {
                    *current = NodeKind::directory(Some(path));
                }
            }
            NodeKind::Directory {
                absolute_path: None,
            } => {}
            other => {
                tracing::debug!(
                    path = %self.vfs_path(existing),
                    ignored = %other.verbose_path(),
                    "A file cannot override a directory"
                );
            }
        }
        existing
    }

    pub fn create_directory(
        &mut self,
        parent: NodeId,
        name: &str,
        absolute_path: Option<PathBuf>,
    ) -> NodeId {
        self.create_node(parent, name, NodeKind::directory(absolute_path))
    }

    pub fn create_file(&mut self, parent: NodeId, name: &str, absolute_path: PathBuf) -> NodeId {
        self.create_node(parent, name, NodeKind::file(absolute_path))
    }

    pub fn create_archive_file(
        &mut self,
        parent: NodeId,
        name: &str,
        archive_path: PathBuf,
        sub_path: String,
    ) -> NodeId {
        self.create_node(parent, name, NodeKind::archive_file(archive_path, sub_path))
    }

    /// Makes the directory `dir` mirror the real directory `absolute_path`, keeping its children.
    /// The root never gets a backing path.
    pub fn set_backing(&mut self, dir: NodeId, absolute_path: PathBuf) {
        let node = &mut self.nodes[dir.0];
        if node.parent.is_some() && node.is_dir() {
            node.kind = NodeKind::directory(Some(absolute_path));
        }
    }

    /// Walks `path` from `from` and returns the directory it ends at.
    ///
    /// `.` and empty segments stay in place, `..` moves to the parent (never above the root).
    /// Missing segments are created as bare directories when `create_if_missing` is set,
    /// otherwise the walk fails. It also fails as soon as a segment is not a directory.
    pub fn change_directory(
        &mut self,
        from: NodeId,
        path: &str,
        create_if_missing: bool,
    ) -> Option<NodeId> {
        if !create_if_missing {
            return self.find_directory(from, path);
        }

        let mut node = from;
        for segment in path.split('/') {
            node = match segment {
                "" | "." => node,
                ".." => self.parent_or_self(node),
                name => self.create_directory(node, name, None),
            };
            if !self.nodes[node.0].is_dir() {
                return None;
            }
        }
        Some(node)
    }

    /// Read-only variant of [`change_directory`](Self::change_directory).
    pub fn find_directory(&self, from: NodeId, path: &str) -> Option<NodeId> {
        self.get_node(from, path)
            .filter(|&id| self.nodes[id.0].is_dir())
    }

    /// Resolves `path` to its terminal node, file or directory.
    pub fn get_node(&self, from: NodeId, path: &str) -> Option<NodeId> {
        let mut node = from;
        for segment in path.split('/') {
            if !self.nodes[node.0].is_dir() {
                return None;
            }
            node = match segment {
                "" | "." => node,
                ".." => self.parent_or_self(node),
                name => *self.nodes[node.0].children.get(name)?,
            };
        }
        Some(node)
    }

    pub fn directory_exists(&self, path: &str) -> bool {
        self.find_directory(self.root(), path).is_some()
    }

    pub fn file_exists(&self, path: &str) -> bool {
        self.get_node(self.root(), path)
            .is_some_and(|id| !self.nodes[id.0].is_dir())
    }

    /// Detaches `id` from its parent and releases it together with everything below it.
    /// The root cannot be deleted.
    pub fn delete_node(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.nodes[id.0].parent else {
            return false;
        };
        let name = self.nodes[id.0].name.clone();
        let children = &mut self.nodes[parent.0].children;
        if children.get(&name) != Some(&id) {
            return false;
        }
        children.remove(&name);

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut self.nodes[current.0];
            stack.extend(node.children.drain().map(|(_, child)| child));
            node.parent = None;
            self.free.push(current);
        }
        true
    }

    /// Rebuilds the virtual path of a node, e.g. `/MSTS/ROUTES/FOO.PAT`. Directories get no
    /// trailing slash; the root is `/`.
    pub fn vfs_path(&self, id: NodeId) -> String {
        if self.nodes[id.0].parent.is_none() {
            return "/".to_string();
        }
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            names.push(self.nodes[node.0].name.as_str());
            current = self.nodes[node.0].parent;
        }
        names.reverse();
        names.join("/")
    }

    /// Lists the files (`files == true`) or the directories below `dir`; only the immediate
    /// children unless `recursive` is set.
    pub fn entries(&self, dir: NodeId, recursive: bool, files: bool) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![dir];
        while let Some(current) = stack.pop() {
            for child in self.children(current) {
                let is_dir = self.nodes[child.0].is_dir();
                if is_dir != files {
                    result.push(child);
                }
                if recursive && is_dir {
                    stack.push(child);
                }
            }
        }
        result
    }

    /// One line per node: directories with their writable backing path, files with their source.
    pub fn dump(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(dir) = stack.pop() {
            let mut line = format!("{}/", self.vfs_path(dir).trim_end_matches('/'));
            if let Some(path) = self.nodes[dir.0].kind.absolute_path() {
                line.push_str(&format!(" <= {}", path.display()));
            }
            lines.push(line);

            let mut files = self.entries(dir, false, true);
            files.sort_by_key(|&id| self.nodes[id.0].name.clone());
            for file in files {
                lines.push(format!(
                    "{} <= {}",
                    self.vfs_path(file),
                    self.nodes[file.0].kind.verbose_path()
                ));
            }

            let mut dirs = self.entries(dir, false, false);
            dirs.sort_by_key(|&id| std::cmp::Reverse(self.nodes[id.0].name.clone()));
            stack.extend(dirs);
        }
        lines
    }
}
