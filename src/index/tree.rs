//! Path Tree - per-tenant trie over dot separated metric names
//!
//! Nodes live in an arena (`Vec<Option<TreeNode>>` plus a free list) and
//! refer to each other by slot index. A node is a branch when it has
//! children and a leaf when it carries archive keys; it may be both:
//!
//! ```text
//! (root)
//!   └─ a
//!      └─ b
//!         ├─ c      [key1]        leaf + branch
//!         │  └─ d   [key2]        leaf
//!         └─ c2                   branch
//!            └─ d   [key3, key4]  leaf with two colliding archives
//! ```
//!
//! Nodes without children and without archives never survive the
//! operation that emptied them. All walks use explicit work lists, so
//! neither depth nor width of the tree can exhaust the call stack.

use crate::index::glob::{GlobMatcher, SegmentMatcher};
use crate::metric::MetricKey;
use std::collections::BTreeMap;

const ROOT: usize = 0;

/// One path segment
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Full dotted path of this node
    path: String,
    parent: Option<usize>,
    /// segment → slot
    children: BTreeMap<String, usize>,
    /// Leaf state
    archives: Vec<MetricKey>,
}

impl TreeNode {
    fn new(path: String, parent: Option<usize>) -> Self {
        Self {
            path,
            parent,
            children: BTreeMap::new(),
            archives: Vec::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn archives(&self) -> &[MetricKey] {
        &self.archives
    }

    pub fn is_leaf(&self) -> bool {
        !self.archives.is_empty()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    fn is_empty(&self) -> bool {
        self.archives.is_empty() && self.children.is_empty()
    }

    fn segment(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }
}

/// Arena backed trie
#[derive(Debug)]
pub struct PathTree {
    nodes: Vec<Option<TreeNode>>,
    free: Vec<usize>,
    live: usize,
}

impl Default for PathTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PathTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(TreeNode::new(String::new(), None))],
            free: Vec::new(),
            live: 0,
        }
    }

    pub fn node(&self, idx: usize) -> Option<&TreeNode> {
        self.nodes.get(idx).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut TreeNode> {
        self.nodes.get_mut(idx).and_then(Option::as_mut)
    }

    fn alloc(&mut self, node: TreeNode) -> usize {
        self.live += 1;
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) -> Option<TreeNode> {
        let node = self.nodes.get_mut(idx)?.take()?;
        self.free.push(idx);
        self.live -= 1;
        Some(node)
    }

    /// Number of nodes, excluding the root
    pub fn node_count(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Insert `key` at `path`, creating missing nodes.
    ///
    /// Returns false if the key was already present at that node.
    pub fn add(&mut self, path: &str, key: MetricKey) -> bool {
        let mut cur = ROOT;

        for segment in path.split('.') {
            let existing = self
                .node(cur)
                .and_then(|n| n.children.get(segment).copied());

            cur = match existing {
                Some(child) => child,
                None => {
                    let child_path = match self.node(cur) {
                        Some(parent) if cur != ROOT => format!("{}.{}", parent.path, segment),
                        _ => segment.to_string(),
                    };
                    let child = self.alloc(TreeNode::new(child_path, Some(cur)));
                    if let Some(parent) = self.node_mut(cur) {
                        parent.children.insert(segment.to_string(), child);
                    }
                    child
                }
            };
        }

        match self.node_mut(cur) {
            Some(node) if !node.archives.contains(&key) => {
                node.archives.push(key);
                true
            }
            _ => false,
        }
    }

    /// Slot of the node at exactly `path`
    pub fn lookup(&self, path: &str) -> Option<usize> {
        let mut cur = ROOT;
        for segment in path.split('.') {
            cur = *self.node(cur)?.children.get(segment)?;
        }
        Some(cur)
    }

    /// Nodes whose path matches `glob`, level by level from the root
    pub fn find(&self, glob: &GlobMatcher) -> Vec<usize> {
        let mut frontier = vec![ROOT];

        for matcher in glob.segments() {
            let mut next = Vec::new();

            for idx in frontier {
                let Some(node) = self.node(idx) else {
                    continue;
                };
                match matcher {
                    SegmentMatcher::Literal(segment) => {
                        if let Some(&child) = node.children.get(segment) {
                            next.push(child);
                        }
                    }
                    _ => next.extend(
                        node.children
                            .iter()
                            .filter(|(segment, _)| matcher.matches(segment))
                            .map(|(_, &child)| child),
                    ),
                }
            }

            if next.is_empty() {
                return next;
            }
            frontier = next;
        }

        frontier
    }

    /// Remove one archive key from the node at `path`, then drop any
    /// ancestors left without content.
    pub fn remove_archive(&mut self, path: &str, key: &MetricKey) -> bool {
        let Some(idx) = self.lookup(path) else {
            return false;
        };
        let removed = match self.node_mut(idx) {
            Some(node) => {
                let before = node.archives.len();
                node.archives.retain(|k| k != key);
                node.archives.len() != before
            }
            None => false,
        };

        self.prune_upward(idx);
        removed
    }

    /// Remove the node at `idx` and everything below it.
    ///
    /// Returns every archive key found in the subtree. Cost is linear in
    /// the size of the subtree plus the depth of `idx`.
    pub fn delete_subtree(&mut self, idx: usize) -> Vec<MetricKey> {
        if idx == ROOT {
            return Vec::new();
        }
        let Some(parent) = self.node(idx).and_then(|n| n.parent) else {
            return Vec::new();
        };

        let mut keys = Vec::new();
        let mut stack = vec![idx];
        let mut segment = None;

        while let Some(cur) = stack.pop() {
            let Some(node) = self.release(cur) else {
                continue;
            };
            if cur == idx {
                segment = Some(node.segment().to_string());
            }
            keys.extend(node.archives);
            stack.extend(node.children.into_values());
        }

        if let (Some(segment), Some(parent_node)) = (segment, self.node_mut(parent)) {
            parent_node.children.remove(&segment);
        }
        self.prune_upward(parent);

        keys
    }

    /// Walk from `idx` towards the root removing empty nodes
    fn prune_upward(&mut self, idx: usize) {
        let mut cur = idx;

        while cur != ROOT {
            match self.node(cur) {
                Some(node) if node.is_empty() => {}
                _ => break,
            }
            let Some(node) = self.release(cur) else {
                break;
            };
            let Some(parent) = node.parent else {
                break;
            };
            if let Some(parent_node) = self.node_mut(parent) {
                parent_node.children.remove(node.segment());
            }
            cur = parent;
        }
    }
}
