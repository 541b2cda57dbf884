//! Path-addressed index over the root set.

use std::collections::HashSet;

use indexmap::IndexMap;
use indexmap::map::Entry;
use tracing::trace;

use crate::error::{Result, TreeError};
use crate::tree::node::{Node, Payload};
use crate::tree::path::{parse_path, split_path};

/// Default limit on the number of segments in a path.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Outcome of [`PathIndex::resolve_or_create`].
#[derive(Debug)]
pub enum Resolution<'a> {
    /// The path named a single segment: this is the root itself, and there
    /// is no parent to attach to.
    Root(&'a mut Node),
    /// The node one level above the last segment.
    Parent(&'a mut Node),
}

impl<'a> Resolution<'a> {
    /// The parent node, or `None` for a root-level path.
    pub fn parent(self) -> Option<&'a mut Node> {
        match self {
            Resolution::Root(_) => None,
            Resolution::Parent(node) => Some(node),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Resolution::Root(_))
    }
}

/// Set of root trees addressed by slash-delimited paths.
///
/// Pure data structure: no I/O and no notion of fetching. Every lookup
/// while walking a path is scoped to the current node's children.
#[derive(Debug, Clone)]
pub struct PathIndex {
    roots: IndexMap<String, Node>,
    max_depth: usize,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    /// Create an index that rejects paths deeper than `max_depth` segments.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            roots: IndexMap::new(),
            max_depth: max_depth.max(1),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Register a root, or return the existing one.
    ///
    /// The payload is applied when the root is new, or when it was created
    /// implicitly and has no payload yet.
    pub fn register_root(&mut self, identifier: &str, payload: Payload) -> Result<&mut Node> {
        let segments = parse_path(identifier, self.max_depth)?;
        let [name] = segments.as_slice() else {
            return Err(TreeError::InvalidPath(identifier.to_string()));
        };

        let root = match self.roots.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let root = entry.into_mut();
                if root.payload.is_absent() {
                    root.payload = payload;
                }
                root
            }
            Entry::Vacant(entry) => {
                trace!(root = %name, "registering root");
                entry.insert(Node::root(name, payload))
            }
        };
        Ok(root)
    }

    /// Find or create the node chain for `path`.
    ///
    /// Missing nodes, including the final leaf, are created with
    /// `Unknown` state and no payload. For a path of two or more segments
    /// the node one level above the leaf is returned; a single-segment
    /// path resolves to the root itself.
    pub fn resolve_or_create(&mut self, path: &str) -> Result<Resolution<'_>> {
        let segments = parse_path(path, self.max_depth)?;
        let Some((first, rest)) = segments.split_first() else {
            return Err(TreeError::InvalidPath(path.to_string()));
        };

        let root = match self.roots.entry(first.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                trace!(root = %first, "creating implicit root");
                entry.insert(Node::root(first, Payload::Absent))
            }
        };

        let Some((leaf, middle)) = rest.split_last() else {
            return Ok(Resolution::Root(root));
        };

        let mut cursor = root;
        for segment in middle {
            cursor = child_or_create(cursor, segment);
        }
        child_or_create(cursor, leaf);

        Ok(Resolution::Parent(cursor))
    }

    /// Look up a node by path without creating anything.
    pub fn get(&self, path: &str) -> Option<&Node> {
        let segments = split_path(path);
        let (first, rest) = segments.split_first()?;
        let mut cursor = self.roots.get(*first)?;
        for segment in rest {
            cursor = cursor.children.get(*segment)?;
        }
        Some(cursor)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Node> {
        let segments = split_path(path);
        let (first, rest) = segments.split_first()?;
        let mut cursor = self.roots.get_mut(*first)?;
        for segment in rest {
            cursor = cursor.children.get_mut(*segment)?;
        }
        Some(cursor)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Iterate roots in registration order.
    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.roots.values()
    }

    pub fn remove_root(&mut self, identifier: &str) -> Option<Node> {
        self.roots.shift_remove(identifier)
    }

    /// Drop every root, handing the removed trees back to the caller.
    pub fn clear(&mut self) -> Vec<Node> {
        self.roots.drain(..).map(|(_, node)| node).collect()
    }

    /// Total number of nodes across all roots.
    pub fn len(&self) -> usize {
        self.roots.values().map(Node::subtree_len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Flatten the tree depth-first into `(depth, node)` rows.
    ///
    /// Only nodes whose full path is in `expanded` contribute their
    /// children.
    pub fn visible_rows<'a>(&'a self, expanded: &HashSet<String>) -> Vec<(usize, &'a Node)> {
        let mut rows = Vec::new();
        for root in self.roots.values() {
            flatten_visible(root, 0, expanded, &mut rows);
        }
        rows
    }
}

impl Default for PathIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Return the child named `name`, creating it if absent.
fn child_or_create<'a>(parent: &'a mut Node, name: &str) -> &'a mut Node {
    let Node {
        full_path,
        children,
        ..
    } = parent;
    match children.entry(name.to_string()) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => {
            trace!(parent = %full_path, child = %name, "creating intermediate node");
            entry.insert(Node::child(full_path, name, Payload::Absent))
        }
    }
}

fn flatten_visible<'a>(
    node: &'a Node,
    depth: usize,
    expanded: &HashSet<String>,
    rows: &mut Vec<(usize, &'a Node)>,
) {
    rows.push((depth, node));
    if expanded.contains(&node.full_path) {
        for child in node.children.values() {
            flatten_visible(child, depth + 1, expanded, rows);
        }
    }
}
