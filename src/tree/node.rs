//! Tree node types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::tree::path::join_path;

/// Whether a node's children are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadState {
    /// Children have never been fetched (or were invalidated).
    Unknown,
    /// A listing request is in flight.
    Pending,
    /// Children were delivered; an empty set is still loaded.
    Loaded,
}

impl LoadState {
    /// Check if the node still needs a fetch before its children can be shown.
    pub fn needs_fetch(&self) -> bool {
        matches!(self, LoadState::Unknown)
    }
}

/// Descriptor of a top-level hive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootDescriptor {
    /// Name shown for the hive (may differ from the path segment)
    pub display_name: String,
}

/// One named value attached to a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueEntry {
    pub name: String,
    /// Rendered value data; typing is left to the producer.
    pub data: String,
}

/// The values held by a leaf key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSet {
    pub values: Vec<ValueEntry>,
}

impl ValueSet {
    pub fn new(values: Vec<ValueEntry>) -> Self {
        Self { values }
    }

    /// Look up a value by name.
    pub fn get(&self, name: &str) -> Option<&ValueEntry> {
        self.values.iter().find(|v| v.name == name)
    }
}

/// Data associated with a node once it is known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Nothing known yet.
    #[default]
    Absent,
    /// Top-level hive descriptor.
    Root(RootDescriptor),
    /// Value set of a key.
    Values(ValueSet),
}

impl Payload {
    /// Root payload with the given display name.
    pub fn root(display_name: impl Into<String>) -> Self {
        Payload::Root(RootDescriptor {
            display_name: display_name.into(),
        })
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Payload::Absent)
    }
}

/// A node in the mirrored tree.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    /// Segment name, unique among siblings
    pub(crate) name: String,
    /// Slash-joined path from the root
    pub(crate) full_path: String,
    /// Full path of the parent; `None` for roots
    pub(crate) parent: Option<String>,
    pub(crate) payload: Payload,
    pub(crate) children: IndexMap<String, Node>,
    pub(crate) load_state: LoadState,
}

impl Node {
    /// Create a top-level node.
    pub(crate) fn root(name: &str, payload: Payload) -> Self {
        Self {
            name: name.to_string(),
            full_path: name.to_string(),
            parent: None,
            payload,
            children: IndexMap::new(),
            load_state: LoadState::Unknown,
        }
    }

    /// Create a node below `parent_path`.
    pub(crate) fn child(parent_path: &str, name: &str, payload: Payload) -> Self {
        Self {
            name: name.to_string(),
            full_path: join_path(parent_path, name),
            parent: Some(parent_path.to_string()),
            payload,
            children: IndexMap::new(),
            load_state: LoadState::Unknown,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    /// Full path of the parent, or `None` for a root.
    pub fn parent_path(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Look up a direct child by name.
    pub fn child_by_name(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    /// Iterate direct children in delivery order.
    pub fn children(&self) -> impl Iterator<Item = &Node> {
        self.children.values()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Whether a view should offer to expand this node.
    ///
    /// Anything not yet loaded might have children; a loaded node is
    /// expandable only if it actually has some.
    pub fn is_expandable(&self) -> bool {
        self.load_state != LoadState::Loaded || !self.children.is_empty()
    }

    /// Count this node and all its descendants.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.values().map(Node::subtree_len).sum::<usize>()
    }

    /// Visit this node and its descendants in pre-order.
    pub(crate) fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        f(self);
        for child in self.children.values() {
            child.walk(f);
        }
    }

    /// Read-only copy of this node without its children.
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            name: self.name.clone(),
            full_path: self.full_path.clone(),
            payload: self.payload.clone(),
            load_state: self.load_state,
            child_count: self.children.len(),
            expandable: self.is_expandable(),
        }
    }
}

/// Detached view of a node handed to presentation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    pub full_path: String,
    pub payload: Payload,
    pub load_state: LoadState,
    pub child_count: usize,
    pub expandable: bool,
}

/// Descriptor for one child in a listing response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildDescriptor {
    pub name: String,
    pub payload: Payload,
}

impl ChildDescriptor {
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Descriptor carrying only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, Payload::Absent)
    }
}
