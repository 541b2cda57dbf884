//! Local mirror of the remote namespace.

pub(crate) mod node;
pub mod path;
mod path_index;

pub use node::{
    ChildDescriptor, LoadState, Node, NodeSnapshot, Payload, RootDescriptor, ValueEntry, ValueSet,
};
pub use path::{normalize_path, split_path};
pub use path_index::{DEFAULT_MAX_DEPTH, PathIndex, Resolution};
