//! # hivemirror
//!
//! Lazy, path-addressed mirror of a remote hierarchical namespace, such as
//! the registry hives of a remote host.
//!
//! ## Features
//!
//! - **Path index**: resolve `"HIVE/Key/SubKey"` paths to node chains,
//!   creating missing ancestors and reusing existing ones.
//! - **Expand on demand**: nodes start out `Unknown` (shown as expandable
//!   without fetching anything) and load one level at a time.
//! - **One fetch per node**: concurrent expansions of the same node share
//!   a single transport request; loaded nodes answer from the cache.
//! - **Root discovery**: ask the remote side for its top-level keys with
//!   [`CacheHandle::load_roots`], or register them by hand.
//! - **Stale-safe merging**: late or duplicate listings are dropped, and
//!   invalidation cancels anyone still waiting.
//! - **Single owner**: the tree lives in one tokio task; everything else
//!   holds a cloneable [`CacheHandle`] and receives read-only snapshots.
//!
//! The cache does no I/O of its own. Plug in a [`Transport`] that sends
//! "list children of P" to the remote side and reports back through the
//! [`Responder`] it is given.
//!
//! ## Example
//!
//! ```no_run
//! use hivemirror::{CacheHandle, ChildDescriptor, ListRequest, Payload, Responder};
//!
//! # async fn example() -> hivemirror::Result<()> {
//! let cache = CacheHandle::spawn(|request: ListRequest, responder: Responder| {
//!     tokio::spawn(async move {
//!         // Ask the remote host for the subkeys of `request.path` here.
//!         let subkeys = vec![ChildDescriptor::named("Software")];
//!         let _ = responder.children(subkeys).await;
//!     });
//! });
//!
//! cache
//!     .register_root("HKEY_LOCAL_MACHINE", Payload::root("HKLM"))
//!     .await?;
//! for key in cache.expand("HKEY_LOCAL_MACHINE").await? {
//!     println!("{}", key.full_path);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod transport;
pub mod tree;

// Re-export commonly used types
pub use cache::{CacheBuilder, CacheConfig, CacheHandle, FetchHandle, FetchOutcome};
pub use error::{Result, TreeError};
pub use transport::{ListRequest, RequestToken, Responder, Transport};
pub use tree::{
    ChildDescriptor, LoadState, Node, NodeSnapshot, PathIndex, Payload, Resolution,
    RootDescriptor, ValueEntry, ValueSet,
};
