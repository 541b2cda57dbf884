//! Lazy, expand-on-demand cache over the path index.

pub mod actor;
mod config;
mod core;
mod handle;

pub use actor::CacheHandle;
pub use config::{CacheBuilder, CacheConfig, DEFAULT_COMMAND_BUFFER};
pub use handle::{FetchHandle, FetchOutcome};
