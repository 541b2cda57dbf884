//! Cache configuration.

use crate::cache::actor::{CacheActor, CacheHandle};
use crate::transport::Transport;
use crate::tree::DEFAULT_MAX_DEPTH;

/// Default capacity of the command channel into the cache task.
pub const DEFAULT_COMMAND_BUFFER: usize = 64;

/// Tunables for a cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Commands (including transport deliveries) that may queue before
    /// senders wait.
    pub command_buffer: usize,
    /// Deepest path, in segments, the cache will accept.
    pub max_depth: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            command_buffer: DEFAULT_COMMAND_BUFFER,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Builder for spawning a configured cache.
///
/// # Example
/// ```no_run
/// use hivemirror::{CacheBuilder, ListRequest, Responder};
///
/// # async fn example() {
/// let cache = CacheBuilder::new()
///     .command_buffer(256)
///     .max_depth(64)
///     .spawn(|_request: ListRequest, responder: Responder| {
///         tokio::spawn(async move {
///             let _ = responder.children(Vec::new()).await;
///         });
///     });
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheBuilder {
    config: CacheConfig,
}

impl CacheBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command_buffer(mut self, capacity: usize) -> Self {
        self.config.command_buffer = capacity.max(1);
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth.max(1);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Start the cache task on the current tokio runtime.
    pub fn spawn<T: Transport>(self, transport: T) -> CacheHandle {
        CacheActor::spawn(self.config, Box::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.command_buffer, 64);
        assert_eq!(config.max_depth, 512);
    }

    #[test]
    fn test_builder_clamps_zero() {
        let builder = CacheBuilder::new().command_buffer(0).max_depth(0);
        assert_eq!(builder.config().command_buffer, 1);
        assert_eq!(builder.config().max_depth, 1);

        let builder = CacheBuilder::new().command_buffer(8).max_depth(16);
        assert_eq!(
            *builder.config(),
            CacheConfig {
                command_buffer: 8,
                max_depth: 16,
            }
        );
    }
}
