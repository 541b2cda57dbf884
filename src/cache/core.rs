//! Fetch-state machine over the path index.
//!
//! `TreeCache` is synchronous and owned by exactly one task (see
//! [`crate::cache::actor`]). It tracks which nodes have a listing in
//! flight, who is waiting on each one, and merges listings into the tree.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::cache::config::CacheConfig;
use crate::cache::handle::FetchOutcome;
use crate::error::{Result, TreeError};
use crate::transport::{ListRequest, RequestToken};
use crate::tree::path::{SEPARATOR, parse_path, split_path};
use crate::tree::{ChildDescriptor, LoadState, Node, NodeSnapshot, PathIndex, Payload};

pub(crate) type Waiter = oneshot::Sender<FetchOutcome>;

/// In-flight key of the root listing; no node path is empty.
const ROOTS_KEY: &str = "";

/// The one outstanding fetch of a node.
struct Inflight {
    token: RequestToken,
    waiters: Vec<Waiter>,
}

pub(crate) struct TreeCache {
    index: PathIndex,
    inflight: HashMap<String, Inflight>,
    roots_state: LoadState,
    last_token: u64,
}

impl TreeCache {
    pub(crate) fn new(config: &CacheConfig) -> Self {
        Self {
            index: PathIndex::with_max_depth(config.max_depth),
            inflight: HashMap::new(),
            roots_state: LoadState::Unknown,
            last_token: 0,
        }
    }

    /// Validate and normalize a path into its key form.
    fn key(&self, path: &str) -> Result<String> {
        Ok(parse_path(path, self.index.max_depth())?.join("/"))
    }

    fn node(&self, key: &str) -> Result<&Node> {
        self.index
            .get(key)
            .ok_or_else(|| TreeError::UnknownNode(key.to_string()))
    }

    fn node_mut(&mut self, key: &str) -> Result<&mut Node> {
        self.index
            .get_mut(key)
            .ok_or_else(|| TreeError::UnknownNode(key.to_string()))
    }

    fn load_state(&self, key: &str) -> Option<LoadState> {
        if key == ROOTS_KEY {
            Some(self.roots_state)
        } else {
            self.index.get(key).map(|n| n.load_state)
        }
    }

    fn next_token(&mut self) -> RequestToken {
        self.last_token += 1;
        RequestToken(self.last_token)
    }

    #[cfg(test)]
    pub(crate) fn index(&self) -> &PathIndex {
        &self.index
    }

    #[cfg(test)]
    pub(crate) fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    pub(crate) fn register_root(
        &mut self,
        identifier: &str,
        payload: Payload,
    ) -> Result<NodeSnapshot> {
        Ok(self.index.register_root(identifier, payload)?.snapshot())
    }

    /// Start (or join) the expansion of `path`.
    ///
    /// The waiter is resolved immediately for a loaded node, queued behind
    /// the in-flight fetch for a pending one, and otherwise a new request is
    /// returned for the caller to hand to the transport.
    pub(crate) fn request_expand(
        &mut self,
        path: &str,
        waiter: Waiter,
    ) -> Result<Option<ListRequest>> {
        let key = self.key(path)?;
        let state = self.node(&key)?.load_state;
        match state {
            LoadState::Loaded => {
                let children = self.children(&key)?;
                let _ = waiter.send(FetchOutcome::Loaded(children));
                Ok(None)
            }
            LoadState::Pending | LoadState::Unknown => {
                let request = self.join_or_start(key, waiter);
                if let Some(request) = &request {
                    self.node_mut(&request.path)?.load_state = LoadState::Pending;
                }
                Ok(request)
            }
        }
    }

    /// Start (or join) the listing of the top-level keys.
    pub(crate) fn request_roots(&mut self, waiter: Waiter) -> Option<ListRequest> {
        if self.roots_state == LoadState::Loaded {
            let _ = waiter.send(FetchOutcome::Loaded(self.roots()));
            return None;
        }
        let request = self.join_or_start(ROOTS_KEY.to_string(), waiter);
        if request.is_some() {
            self.roots_state = LoadState::Pending;
        }
        request
    }

    /// Queue `waiter` behind the fetch of `key`, issuing a new request if
    /// none is in flight.
    fn join_or_start(&mut self, key: String, waiter: Waiter) -> Option<ListRequest> {
        if let Some(inflight) = self.inflight.get_mut(&key) {
            debug!(path = %key, token = %inflight.token, "joining in-flight fetch");
            inflight.waiters.push(waiter);
            return None;
        }
        let token = self.next_token();
        self.inflight.insert(
            key.clone(),
            Inflight {
                token,
                waiters: vec![waiter],
            },
        );
        debug!(path = %key, %token, "requesting children");
        Some(ListRequest { token, path: key })
    }

    /// Check that `token` is the current fetch of `key`.
    fn check_current(&self, key: &str, token: RequestToken) -> Result<()> {
        let current = self.inflight.get(key).map(|f| f.token);
        let pending = self.load_state(key) == Some(LoadState::Pending);
        if current == Some(token) && pending {
            Ok(())
        } else {
            debug!(path = %key, %token, "dropping stale response");
            Err(TreeError::StaleResponse {
                path: key.to_string(),
                token,
            })
        }
    }

    fn resolve_waiters(&mut self, key: &str, outcome: FetchOutcome) {
        if let Some(inflight) = self.inflight.remove(key) {
            for waiter in inflight.waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
    }

    /// Merge a listing into the node it was requested for.
    ///
    /// Returns the tokens of fetches cancelled because their nodes were
    /// absent from the listing.
    pub(crate) fn apply_children(
        &mut self,
        path: &str,
        token: RequestToken,
        descriptors: Vec<ChildDescriptor>,
    ) -> Result<Vec<RequestToken>> {
        let key = self.key(path)?;
        self.check_current(&key, token)?;

        let descriptors = if split_path(&key).len() >= self.index.max_depth() {
            if !descriptors.is_empty() {
                warn!(parent = %key, dropped = descriptors.len(), "children exceed max depth");
            }
            Vec::new()
        } else {
            filter_descriptors(&key, descriptors)
        };

        let node = self.node_mut(&key)?;
        let mut previous = std::mem::take(&mut node.children);
        let mut children = IndexMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let child = match previous.shift_remove(&descriptor.name) {
                Some(mut existing) => {
                    if !descriptor.payload.is_absent() {
                        existing.payload = descriptor.payload;
                    }
                    existing
                }
                None => Node::child(&key, &descriptor.name, descriptor.payload),
            };
            children.insert(descriptor.name, child);
        }
        node.children = children;
        node.load_state = LoadState::Loaded;
        let snapshots: Vec<NodeSnapshot> = node.children().map(Node::snapshot).collect();
        debug!(path = %key, %token, children = snapshots.len(), "children loaded");
        self.resolve_waiters(&key, FetchOutcome::Loaded(snapshots));

        let dropped = pending_paths(previous.values());
        Ok(self.cancel_paths(&dropped))
    }

    /// Register the delivered top-level keys, in delivery order.
    ///
    /// Roots missing from the listing are left alone.
    pub(crate) fn apply_roots(
        &mut self,
        token: RequestToken,
        descriptors: Vec<ChildDescriptor>,
    ) -> Result<()> {
        self.check_current(ROOTS_KEY, token)?;

        let mut snapshots = Vec::new();
        for descriptor in filter_descriptors(ROOTS_KEY, descriptors) {
            let payload = if descriptor.payload.is_absent() {
                Payload::root(descriptor.name.as_str())
            } else {
                descriptor.payload
            };
            match self.register_root(&descriptor.name, payload) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(name = ?descriptor.name, error = %e, "ignoring root"),
            }
        }
        self.roots_state = LoadState::Loaded;
        debug!(%token, roots = snapshots.len(), "roots loaded");
        self.resolve_waiters(ROOTS_KEY, FetchOutcome::Loaded(snapshots));
        Ok(())
    }

    /// Record a failed listing; the node becomes fetchable again.
    pub(crate) fn fail_fetch(
        &mut self,
        path: &str,
        token: RequestToken,
        reason: String,
    ) -> Result<()> {
        let key = self.key(path)?;
        self.check_current(&key, token)?;

        self.node_mut(&key)?.load_state = LoadState::Unknown;
        debug!(path = %key, %token, %reason, "fetch failed");
        self.resolve_waiters(&key, FetchOutcome::Failed(reason));
        Ok(())
    }

    pub(crate) fn fail_roots(&mut self, token: RequestToken, reason: String) -> Result<()> {
        self.check_current(ROOTS_KEY, token)?;

        self.roots_state = LoadState::Unknown;
        debug!(%token, %reason, "root listing failed");
        self.resolve_waiters(ROOTS_KEY, FetchOutcome::Failed(reason));
        Ok(())
    }

    /// Reset a node to `Unknown`, discarding its children.
    ///
    /// Returns the tokens of every fetch cancelled in the node's subtree.
    pub(crate) fn invalidate(&mut self, path: &str) -> Result<Vec<RequestToken>> {
        let key = self.key(path)?;
        let node = self.node_mut(&key)?;
        let was_pending = node.load_state == LoadState::Pending;
        let detached = std::mem::take(&mut node.children);
        node.load_state = LoadState::Unknown;

        let mut paths = pending_paths(detached.values());
        if was_pending {
            paths.push(key.clone());
        }
        debug!(path = %key, discarded = detached.len(), "invalidated");
        Ok(self.cancel_paths(&paths))
    }

    pub(crate) fn set_payload(&mut self, path: &str, payload: Payload) -> Result<()> {
        let key = self.key(path)?;
        self.node_mut(&key)?.payload = payload;
        Ok(())
    }

    /// Snapshot of the parent of the path's leaf, or `None` for a root.
    pub(crate) fn resolve_or_create(&mut self, path: &str) -> Result<Option<NodeSnapshot>> {
        let resolution = self.index.resolve_or_create(path)?;
        Ok(resolution.parent().map(|n| n.snapshot()))
    }

    /// Attach a key found out of band (a search hit, for example).
    ///
    /// Root-level paths go through root registration; anything deeper gets
    /// its ancestors created and the payload set on the leaf.
    pub(crate) fn add_key(&mut self, path: &str, payload: Payload) -> Result<NodeSnapshot> {
        let key = self.key(path)?;
        let is_root = self.index.resolve_or_create(&key)?.is_root();
        if is_root {
            return self.register_root(&key, payload);
        }

        let leaf = self.node_mut(&key)?;
        if !payload.is_absent() {
            leaf.payload = payload;
        }
        Ok(leaf.snapshot())
    }

    pub(crate) fn snapshot(&self, path: &str) -> Result<Option<NodeSnapshot>> {
        let key = self.key(path)?;
        Ok(self.index.get(&key).map(Node::snapshot))
    }

    pub(crate) fn children(&self, path: &str) -> Result<Vec<NodeSnapshot>> {
        let key = self.key(path)?;
        Ok(self.node(&key)?.children().map(Node::snapshot).collect())
    }

    pub(crate) fn roots(&self) -> Vec<NodeSnapshot> {
        self.index.roots().map(Node::snapshot).collect()
    }

    pub(crate) fn visible_rows(&self, expanded: &HashSet<String>) -> Vec<(usize, NodeSnapshot)> {
        self.index
            .visible_rows(expanded)
            .into_iter()
            .map(|(depth, node)| (depth, node.snapshot()))
            .collect()
    }

    /// Serialize every root with its known subtree.
    pub(crate) fn dump_json(&self) -> Result<String> {
        let roots: Vec<&Node> = self.index.roots().collect();
        Ok(serde_json::to_string_pretty(&roots)?)
    }

    /// Drop every root and cancel all fetches, the root listing included.
    pub(crate) fn clear(&mut self) -> Vec<RequestToken> {
        let paths: Vec<String> = self.inflight.keys().cloned().collect();
        let dropped = self.index.clear();
        self.roots_state = LoadState::Unknown;
        debug!(roots = dropped.len(), pending = paths.len(), "cleared tree");
        self.cancel_paths(&paths)
    }

    /// Resolve the waiters of the given paths as cancelled.
    fn cancel_paths(&mut self, paths: &[String]) -> Vec<RequestToken> {
        let mut tokens = Vec::new();
        for path in paths {
            if let Some(inflight) = self.inflight.remove(path) {
                debug!(%path, token = %inflight.token, "cancelling fetch");
                for waiter in inflight.waiters {
                    let _ = waiter.send(FetchOutcome::Cancelled);
                }
                tokens.push(inflight.token);
            }
        }
        tokens
    }
}

/// Full paths of every pending node in the given subtrees.
fn pending_paths<'a>(nodes: impl Iterator<Item = &'a Node>) -> Vec<String> {
    let mut paths = Vec::new();
    for node in nodes {
        node.walk(&mut |n| {
            if n.load_state == LoadState::Pending {
                paths.push(n.full_path.clone());
            }
        });
    }
    paths
}

/// Drop descriptors that cannot become nodes: empty names, names containing
/// the separator, and repeats of an earlier name. Whitespace is a valid name.
fn filter_descriptors(parent: &str, descriptors: Vec<ChildDescriptor>) -> Vec<ChildDescriptor> {
    let mut seen = HashSet::new();
    descriptors
        .into_iter()
        .filter(|d| {
            if d.name.is_empty() || d.name.contains(SEPARATOR) {
                warn!(%parent, name = ?d.name, "ignoring malformed child");
                return false;
            }
            if !seen.insert(d.name.clone()) {
                warn!(%parent, name = %d.name, "ignoring duplicate child");
                return false;
            }
            true
        })
        .collect()
}
