//! Contract with the component that talks to the remote host.
//!
//! The cache never performs I/O itself. When a node needs its children it
//! hands a [`ListRequest`] to a [`Transport`] together with a [`Responder`];
//! the transport answers later, from wherever its own work runs, through
//! that responder.

use std::fmt;

use tokio::sync::mpsc;

use crate::cache::actor::{CacheCommand, CacheHandle};
use crate::error::{Result, TreeError};
use crate::tree::ChildDescriptor;

/// Identifies one listing request issued by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(pub(crate) u64);

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// "List the children of `path`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub token: RequestToken,
    /// Normalized full path of the node being expanded; empty when the
    /// top-level keys themselves are being listed
    pub path: String,
}

impl ListRequest {
    /// Whether this request lists the top-level keys.
    pub fn is_roots(&self) -> bool {
        self.path.is_empty()
    }
}

/// Sends listing requests to the remote side.
///
/// Called from inside the cache's owning task, so implementations must
/// not block: queue the work or spawn a task, and report back through the
/// [`Responder`].
pub trait Transport: Send + 'static {
    /// Start fetching the children named by `request`.
    fn list_children(&mut self, request: ListRequest, responder: Responder);

    /// Best-effort cancellation of a request the cache no longer wants.
    ///
    /// Any answer that still arrives for `token` is dropped as stale.
    fn cancel(&mut self, _token: RequestToken) {}
}

impl<F> Transport for F
where
    F: FnMut(ListRequest, Responder) + Send + 'static,
{
    fn list_children(&mut self, request: ListRequest, responder: Responder) {
        self(request, responder)
    }
}

/// Delivers the answer to one [`ListRequest`] back to the cache.
///
/// Holds only a weak reference to the cache, so a transport sitting on
/// unanswered responders does not keep a shut-down cache alive.
#[derive(Debug, Clone)]
pub struct Responder {
    tx: mpsc::WeakSender<CacheCommand>,
    request: ListRequest,
}

impl Responder {
    pub(crate) fn new(tx: mpsc::WeakSender<CacheCommand>, request: ListRequest) -> Self {
        Self { tx, request }
    }

    pub fn token(&self) -> RequestToken {
        self.request.token
    }

    pub fn path(&self) -> &str {
        &self.request.path
    }

    fn handle(&self) -> Result<CacheHandle> {
        self.tx
            .upgrade()
            .map(CacheHandle::from_sender)
            .ok_or(TreeError::ActorStopped)
    }

    /// Report the children of the requested node, in display order.
    ///
    /// Returns `StaleResponse` if the cache stopped waiting for this
    /// request; transports can normally ignore that.
    pub async fn children(self, children: Vec<ChildDescriptor>) -> Result<()> {
        let handle = self.handle()?;
        if self.request.is_roots() {
            return handle.apply_roots(self.request.token, children).await;
        }
        handle
            .apply_children(&self.request.path, self.request.token, children)
            .await
    }

    /// Report that the remote listing failed.
    pub async fn fail(self, reason: impl Into<String>) -> Result<()> {
        let handle = self.handle()?;
        if self.request.is_roots() {
            return handle.fail_roots(self.request.token, reason).await;
        }
        handle
            .fail_fetch(&self.request.path, self.request.token, reason)
            .await
    }
}
