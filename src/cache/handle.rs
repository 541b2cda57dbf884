//! Futures returned by expansion requests.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::FutureExt;
use tokio::sync::oneshot;

use crate::error::{Result, TreeError};
use crate::tree::NodeSnapshot;

/// How a fetch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Children of the node, in delivery order.
    Loaded(Vec<NodeSnapshot>),
    /// The node was invalidated (or the cache shut down) before an answer
    /// arrived.
    Cancelled,
    /// The transport reported a failure; the node is fetchable again.
    Failed(String),
}

impl FetchOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, FetchOutcome::Loaded(_))
    }

    /// Convert into a `Result`, mapping cancellation and failure to errors.
    pub fn into_result(self, path: &str) -> Result<Vec<NodeSnapshot>> {
        match self {
            FetchOutcome::Loaded(children) => Ok(children),
            FetchOutcome::Cancelled => Err(TreeError::Cancelled),
            FetchOutcome::Failed(reason) => Err(TreeError::TransportFailure {
                path: path.to_string(),
                reason,
            }),
        }
    }
}

/// Pending (or already completed) child listing for one node.
///
/// Await it to get the [`FetchOutcome`]. Every caller that asked to expand
/// the same node while its fetch was in flight holds its own handle to the
/// same result. Dropping a handle only stops this caller from waiting; the
/// fetch itself carries on. Wrap the handle in `tokio::time::timeout` if a
/// deadline is needed.
#[derive(Debug)]
#[must_use = "a FetchHandle does nothing unless awaited"]
pub struct FetchHandle {
    path: String,
    rx: oneshot::Receiver<FetchOutcome>,
}

impl FetchHandle {
    pub(crate) fn new(path: String, rx: oneshot::Receiver<FetchOutcome>) -> Self {
        Self { path, rx }
    }

    /// Full path of the node being expanded.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the children, treating cancellation and failure as errors.
    pub async fn children(self) -> Result<Vec<NodeSnapshot>> {
        let path = self.path.clone();
        self.await.into_result(&path)
    }
}

impl Future for FetchHandle {
    type Output = FetchOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the owning cache went away.
        let outcome = ready!(self.rx.poll_unpin(cx)).unwrap_or(FetchOutcome::Cancelled);
        Poll::Ready(outcome)
    }
}
