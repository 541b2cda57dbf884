//! Actor that owns the mirrored tree.
//!
//! All tree state lives in one tokio task. Callers and transports talk to
//! it through [`CacheHandle`], so expansion requests and listing deliveries
//! are applied strictly one at a time.

use std::collections::HashSet;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::cache::config::CacheConfig;
use crate::cache::core::TreeCache;
use crate::cache::handle::FetchHandle;
use crate::error::{Result, TreeError};
use crate::transport::{ListRequest, RequestToken, Responder, Transport};
use crate::tree::{ChildDescriptor, NodeSnapshot, Payload, normalize_path};

/// Cloneable handle to a running cache.
///
/// The cache task runs for as long as any handle is alive. Transports only
/// hold weak references, so once the last handle is dropped the task stops:
/// waiting [`FetchHandle`]s resolve as `Cancelled` and late answers get
/// `ActorStopped`.
#[derive(Clone, Debug)]
pub struct CacheHandle {
    tx: mpsc::Sender<CacheCommand>,
}

#[derive(Debug)]
pub(crate) enum CacheCommand {
    RegisterRoot {
        identifier: String,
        payload: Payload,
        reply: oneshot::Sender<Result<NodeSnapshot>>,
    },
    RequestExpand {
        path: String,
        reply: oneshot::Sender<Result<FetchHandle>>,
    },
    RequestRoots {
        reply: oneshot::Sender<Result<FetchHandle>>,
    },
    ApplyRoots {
        token: RequestToken,
        children: Vec<ChildDescriptor>,
        reply: oneshot::Sender<Result<()>>,
    },
    FailRoots {
        token: RequestToken,
        reason: String,
        reply: oneshot::Sender<Result<()>>,
    },
    ApplyChildren {
        path: String,
        token: RequestToken,
        children: Vec<ChildDescriptor>,
        reply: oneshot::Sender<Result<()>>,
    },
    FailFetch {
        path: String,
        token: RequestToken,
        reason: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Invalidate {
        path: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SetPayload {
        path: String,
        payload: Payload,
        reply: oneshot::Sender<Result<()>>,
    },
    ResolveOrCreate {
        path: String,
        reply: oneshot::Sender<Result<Option<NodeSnapshot>>>,
    },
    AddKey {
        path: String,
        payload: Payload,
        reply: oneshot::Sender<Result<NodeSnapshot>>,
    },
    Snapshot {
        path: String,
        reply: oneshot::Sender<Result<Option<NodeSnapshot>>>,
    },
    Children {
        path: String,
        reply: oneshot::Sender<Result<Vec<NodeSnapshot>>>,
    },
    Roots {
        reply: oneshot::Sender<Result<Vec<NodeSnapshot>>>,
    },
    VisibleRows {
        expanded: HashSet<String>,
        reply: oneshot::Sender<Result<Vec<(usize, NodeSnapshot)>>>,
    },
    DumpJson {
        reply: oneshot::Sender<Result<String>>,
    },
    Clear {
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct CacheActor {
    cache: TreeCache,
    transport: Box<dyn Transport>,
    rx: mpsc::Receiver<CacheCommand>,
    weak_tx: mpsc::WeakSender<CacheCommand>,
}

impl CacheHandle {
    /// Start a cache with default settings on the current tokio runtime.
    pub fn spawn<T: Transport>(transport: T) -> Self {
        CacheActor::spawn(CacheConfig::default(), Box::new(transport))
    }

    pub(crate) fn from_sender(tx: mpsc::Sender<CacheCommand>) -> Self {
        Self { tx }
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<R>>) -> CacheCommand,
    ) -> Result<R> {
        let (tx, rx) = oneshot::channel();
        let cmd = build(tx);
        self.tx
            .send(cmd)
            .await
            .map_err(|_| TreeError::ActorStopped)?;
        rx.await.map_err(|_| TreeError::ActorStopped)?
    }

    /// Register a top-level node, or return the existing one.
    pub async fn register_root(&self, identifier: &str, payload: Payload) -> Result<NodeSnapshot> {
        self.request(|reply| CacheCommand::RegisterRoot {
            identifier: identifier.to_string(),
            payload,
            reply,
        })
        .await
    }

    /// Ask for the children of `path`.
    ///
    /// A loaded node answers from the cache; an unknown one issues exactly
    /// one transport request; a pending one shares the fetch already in
    /// flight.
    pub async fn request_expand(&self, path: &str) -> Result<FetchHandle> {
        self.request(|reply| CacheCommand::RequestExpand {
            path: path.to_string(),
            reply,
        })
        .await
    }

    /// Expand `path` and wait for its children.
    ///
    /// # Example
    /// ```no_run
    /// # use hivemirror::{CacheHandle, Payload};
    /// # async fn example(cache: CacheHandle) -> hivemirror::Result<()> {
    /// cache.register_root("HKEY_CURRENT_USER", Payload::root("HKCU")).await?;
    /// for key in cache.expand("HKEY_CURRENT_USER").await? {
    ///     println!("{} ({})", key.name, if key.expandable { "+" } else { " " });
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn expand(&self, path: &str) -> Result<Vec<NodeSnapshot>> {
        self.request_expand(path).await?.children().await
    }

    /// Ask the remote side for its top-level keys.
    ///
    /// Coalesces like [`request_expand`](Self::request_expand): one
    /// transport request with an empty path, shared by every caller until
    /// it is answered.
    pub async fn request_roots(&self) -> Result<FetchHandle> {
        self.request(|reply| CacheCommand::RequestRoots { reply }).await
    }

    /// Discover the top-level keys and wait for them.
    pub async fn load_roots(&self) -> Result<Vec<NodeSnapshot>> {
        self.request_roots().await?.children().await
    }

    /// Deliver the listing of top-level keys; each is registered as a root.
    pub async fn apply_roots(
        &self,
        token: RequestToken,
        children: Vec<ChildDescriptor>,
    ) -> Result<()> {
        self.request(|reply| CacheCommand::ApplyRoots {
            token,
            children,
            reply,
        })
        .await
    }

    /// Report that listing the top-level keys failed.
    pub async fn fail_roots(&self, token: RequestToken, reason: impl Into<String>) -> Result<()> {
        self.request(|reply| CacheCommand::FailRoots {
            token,
            reason: reason.into(),
            reply,
        })
        .await
    }

    /// Deliver a listing for a pending node.
    ///
    /// Fails with `StaleResponse`, leaving the tree untouched, when `token`
    /// is not the node's current fetch.
    pub async fn apply_children(
        &self,
        path: &str,
        token: RequestToken,
        children: Vec<ChildDescriptor>,
    ) -> Result<()> {
        self.request(|reply| CacheCommand::ApplyChildren {
            path: path.to_string(),
            token,
            children,
            reply,
        })
        .await
    }

    /// Report that the listing for a pending node failed.
    pub async fn fail_fetch(
        &self,
        path: &str,
        token: RequestToken,
        reason: impl Into<String>,
    ) -> Result<()> {
        self.request(|reply| CacheCommand::FailFetch {
            path: path.to_string(),
            token,
            reason: reason.into(),
            reply,
        })
        .await
    }

    /// Forget the children of `path` and cancel any fetch below it.
    pub async fn invalidate(&self, path: &str) -> Result<()> {
        self.request(|reply| CacheCommand::Invalidate {
            path: path.to_string(),
            reply,
        })
        .await
    }

    pub async fn set_payload(&self, path: &str, payload: Payload) -> Result<()> {
        self.request(|reply| CacheCommand::SetPayload {
            path: path.to_string(),
            payload,
            reply,
        })
        .await
    }

    /// Create the node chain for `path` and return the leaf's parent, or
    /// `None` when the path names a root.
    pub async fn resolve_or_create(&self, path: &str) -> Result<Option<NodeSnapshot>> {
        self.request(|reply| CacheCommand::ResolveOrCreate {
            path: path.to_string(),
            reply,
        })
        .await
    }

    /// Insert a key discovered outside of normal expansion.
    pub async fn add_key(&self, path: &str, payload: Payload) -> Result<NodeSnapshot> {
        self.request(|reply| CacheCommand::AddKey {
            path: path.to_string(),
            payload,
            reply,
        })
        .await
    }

    pub async fn snapshot(&self, path: &str) -> Result<Option<NodeSnapshot>> {
        self.request(|reply| CacheCommand::Snapshot {
            path: path.to_string(),
            reply,
        })
        .await
    }

    /// Currently known children of `path`, without fetching.
    pub async fn children(&self, path: &str) -> Result<Vec<NodeSnapshot>> {
        self.request(|reply| CacheCommand::Children {
            path: path.to_string(),
            reply,
        })
        .await
    }

    pub async fn roots(&self) -> Result<Vec<NodeSnapshot>> {
        self.request(|reply| CacheCommand::Roots { reply }).await
    }

    /// Depth-annotated rows for a tree view, descending only into the
    /// paths in `expanded`.
    pub async fn visible_rows(
        &self,
        expanded: &HashSet<String>,
    ) -> Result<Vec<(usize, NodeSnapshot)>> {
        self.request(|reply| CacheCommand::VisibleRows {
            expanded: expanded.clone(),
            reply,
        })
        .await
    }

    /// Pretty-printed JSON of the whole mirrored tree.
    pub async fn dump_json(&self) -> Result<String> {
        self.request(|reply| CacheCommand::DumpJson { reply }).await
    }

    /// Drop every root, cancelling all fetches.
    pub async fn clear(&self) -> Result<()> {
        self.request(|reply| CacheCommand::Clear { reply }).await
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(CacheCommand::Shutdown { reply: tx }).await;
        let _ = rx.await;
    }
}

impl CacheActor {
    pub(crate) fn spawn(config: CacheConfig, transport: Box<dyn Transport>) -> CacheHandle {
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let actor = CacheActor {
            cache: TreeCache::new(&config),
            transport,
            rx,
            weak_tx: tx.downgrade(),
        };
        tokio::spawn(actor.run());
        CacheHandle { tx }
    }

    async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            if self.handle_command(cmd) {
                break;
            }
        }
        let tokens = self.cache.clear();
        self.cancel_transport(tokens);
        debug!("cache actor stopped");
    }

    /// Hand a new request to the transport.
    fn dispatch(&mut self, request: ListRequest) {
        let responder = Responder::new(self.weak_tx.clone(), request.clone());
        self.transport.list_children(request, responder);
    }

    fn cancel_transport(&mut self, tokens: Vec<RequestToken>) {
        for token in tokens {
            self.transport.cancel(token);
        }
    }

    fn handle_command(&mut self, cmd: CacheCommand) -> bool {
        match cmd {
            CacheCommand::RegisterRoot {
                identifier,
                payload,
                reply,
            } => {
                let res = self.cache.register_root(&identifier, payload);
                let _ = reply.send(res);
            }
            CacheCommand::RequestExpand { path, reply } => {
                let (tx, rx) = oneshot::channel();
                let res = self.cache.request_expand(&path, tx).map(|request| {
                    if let Some(request) = request {
                        self.dispatch(request);
                    }
                    FetchHandle::new(normalize_path(&path), rx)
                });
                let _ = reply.send(res);
            }
            CacheCommand::RequestRoots { reply } => {
                let (tx, rx) = oneshot::channel();
                if let Some(request) = self.cache.request_roots(tx) {
                    self.dispatch(request);
                }
                let _ = reply.send(Ok(FetchHandle::new(String::new(), rx)));
            }
            CacheCommand::ApplyRoots {
                token,
                children,
                reply,
            } => {
                let res = self.cache.apply_roots(token, children);
                let _ = reply.send(res);
            }
            CacheCommand::FailRoots {
                token,
                reason,
                reply,
            } => {
                let res = self.cache.fail_roots(token, reason);
                let _ = reply.send(res);
            }
            CacheCommand::ApplyChildren {
                path,
                token,
                children,
                reply,
            } => {
                let res = self
                    .cache
                    .apply_children(&path, token, children)
                    .map(|cancelled| self.cancel_transport(cancelled));
                let _ = reply.send(res);
            }
            CacheCommand::FailFetch {
                path,
                token,
                reason,
                reply,
            } => {
                let res = self.cache.fail_fetch(&path, token, reason);
                let _ = reply.send(res);
            }
            CacheCommand::Invalidate { path, reply } => {
                let res = self
                    .cache
                    .invalidate(&path)
                    .map(|cancelled| self.cancel_transport(cancelled));
                let _ = reply.send(res);
            }
            CacheCommand::SetPayload {
                path,
                payload,
                reply,
            } => {
                let res = self.cache.set_payload(&path, payload);
                let _ = reply.send(res);
            }
            CacheCommand::ResolveOrCreate { path, reply } => {
                let res = self.cache.resolve_or_create(&path);
                let _ = reply.send(res);
            }
            CacheCommand::AddKey {
                path,
                payload,
                reply,
            } => {
                let res = self.cache.add_key(&path, payload);
                let _ = reply.send(res);
            }
            CacheCommand::Snapshot { path, reply } => {
                let res = self.cache.snapshot(&path);
                let _ = reply.send(res);
            }
            CacheCommand::Children { path, reply } => {
                let res = self.cache.children(&path);
                let _ = reply.send(res);
            }
            CacheCommand::Roots { reply } => {
                let _ = reply.send(Ok(self.cache.roots()));
            }
            CacheCommand::VisibleRows { expanded, reply } => {
                let _ = reply.send(Ok(self.cache.visible_rows(&expanded)));
            }
            CacheCommand::DumpJson { reply } => {
                let res = self.cache.dump_json();
                let _ = reply.send(res);
            }
            CacheCommand::Clear { reply } => {
                let tokens = self.cache.clear();
                self.cancel_transport(tokens);
                let _ = reply.send(Ok(()));
            }
            CacheCommand::Shutdown { reply } => {
                let _ = reply.send(());
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::cache::handle::FetchOutcome;
    use crate::cache::config::CacheBuilder;
    use crate::tree::LoadState;

    /// Transport that records requests and never answers on its own.
    #[derive(Clone, Default)]
    struct RecordingTransport {
        requests: Arc<Mutex<Vec<ListRequest>>>,
        cancelled: Arc<Mutex<Vec<RequestToken>>>,
    }

    impl RecordingTransport {
        fn requests(&self) -> Vec<ListRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn cancelled(&self) -> Vec<RequestToken> {
            self.cancelled.lock().unwrap().clone()
        }
    }

    impl Transport for RecordingTransport {
        fn list_children(&mut self, request: ListRequest, _responder: Responder) {
            self.requests.lock().unwrap().push(request);
        }

        fn cancel(&mut self, token: RequestToken) {
            self.cancelled.lock().unwrap().push(token);
        }
    }

    fn names(children: &[NodeSnapshot]) -> Vec<&str> {
        children.iter().map(|c| c.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_concurrent_expands_share_one_request() {
        let transport = RecordingTransport::default();
        let cache = CacheHandle::spawn(transport.clone());
        cache.register_root("HKLM", Payload::root("HKLM")).await.unwrap();

        let first = cache.request_expand("HKLM").await.unwrap();
        let second = cache.request_expand("HKLM").await.unwrap();
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);

        cache
            .apply_children(
                "HKLM",
                requests[0].token,
                vec![ChildDescriptor::named("SOFTWARE"), ChildDescriptor::named("SYSTEM")],
            )
            .await
            .unwrap();

        let (a, b) = futures::join!(first, second);
        assert_eq!(a, b);
        match a {
            FetchOutcome::Loaded(children) => {
                assert_eq!(names(&children), vec!["SOFTWARE", "SYSTEM"])
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_loaded_node_makes_no_transport_call() {
        let transport = RecordingTransport::default();
        let cache = CacheHandle::spawn(transport.clone());
        cache.register_root("HKU", Payload::Absent).await.unwrap();

        let handle = cache.request_expand("HKU").await.unwrap();
        let token = transport.requests()[0].token;
        cache.apply_children("HKU", token, Vec::new()).await.unwrap();
        assert_eq!(handle.await, FetchOutcome::Loaded(Vec::new()));

        for _ in 0..3 {
            assert!(cache.expand("HKU").await.unwrap().is_empty());
        }
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_response_leaves_tree_unchanged() {
        let transport = RecordingTransport::default();
        let cache = CacheHandle::spawn(transport.clone());
        cache.register_root("HKCR", Payload::Absent).await.unwrap();
        let handle = cache.request_expand("HKCR").await.unwrap();
        let token = transport.requests()[0].token;
        cache
            .apply_children("HKCR", token, vec![ChildDescriptor::named(".txt")])
            .await
            .unwrap();
        handle.await;

        let err = cache
            .apply_children("HKCR", token, vec![ChildDescriptor::named(".exe")])
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::StaleResponse { .. }));
        assert_eq!(names(&cache.children("HKCR").await.unwrap()), vec![".txt"]);
    }

    #[tokio::test]
    async fn test_invalidate_pending_cancels_handle() {
        let transport = RecordingTransport::default();
        let cache = CacheHandle::spawn(transport.clone());
        cache.register_root("HKCC", Payload::Absent).await.unwrap();
        let handle = cache.request_expand("HKCC").await.unwrap();
        let token = transport.requests()[0].token;

        cache.invalidate("HKCC").await.unwrap();
        assert_eq!(handle.await, FetchOutcome::Cancelled);
        assert_eq!(transport.cancelled(), vec![token]);

        let late = cache
            .apply_children("HKCC", token, vec![ChildDescriptor::named("System")])
            .await;
        assert!(matches!(late, Err(TreeError::StaleResponse { .. })));
        let snap = cache.snapshot("HKCC").await.unwrap().unwrap();
        assert_eq!(snap.load_state, LoadState::Unknown);
        assert_eq!(snap.child_count, 0);
    }

    #[tokio::test]
    async fn test_transport_failure_allows_retry() {
        let transport = RecordingTransport::default();
        let cache = CacheHandle::spawn(transport.clone());
        cache.register_root("HKLM", Payload::Absent).await.unwrap();

        let handle = cache.request_expand("HKLM").await.unwrap();
        let token = transport.requests()[0].token;
        cache.fail_fetch("HKLM", token, "client disconnected").await.unwrap();
        let err = handle.children().await.unwrap_err();
        assert!(matches!(err, TreeError::TransportFailure { .. }));

        let _retry = cache.request_expand("HKLM").await.unwrap();
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_responder_round_trip() {
        let cache = CacheHandle::spawn(|request: ListRequest, responder: Responder| {
            tokio::spawn(async move {
                let children = match request.path.as_str() {
                    "HKEY_LOCAL_MACHINE" => vec![ChildDescriptor::named("Software")],
                    "HKEY_LOCAL_MACHINE/Software" => vec![
                        ChildDescriptor::named("Vendor"),
                        ChildDescriptor::named("Classes"),
                    ],
                    _ => Vec::new(),
                };
                let _ = responder.children(children).await;
            });
        });

        cache
            .register_root("HKEY_LOCAL_MACHINE", Payload::root("HKLM"))
            .await
            .unwrap();
        let parent = cache
            .resolve_or_create("HKEY_LOCAL_MACHINE/Software/Vendor")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parent.name, "Software");

        let top = cache.expand("HKEY_LOCAL_MACHINE").await.unwrap();
        assert_eq!(names(&top), vec!["Software"]);
        let software = cache.expand("HKEY_LOCAL_MACHINE/Software").await.unwrap();
        assert_eq!(names(&software), vec!["Vendor", "Classes"]);

        let roots = cache.roots().await.unwrap();
        assert_eq!(roots.len(), 1);
        let expanded: HashSet<String> = ["HKEY_LOCAL_MACHINE", "HKEY_LOCAL_MACHINE/Software"]
            .into_iter()
            .map(String::from)
            .collect();
        let rows: Vec<(usize, String)> = cache
            .visible_rows(&expanded)
            .await
            .unwrap()
            .into_iter()
            .map(|(depth, node)| (depth, node.name))
            .collect();
        assert_eq!(
            rows,
            vec![
                (0, "HKEY_LOCAL_MACHINE".to_string()),
                (1, "Software".to_string()),
                (2, "Vendor".to_string()),
                (2, "Classes".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_responder_after_shutdown_reports_stopped() {
        let parked: Arc<Mutex<Vec<Responder>>> = Arc::default();
        let sink = parked.clone();
        let cache = CacheBuilder::new()
            .command_buffer(4)
            .spawn(move |_request: ListRequest, responder: Responder| {
                sink.lock().unwrap().push(responder);
            });
        cache.register_root("HKU", Payload::Absent).await.unwrap();
        let handle = cache.request_expand("HKU").await.unwrap();

        cache.shutdown().await;
        assert_eq!(handle.await, FetchOutcome::Cancelled);

        let responder = parked.lock().unwrap().pop().unwrap();
        assert_eq!(responder.path(), "HKU");
        let res = responder.children(Vec::new()).await;
        assert!(matches!(res, Err(TreeError::ActorStopped)));
        assert!(matches!(cache.roots().await, Err(TreeError::ActorStopped)));
    }

    #[tokio::test]
    async fn test_invalid_and_unknown_paths() {
        let cache = CacheHandle::spawn(RecordingTransport::default());
        assert!(matches!(
            cache.resolve_or_create("///").await,
            Err(TreeError::InvalidPath(_))
        ));
        assert!(matches!(
            cache.request_expand("   ").await,
            Err(TreeError::InvalidPath(_))
        ));
        assert!(matches!(
            cache.request_expand("HKEY_NOWHERE").await,
            Err(TreeError::UnknownNode(_))
        ));
        assert_eq!(cache.resolve_or_create("HKEY_USERS").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_cancels_pending() {
        let transport = RecordingTransport::default();
        let cache = CacheHandle::spawn(transport.clone());
        cache.register_root("A", Payload::Absent).await.unwrap();
        let handle = cache.request_expand("A").await.unwrap();

        cache.clear().await.unwrap();
        assert_eq!(handle.await, FetchOutcome::Cancelled);
        assert_eq!(transport.cancelled().len(), 1);
        assert!(cache.roots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_root_discovery_shares_one_request() {
        let transport = RecordingTransport::default();
        let cache = CacheHandle::spawn(transport.clone());

        let first = cache.request_roots().await.unwrap();
        let second = cache.request_roots().await.unwrap();
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].is_roots());

        cache
            .apply_roots(
                requests[0].token,
                vec![
                    ChildDescriptor::named("HKEY_CLASSES_ROOT"),
                    ChildDescriptor::named("HKEY_LOCAL_MACHINE"),
                ],
            )
            .await
            .unwrap();
        let (a, b) = futures::join!(first, second);
        assert_eq!(a, b);

        let roots = cache.load_roots().await.unwrap();
        assert_eq!(names(&roots), vec!["HKEY_CLASSES_ROOT", "HKEY_LOCAL_MACHINE"]);
        assert_eq!(transport.requests().len(), 1);

        let late = cache.apply_roots(requests[0].token, Vec::new()).await;
        assert!(matches!(late, Err(TreeError::StaleResponse { .. })));

        // Discovered roots expand like any other node.
        let _handle = cache.request_expand("HKEY_LOCAL_MACHINE").await.unwrap();
        assert_eq!(transport.requests()[1].path, "HKEY_LOCAL_MACHINE");
    }

    #[tokio::test]
    async fn test_root_discovery_through_responder() {
        let cache = CacheHandle::spawn(|request: ListRequest, responder: Responder| {
            tokio::spawn(async move {
                let _ = if request.is_roots() {
                    responder
                        .children(vec![
                            ChildDescriptor::named("HKEY_CURRENT_USER"),
                            ChildDescriptor::named("HKEY_USERS"),
                        ])
                        .await
                } else {
                    responder.fail("remote registry unavailable").await
                };
            });
        });

        let roots = cache.load_roots().await.unwrap();
        assert_eq!(names(&roots), vec!["HKEY_CURRENT_USER", "HKEY_USERS"]);
        assert_eq!(roots[1].payload, Payload::root("HKEY_USERS"));
        assert_eq!(cache.roots().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_responder_failure_reverts_node() {
        let cache = CacheHandle::spawn(|_request: ListRequest, responder: Responder| {
            tokio::spawn(async move {
                let _ = responder.fail("access denied").await;
            });
        });
        cache.register_root("HKEY_LOCAL_MACHINE", Payload::Absent).await.unwrap();

        let err = cache.expand("HKEY_LOCAL_MACHINE").await.unwrap_err();
        match err {
            TreeError::TransportFailure { path, reason } => {
                assert_eq!(path, "HKEY_LOCAL_MACHINE");
                assert_eq!(reason, "access denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let snap = cache.snapshot("HKEY_LOCAL_MACHINE").await.unwrap().unwrap();
        assert_eq!(snap.load_state, LoadState::Unknown);
        assert!(snap.expandable);

        let err = cache.load_roots().await.unwrap_err();
        assert!(matches!(err, TreeError::TransportFailure { .. }));
    }

    #[tokio::test]
    async fn test_dropping_last_handle_stops_cache() {
        let parked: Arc<Mutex<Vec<Responder>>> = Arc::default();
        let sink = parked.clone();
        let cache = CacheHandle::spawn(move |_request: ListRequest, responder: Responder| {
            sink.lock().unwrap().push(responder);
        });
        cache.register_root("HKU", Payload::Absent).await.unwrap();
        let handle = cache.request_expand("HKU").await.unwrap();

        drop(cache);
        assert_eq!(handle.await, FetchOutcome::Cancelled);

        let responder = parked.lock().unwrap().pop().unwrap();
        let res = responder.children(vec![ChildDescriptor::named("S-1-5-18")]).await;
        assert!(matches!(res, Err(TreeError::ActorStopped)));
    }
}
