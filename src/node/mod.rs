//! IPC node: the RPC correlator plus broadcast fan-out.
//!
//! # Architecture
//!
//! An [`IpcNode`] owns two background loops over its transport:
//!
//! - the *reply loop* subscribes to `rpc.<node>.reply` and resolves pending
//!   calls by correlation id; replies with no pending entry are discarded
//!   silently (duplicate or expired).
//! - the *request loop* subscribes to `rpc.<node>.request`, looks up the
//!   requested method, and runs the handler in a spawned task so a slow
//!   handler never stalls delivery of the next request. The reply (success
//!   or error) goes to the `reply_subject` carried in the request envelope.
//!
//! Each outgoing call registers a oneshot channel in the pending table under
//! a fresh correlation id. Resolution happens exactly once: reply,
//! cancellation, or timeout cleanup, whichever comes first.
//!
//! # Concurrency
//!
//! Any number of calls may be in flight; each has its own pending entry and
//! deadline. The pending table is behind a mutex, but critical sections are
//! just map insert/remove, so contention is minimal.

mod handler;
mod pending;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;

use crate::ipc_config::validate_node_id;
use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use crate::protocol::{
    broadcast_subject, reply_subject, request_subject, CallReply, CallRequest, FaultKind,
};
use crate::{
    // ---
    Address,
    CorrelationId,
    Envelope,
    IpcConfig,
    IpcError,
    Result,
    Subscription,
    SubscriptionHandle,
    TransportPtr,
};

use handler::{wrap_method, BoxedMethod};
use pending::{CallOutcome, PendingCalls};

/// Acquire a mutex guard, intentionally ignoring poisoning.
///
/// The protected state is a best-effort map (pending calls, method table,
/// broadcast tasks) with no invariants spanning multiple fields; the worst
/// outcome of a poisoned lock is a dropped or unmatched message. This also
/// avoids propagating non-`Send` poison errors across async boundaries.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

type MethodTable = Mutex<HashMap<String, BoxedMethod>>;
type BroadcastTasks = Mutex<HashMap<String, Vec<JoinHandle<()>>>>;

/// A node in the IPC mesh.
///
/// Registers methods, calls methods on other nodes, and publishes/consumes
/// broadcast channels — all over one shared transport. Cheap to clone
/// (internally `Arc`-backed); every node is full-duplex.
///
/// # Example
///
/// ```no_run
/// use mesh_ipc::{create_transport, IpcConfig, IpcNodeBuilder};
///
/// # async fn example() -> mesh_ipc::Result<()> {
/// let config = IpcConfig::memory("calc");
/// let transport = create_transport(&config).await?;
///
/// let calc = IpcNodeBuilder::new(transport.clone())
///     .node_id("calc")
///     .build()
///     .await?;
///
/// calc.register("add", |(a, b): (i64, i64)| async move { Ok(a + b) });
///
/// let caller = IpcNodeBuilder::new(transport).node_id("caller").build().await?;
/// let sum: i64 = caller.call("calc", "add", (2, 3)).await?;
/// assert_eq!(sum, 5);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct IpcNode {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    transport: TransportPtr,
    node_id: String,
    config: IpcConfig,

    /// Calls awaiting replies, keyed by correlation id.
    pending: Arc<Mutex<PendingCalls>>,

    /// Locally registered RPC methods.
    methods: Arc<MethodTable>,

    /// Delivery tasks per broadcast channel, for explicit unsubscription.
    broadcasts: BroadcastTasks,

    metrics: MetricsRegistry,

    /// Background loop handles. Kept so the tasks are not detached-and-lost;
    /// both exit on their own once the transport closes.
    _reply_task: JoinHandle<()>,
    _request_task: JoinHandle<()>,
}

/// An issued call whose reply has not arrived yet.
///
/// Returned by [`IpcNode::start_call`]. Exposes the correlation id (for
/// [`IpcNode::cancel`]) and the awaitable resolution.
pub struct InFlightCall {
    // ---
    correlation_id: CorrelationId,
    rx: oneshot::Receiver<CallOutcome>,
    pending: Arc<Mutex<PendingCalls>>,
}

impl InFlightCall {
    /// The id this call's reply will carry.
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Suspend until the call resolves or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - `IpcError::Timeout` — deadline elapsed; the pending entry is removed
    ///   so a late reply is discarded without effect.
    /// - `IpcError::MethodNotFound` / `IpcError::RemoteFault` — error reply.
    /// - `IpcError::Cancelled` — the call was withdrawn.
    /// - `IpcError::Transport` — resolution channel closed underneath us.
    pub async fn wait(self, timeout: Duration) -> Result<Value> {
        // ---
        let InFlightCall {
            correlation_id,
            rx,
            pending,
        } = self;

        match time::timeout(timeout, rx).await {
            Err(_elapsed) => {
                let mut pending = lock_ignore_poison(&pending);
                pending.remove(&correlation_id);
                Err(IpcError::Timeout)
            }
            Ok(Err(_closed)) => Err(IpcError::Transport(
                "reply channel closed before resolution (node shut down?)".into(),
            )),
            Ok(Ok(CallOutcome::Cancelled)) => Err(IpcError::Cancelled),
            Ok(Ok(CallOutcome::Reply(reply))) => reply.into_result(),
        }
    }
}

impl IpcNode {
    // ---
    /// Create a node over an explicitly provided transport.
    ///
    /// Subscribes to the node's reply and request subjects before returning,
    /// so messages published afterwards are deliverable.
    ///
    /// # Errors
    ///
    /// - `IpcError::InvalidNodeId` — node id unusable as a subject fragment.
    /// - `IpcError::Transport` — a subscription could not be established.
    pub async fn with_transport(transport: TransportPtr, config: IpcConfig) -> Result<Self> {
        // ---
        let node_id = config.node_id.clone();
        if !validate_node_id(&node_id) {
            return Err(IpcError::InvalidNodeId(node_id));
        }

        let reply_handle = transport
            .subscribe(Subscription::from(reply_subject(&node_id)))
            .await?;
        let request_handle = transport
            .subscribe(Subscription::from(request_subject(&node_id)))
            .await?;

        let pending: Arc<Mutex<PendingCalls>> = Arc::new(Mutex::new(PendingCalls::new()));
        let methods: Arc<MethodTable> = Arc::new(Mutex::new(HashMap::new()));

        let reply_task = Self::spawn_reply_loop(reply_handle, Arc::clone(&pending), node_id.clone());
        let request_task = Self::spawn_request_loop(
            request_handle,
            transport.clone(),
            Arc::clone(&methods),
            node_id.clone(),
        );

        crate::log_info!("ipc node '{node_id}' online");

        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                node_id,
                config,
                pending,
                methods,
                broadcasts: Mutex::new(HashMap::new()),
                metrics: MetricsRegistry::new(),
                _reply_task: reply_task,
                _request_task: request_task,
            }),
        })
    }

    /// This node's identity in the mesh.
    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    /// Number of calls currently awaiting replies.
    pub fn pending_calls(&self) -> usize {
        lock_ignore_poison(&self.inner.pending).len()
    }

    // --- client side -----------------------------------------------------

    /// Call `method` on `target` with the node's default deadline.
    ///
    /// `args` serializes into the request envelope; use a tuple for
    /// positional arguments (`("hi",)` encodes as `["hi"]`) or a struct for
    /// named ones.
    pub async fn call<A, R>(&self, target: &str, method: &str, args: A) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        self.call_with_timeout(target, method, args, self.inner.config.request_timeout)
            .await
    }

    /// Call `method` on `target`, overriding the deadline for this call.
    ///
    /// # Errors
    ///
    /// - `IpcError::Timeout` — no reply before the deadline.
    /// - `IpcError::MethodNotFound` — target has no such method registered.
    /// - `IpcError::RemoteFault` — the remote handler failed.
    /// - `IpcError::Serialization` — argument or result codec failure.
    /// - `IpcError::Transport` / `IpcError::TransportRetryable` — publish
    ///   failed, or retries (when configured) were exhausted.
    pub async fn call_with_timeout<A, R>(
        &self,
        target: &str,
        method: &str,
        args: A,
        timeout: Duration,
    ) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        // ---
        let started = Instant::now();
        let args = serde_json::to_value(args)?;

        let result = self.call_raw(target, method, args, timeout).await;
        self.inner
            .metrics
            .record(method, started.elapsed(), result.is_ok());

        Ok(serde_json::from_value(result?)?)
    }

    /// Issue a call without waiting on it.
    ///
    /// The returned [`InFlightCall`] exposes the correlation id, so the call
    /// can be withdrawn with [`cancel`](Self::cancel) while another task (or
    /// nobody) waits on it. Calls issued this way bypass the node's retry
    /// policy and metrics.
    pub async fn start_call<A>(&self, target: &str, method: &str, args: A) -> Result<InFlightCall>
    where
        A: Serialize,
    {
        let args = serde_json::to_value(args)?;
        self.issue_value(target, method, args).await
    }

    /// Withdraw a pending call, releasing its waiter with `Cancelled`.
    ///
    /// Returns false when the id is unknown or the call already resolved.
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        // ---
        let mut pending = lock_ignore_poison(&self.inner.pending);
        pending.cancel(correlation_id)
    }

    /// Single-attempt-or-retry wrapper around issue + wait.
    async fn call_raw(
        &self,
        target: &str,
        method: &str,
        args: Value,
        timeout: Duration,
    ) -> Result<Value> {
        // ---
        let retry_config = self.inner.config.retry_config.clone();
        let has_retry = retry_config.is_some();

        crate::retry_with_backoff(retry_config.as_ref(), || {
            let args = args.clone();
            async move {
                let call = self.issue_value(target, method, args).await?;
                match call.wait(timeout).await {
                    // With retry configured a timeout is worth another
                    // attempt; without it, it is terminal.
                    Err(IpcError::Timeout) if has_retry => Err(IpcError::TransportRetryable(
                        "timed out waiting for reply, will retry".into(),
                    )),
                    other => other,
                }
            }
        })
        .await
    }

    async fn issue_value(&self, target: &str, method: &str, args: Value) -> Result<InFlightCall> {
        // ---
        let correlation_id = CorrelationId::generate();

        let rx = {
            let mut pending = lock_ignore_poison(&self.inner.pending);
            pending.register(correlation_id.clone())
        };

        let request = CallRequest {
            correlation_id: correlation_id.clone(),
            method: method.to_string(),
            args,
            reply_subject: reply_subject(&self.inner.node_id),
        };

        let publish_result = match serde_json::to_vec(&request) {
            Ok(payload) => {
                let env = Envelope::json(
                    Address::from(request_subject(target)),
                    Bytes::from(payload),
                );
                self.inner.transport.publish(env).await
            }
            Err(err) => Err(err.into()),
        };

        if let Err(err) = publish_result {
            // The request never left; the entry must not linger.
            let mut pending = lock_ignore_poison(&self.inner.pending);
            pending.remove(&correlation_id);
            return Err(err);
        }

        crate::log_debug!("issued call {method}@{target} [{correlation_id}]");

        Ok(InFlightCall {
            correlation_id,
            rx,
            pending: Arc::clone(&self.inner.pending),
        })
    }

    // --- server side -----------------------------------------------------

    /// Register an async method handler under `method`.
    ///
    /// Incoming requests for `method` deserialize their arguments into
    /// `Req`, run the handler in its own task, and reply with the serialized
    /// result — or with an error envelope when the handler fails.
    /// Re-registering a name replaces the previous handler.
    pub fn register<Req, Resp, F, Fut>(&self, method: &str, handler: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
    {
        // ---
        let mut methods = lock_ignore_poison(&self.inner.methods);
        methods.insert(method.to_string(), wrap_method(handler));
    }

    // --- broadcast -------------------------------------------------------

    /// Publish `data` to everyone subscribed on `channel`.
    ///
    /// Fire-and-forget: no correlation id, no reply, no acknowledgment.
    /// Only a synchronous transport failure surfaces.
    pub async fn broadcast<T: Serialize>(&self, channel: &str, data: T) -> Result<()> {
        // ---
        let payload = serde_json::to_vec(&data)?;
        let env = Envelope::json(
            Address::from(broadcast_subject(channel)),
            Bytes::from(payload),
        );
        self.inner.transport.publish(env).await
    }

    /// Subscribe `handler` to `channel`.
    ///
    /// Every message published to the channel after this returns invokes the
    /// handler. Multiple handlers may share a channel; each receives every
    /// message (fan-out). Handlers on one subscription run sequentially, so
    /// per-publisher ordering is preserved where the transport preserves it.
    /// Messages that fail to decode into `T` are dropped with a warning.
    pub async fn subscribe<T, F, Fut>(&self, channel: &str, handler: F) -> Result<()>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // ---
        let subscription = Subscription::from(broadcast_subject(channel));
        let mut handle = self.inner.transport.subscribe(subscription).await?;

        let _channel = channel.to_string();
        let task = tokio::spawn(async move {
            while let Some(env) = handle.inbox.recv().await {
                match serde_json::from_slice::<T>(&env.payload) {
                    Ok(data) => handler(data).await,
                    Err(_err) => {
                        crate::log_warn!("dropping undecodable broadcast on '{_channel}': {_err}");
                    }
                }
            }
        });

        let mut broadcasts = lock_ignore_poison(&self.inner.broadcasts);
        broadcasts.entry(channel.to_string()).or_default().push(task);

        Ok(())
    }

    /// Drop every handler this node holds on `channel`.
    ///
    /// Returns false when nothing was subscribed.
    pub fn unsubscribe(&self, channel: &str) -> bool {
        // ---
        let tasks = {
            let mut broadcasts = lock_ignore_poison(&self.inner.broadcasts);
            broadcasts.remove(channel)
        };

        match tasks {
            Some(tasks) => {
                for task in tasks {
                    task.abort();
                }
                true
            }
            None => false,
        }
    }

    // --- lifecycle -------------------------------------------------------

    /// Tear the node down: stop broadcast deliveries, close the transport,
    /// and release outstanding calls with `Cancelled` so no waiter hangs
    /// until its deadline.
    pub async fn shutdown(&self) -> Result<()> {
        // ---
        {
            let mut broadcasts = lock_ignore_poison(&self.inner.broadcasts);
            for (_, tasks) in broadcasts.drain() {
                for task in tasks {
                    task.abort();
                }
            }
        }

        self.inner.transport.close().await?;

        {
            let mut pending = lock_ignore_poison(&self.inner.pending);
            pending.cancel_all();
        }

        crate::log_info!("ipc node '{}' offline", self.inner.node_id);
        Ok(())
    }

    // --- metrics ---------------------------------------------------------

    /// Point-in-time metrics for calls made through this node.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Clear accumulated call metrics.
    pub fn reset_metrics(&self) {
        self.inner.metrics.reset()
    }

    // --- background loops ------------------------------------------------

    fn spawn_reply_loop(
        mut handle: SubscriptionHandle,
        pending: Arc<Mutex<PendingCalls>>,
        node_id: String,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            crate::log_debug!("reply loop started for '{node_id}'");

            while let Some(env) = handle.inbox.recv().await {
                let reply: CallReply = match serde_json::from_slice(&env.payload) {
                    Ok(reply) => reply,
                    Err(_err) => {
                        crate::log_warn!("discarding malformed reply envelope: {_err}");
                        continue;
                    }
                };

                let correlation_id = reply.correlation_id.clone();
                let delivered = {
                    let mut pending = lock_ignore_poison(&pending);
                    pending.complete(&correlation_id, reply)
                };

                if !delivered {
                    // Duplicate or expired reply; dropping it is the contract.
                    crate::log_debug!("no pending call for correlation id {correlation_id}");
                }
            }

            crate::log_debug!("reply loop stopped for '{node_id}'");
        })
    }

    fn spawn_request_loop(
        mut handle: SubscriptionHandle,
        transport: TransportPtr,
        methods: Arc<MethodTable>,
        node_id: String,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            crate::log_debug!("request loop started for '{node_id}'");

            while let Some(env) = handle.inbox.recv().await {
                let request: CallRequest = match serde_json::from_slice(&env.payload) {
                    Ok(request) => request,
                    Err(_err) => {
                        crate::log_warn!("discarding malformed request envelope: {_err}");
                        continue;
                    }
                };

                let method = {
                    let methods = lock_ignore_poison(&methods);
                    methods.get(&request.method).cloned()
                };

                // Handler execution and the reply publish run off-loop so a
                // slow method never delays the next request.
                let transport = transport.clone();
                tokio::spawn(async move {
                    let CallRequest {
                        correlation_id,
                        method: method_name,
                        args,
                        reply_subject,
                    } = request;

                    let reply = match method {
                        Some(handler) => match handler.invoke(args).await {
                            Ok(value) => CallReply::ok(correlation_id, value),
                            Err(err) => CallReply::fault(
                                correlation_id,
                                FaultKind::HandlerFault,
                                err.to_string(),
                            ),
                        },
                        None => {
                            CallReply::fault(correlation_id, FaultKind::MethodNotFound, method_name)
                        }
                    };

                    let payload = match serde_json::to_vec(&reply) {
                        Ok(payload) => payload,
                        Err(err) => {
                            crate::log_error!("failed to encode reply: {err}");
                            return;
                        }
                    };

                    let env = Envelope::json(Address::from(reply_subject), Bytes::from(payload));
                    if let Err(err) = transport.publish(env).await {
                        crate::log_error!("failed to publish reply: {err}");
                    }
                });
            }

            crate::log_debug!("request loop stopped for '{node_id}'");
        })
    }
}
