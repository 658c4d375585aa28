use crate::protocol::CallReply;
use crate::CorrelationId;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// How a pending call left the table.
#[derive(Debug)]
pub(super) enum CallOutcome {
    /// A correlated reply arrived.
    Reply(CallReply),
    /// The caller (or node shutdown) withdrew the call.
    Cancelled,
}

/// Table of calls awaiting replies.
///
/// Maps correlation ids to oneshot senders; the waiting future holds the
/// receiver. An entry exists for exactly the lifetime of one call: inserted
/// when the request is published, removed on reply, cancellation, or timeout
/// cleanup. Replies for ids not in the table are the caller's signal to
/// discard.
pub(super) struct PendingCalls {
    // ---
    calls: HashMap<CorrelationId, oneshot::Sender<CallOutcome>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        // ---
        Self {
            calls: HashMap::new(),
        }
    }

    /// Register a new pending call; the returned receiver resolves exactly once.
    pub fn register(&mut self, correlation_id: CorrelationId) -> oneshot::Receiver<CallOutcome> {
        // ---
        let (tx, rx) = oneshot::channel();
        self.calls.insert(correlation_id, tx);
        rx
    }

    /// Resolve a pending call with its reply.
    ///
    /// Returns false when the id is unknown or already resolved — the reply
    /// is then discarded, which is not an error.
    pub fn complete(&mut self, correlation_id: &CorrelationId, reply: CallReply) -> bool {
        // ---
        match self.calls.remove(correlation_id) {
            Some(tx) => {
                // Send failure means the waiter already gave up (timeout).
                let _ = tx.send(CallOutcome::Reply(reply));
                true
            }
            None => false,
        }
    }

    /// Withdraw a pending call, releasing the waiter with `Cancelled`.
    pub fn cancel(&mut self, correlation_id: &CorrelationId) -> bool {
        // ---
        match self.calls.remove(correlation_id) {
            Some(tx) => {
                let _ = tx.send(CallOutcome::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Drop a pending call without resolving the waiter. Timeout cleanup.
    pub fn remove(&mut self, correlation_id: &CorrelationId) -> bool {
        // ---
        self.calls.remove(correlation_id).is_some()
    }

    /// Withdraw every pending call. Node shutdown.
    pub fn cancel_all(&mut self) {
        // ---
        for (_, tx) in self.calls.drain() {
            let _ = tx.send(CallOutcome::Cancelled);
        }
    }

    pub fn len(&self) -> usize {
        // ---
        self.calls.len()
    }
}
