// src/transport/memory/transport.rs

//! In-memory transport implementation.
//!
//! Simulates a message bus entirely within the process and serves as the
//! **reference implementation** of transport semantics: other transports
//! are expected to approximate this behavior as closely as their underlying
//! systems allow.
//!
//! ## Semantics
//!
//! - Subscriptions match addresses by exact string equality.
//! - Once `subscribe()` returns, subsequent matching publishes are
//!   deliverable.
//! - Dropping a `SubscriptionHandle` implicitly unregisters; closed
//!   channels are skipped on publish and pruned on the next subscribe.
//!
//! ## Non-Goals
//!
//! - Persistence, durability, or failure simulation
//! - Wildcard subjects or broker-specific matching rules

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::{
    // ---
    Envelope,
    Result,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportPtr,
};

/// Per-subscription delivery channel depth. Publishers back-pressure on a
/// full channel rather than dropping envelopes.
const INBOX_DEPTH: usize = 16;

struct MemoryTransport {
    // ---
    subscriptions: RwLock<HashMap<Subscription, Vec<mpsc::Sender<Envelope>>>>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---

    /// Deliver an envelope to every live subscriber of its exact address.
    async fn publish(&self, env: Envelope) -> Result<()> {
        // ---
        let subs = self.subscriptions.read().await;

        if let Some(senders) = subs.get(&Subscription(env.address.0.clone())) {
            for sender in senders.iter().filter(|tx| !tx.is_closed()) {
                // A send failure means the handle was dropped mid-publish;
                // that subscriber simply no longer exists.
                let _ = sender.send(env.clone()).await;
            }
        }

        Ok(())
    }

    /// Register a subscription.
    ///
    /// Prunes dead senders left by dropped handles while the write lock is
    /// held anyway.
    async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionHandle> {
        // ---
        let (tx, rx) = mpsc::channel(INBOX_DEPTH);

        let mut subs = self.subscriptions.write().await;
        let senders = subs.entry(sub).or_default();
        senders.retain(|tx| !tx.is_closed());
        senders.push(tx);

        Ok(SubscriptionHandle { inbox: rx })
    }

    /// Close the transport, dropping all subscriptions. Every inbox sees
    /// end-of-stream.
    async fn close(&self) -> Result<()> {
        // ---
        let mut subs = self.subscriptions.write().await;
        subs.clear();
        Ok(())
    }
}

/// Create a new in-memory transport.
///
/// Always available; needs no external resources.
pub async fn create_transport() -> Result<TransportPtr> {
    // ---
    let transport = MemoryTransport {
        subscriptions: RwLock::new(HashMap::new()),
    };

    Ok(Arc::new(transport))
}
