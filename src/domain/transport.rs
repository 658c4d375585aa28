// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! Defines the minimal contract the correlator layer needs from a message
//! bus: best-effort delivery of opaque envelopes to subscribed consumers,
//! at-least-once, with no ordering guarantee across publishers and no
//! built-in request/response correlation. Correlation, timeouts, and fan-out
//! semantics live above this layer; concrete bus bindings live under
//! `src/transport/`.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

/// A subject name used for routing.
///
/// An `Address` names a destination on the bus. Its interpretation is
/// transport-specific; the domain layer treats it as an opaque identifier
/// with no assumptions about syntax, hierarchy, or wildcards.
///
/// Addresses are immutable, cheap to clone, and safe to share across tasks.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Address(pub Arc<str>);

impl<T> From<T> for Address
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        Address(value.into())
    }
}

/// A subscription identifier.
///
/// Names the set of addresses a consumer wants delivered. How a subscription
/// matches an address is defined by the transport; the in-memory transport
/// provides the reference semantics (exact string match).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subscription(pub Arc<str>);

impl From<Address> for Subscription {
    fn from(address: Address) -> Self {
        // ---
        Subscription(address.0)
    }
}

impl<T> From<T> for Subscription
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        Subscription(value.into())
    }
}

/// An opaque message envelope.
///
/// The unit of transport between producers and consumers: a destination
/// address plus payload bytes. The transport never interprets the payload;
/// wire-format semantics (requests, replies, broadcasts) are layered on top
/// by `protocol`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    // ---
    /// Delivery address used by the transport for routing only.
    pub address: Address,

    /// Opaque payload bytes, interpreted by higher layers.
    pub payload: Bytes,

    /// Optional payload format hint (e.g. "application/json"). Informational;
    /// not enforced anywhere.
    pub content_type: Option<Arc<str>>,
}

impl Envelope {
    /// Create an envelope carrying a JSON payload.
    pub fn json(address: Address, payload: Bytes) -> Self {
        // ---
        Self {
            address,
            payload,
            content_type: Some(Arc::from("application/json")),
        }
    }
}

/// Handle returned from a successful subscription.
///
/// The subscription stays active until the handle is dropped or the
/// transport is closed. Dropping the handle implicitly unsubscribes.
pub struct SubscriptionHandle {
    // ---
    /// Receiver channel for envelopes matching this subscription.
    pub inbox: mpsc::Receiver<Envelope>,
}

/// Transport abstraction.
///
/// Implementations must ensure that:
/// - Once `subscribe()` returns successfully, matching envelopes published
///   *after* that point are deliverable.
/// - `publish()` does not block on slow subscribers beyond channel handoff.
/// - No delivery guarantees beyond at-least-once are assumed by callers.
///
/// The in-memory transport is the reference implementation of these
/// semantics.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Publish an envelope to its address.
    async fn publish(&self, env: Envelope) -> Result<()>;

    /// Register a subscription and return a handle for receiving envelopes.
    async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionHandle>;

    /// Close the transport and release any associated resources.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
///
/// `Arc<dyn Transport>`: cheap to clone, shares the underlying connection,
/// erases the concrete transport behind the domain interface.
pub type TransportPtr = Arc<dyn Transport>;
