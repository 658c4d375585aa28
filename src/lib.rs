//! RPC and broadcast semantics over pub/sub messaging with automatic
//! request/response correlation.
//!
//! This library turns a fire-and-forget publish/subscribe transport into
//! request/response calls with timeouts, plus broadcast fan-out. It handles
//! correlation id generation, pending-call matching, cancellation, and
//! concurrent request processing; the transport only delivers opaque
//! envelopes.
//!

// Import all sub modules once...
mod domain;
mod node;
mod protocol;
mod transport;

mod ipc_config;
mod node_builder;

mod correlation;
mod error;
mod macros;
mod metrics;
mod retry;

// Re-export main types
pub use node::{InFlightCall, IpcNode};
pub use node_builder::IpcNodeBuilder;

pub use ipc_config::{IpcConfig, DEFAULT_REQUEST_TIMEOUT};

pub use correlation::CorrelationId;
pub use error::{IpcError, Result};
pub use metrics::{MethodStats, MetricsSnapshot};
pub use retry::RetryConfig;

pub use transport::create_memory_transport;

// --- public re-exports
pub use domain::{
    //
    Address,
    Envelope,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportPtr,
};

pub(crate) use macros::{log_debug, log_error, log_info, log_warn};
pub(crate) use retry::retry_with_backoff;

/// Create the transport selected by `config`.
///
/// Only the in-memory transport ships in-tree; `transport_uri` must be
/// `None`. Broker-backed buses connect outside the crate and come in as a
/// [`TransportPtr`] through the [`Transport`] trait.
pub async fn create_transport(config: &IpcConfig) -> Result<TransportPtr> {
    // ---
    if let Some(uri) = &config.transport_uri {
        return Err(IpcError::Transport(format!(
            "no built-in transport for '{uri}'; pass a connected Transport instead"
        )));
    }

    create_memory_transport().await
}
