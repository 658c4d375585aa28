//! Public, transport-agnostic node configuration.
//!
//! Contains no bus-specific concepts; transport layers interpret the URI
//! into concrete connection settings. Environment fallbacks follow the
//! deployment convention: `IPC_SERVERS` for the bus address (comma lists
//! pass through verbatim for the transport to interpret) and `IPC_TIMEOUT`
//! for the default call deadline in seconds.

use crate::retry::RetryConfig;
use std::time::Duration;
use uuid::Uuid;

/// Default call deadline when neither config nor environment overrides it.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Node configuration and call defaults.
#[derive(Debug, Clone)]
pub struct IpcConfig {
    // ---
    /// Bus address (e.g. `"nats://localhost:4222"`). `None` selects the
    /// in-memory transport.
    pub transport_uri: Option<String>,

    /// This node's identity in the mesh. Used to construct its private
    /// request and reply subjects.
    pub node_id: String,

    /// Deadline applied by `call()`; `call_with_timeout()` overrides per call.
    pub request_timeout: Duration,

    /// Optional retry policy for retryable transport failures. `None` means
    /// a single attempt — retry never activates unless configured.
    pub retry_config: Option<RetryConfig>,
}

impl IpcConfig {
    /// Config for a node attached to a bus at `uri`.
    pub fn with_bus(uri: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            transport_uri: Some(uri.into()),
            node_id: node_id.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_config: None,
        }
    }

    /// Config for an in-process node (memory transport, no broker).
    pub fn memory(node_id: impl Into<String>) -> Self {
        Self {
            transport_uri: None,
            node_id: node_id.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_config: None,
        }
    }

    /// Build a config from the environment.
    ///
    /// Reads `IPC_SERVERS` and `IPC_TIMEOUT` (seconds, fractional allowed)
    /// and generates a fresh node id.
    pub fn from_env() -> Self {
        // ---
        let transport_uri = std::env::var("IPC_SERVERS")
            .ok()
            .filter(|uri| !uri.is_empty());

        let request_timeout = std::env::var("IPC_TIMEOUT")
            .ok()
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        Self {
            transport_uri,
            node_id: generate_node_id(),
            request_timeout,
            retry_config: None,
        }
    }

    /// Set the default call deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enable retry with the given policy.
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }
}

/// Generate an anonymous node id of the form `node_<8 hex chars>`.
pub(crate) fn generate_node_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("node_{}", &uuid[..8])
}

/// Node ids are subject-name fragments, so they are restricted to
/// alphanumerics, underscores, and hyphens.
pub(crate) fn validate_node_id(node_id: &str) -> bool {
    !node_id.is_empty()
        && node_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
