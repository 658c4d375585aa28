//! IPC node builder.
//!
//! Fluent construction of [`IpcNode`] instances over an existing transport,
//! with optional retry and timeout settings.

use crate::ipc_config::generate_node_id;
use crate::{IpcConfig, IpcNode, Result, RetryConfig, TransportPtr};
use std::time::Duration;

/// Builder for [`IpcNode`] instances.
///
/// # Examples
///
/// ## Node with retry
/// ```no_run
/// use mesh_ipc::{create_transport, IpcConfig, IpcNodeBuilder};
/// use std::time::Duration;
///
/// # async fn example() -> mesh_ipc::Result<()> {
/// let transport = create_transport(&IpcConfig::memory("sensor")).await?;
///
/// let node = IpcNodeBuilder::new(transport)
///     .node_id("sensor")
///     .request_timeout(Duration::from_secs(5))
///     .retry_max_attempts(3)
///     .retry_initial_delay(Duration::from_millis(100))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// ## Anonymous node, defaults only
/// ```no_run
/// # use mesh_ipc::{create_transport, IpcConfig, IpcNodeBuilder};
/// # async fn example() -> mesh_ipc::Result<()> {
/// let transport = create_transport(&IpcConfig::from_env()).await?;
/// let node = IpcNodeBuilder::new(transport).build().await?;
/// # Ok(())
/// # }
/// ```
pub struct IpcNodeBuilder {
    // ---
    transport: TransportPtr,
    node_id: Option<String>,
    request_timeout: Option<Duration>,

    // Retry knobs (all optional; setting any enables retry)
    retry_max_attempts: Option<u32>,
    retry_multiplier: Option<f32>,
    retry_initial_delay: Option<Duration>,
    retry_max_delay: Option<Duration>,
}

impl IpcNodeBuilder {
    /// Start building a node over `transport`.
    ///
    /// Without [`node_id`](Self::node_id) the node gets a generated
    /// `node_<hex>` identity.
    pub fn new(transport: TransportPtr) -> Self {
        // ---
        Self {
            transport,
            node_id: None,
            request_timeout: None,
            retry_max_attempts: None,
            retry_multiplier: None,
            retry_initial_delay: None,
            retry_max_delay: None,
        }
    }

    /// Set the node's identity in the mesh.
    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    /// Default deadline for `call()`. Default: 30s.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Maximum retry attempts. Default when retry is enabled: 3.
    pub fn retry_max_attempts(mut self, attempts: u32) -> Self {
        self.retry_max_attempts = Some(attempts);
        self
    }

    /// Backoff multiplier. Default when retry is enabled: 2.0.
    pub fn retry_multiplier(mut self, multiplier: f32) -> Self {
        self.retry_multiplier = Some(multiplier);
        self
    }

    /// Delay before the first retry. Default when retry is enabled: 100ms.
    pub fn retry_initial_delay(mut self, delay: Duration) -> Self {
        self.retry_initial_delay = Some(delay);
        self
    }

    /// Cap on the retry delay. Default when retry is enabled: 5s.
    pub fn retry_max_delay(mut self, delay: Duration) -> Self {
        self.retry_max_delay = Some(delay);
        self
    }

    /// Build the node (consumes self).
    ///
    /// Subscribes the node's private subjects before returning.
    pub async fn build(self) -> Result<IpcNode> {
        // ---
        let defaults = RetryConfig::default();

        // Retry activates only if at least one knob was touched.
        let retry_config = if self.retry_max_attempts.is_some()
            || self.retry_multiplier.is_some()
            || self.retry_initial_delay.is_some()
            || self.retry_max_delay.is_some()
        {
            Some(RetryConfig {
                max_attempts: self.retry_max_attempts.unwrap_or(defaults.max_attempts),
                multiplier: self.retry_multiplier.unwrap_or(defaults.multiplier),
                initial_delay: self.retry_initial_delay.unwrap_or(defaults.initial_delay),
                max_delay: self.retry_max_delay.unwrap_or(defaults.max_delay),
            })
        } else {
            None
        };

        let mut config = IpcConfig::memory(self.node_id.unwrap_or_else(generate_node_id));
        if let Some(timeout) = self.request_timeout {
            config = config.with_request_timeout(timeout);
        }
        config.retry_config = retry_config;

        IpcNode::with_transport(self.transport, config).await
    }
}
