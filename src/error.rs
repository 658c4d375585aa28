use thiserror::Error;

/// Errors surfaced by IPC operations.
///
/// Only the call path carries failure modes that must reach the caller
/// ([`Timeout`](IpcError::Timeout), [`MethodNotFound`](IpcError::MethodNotFound),
/// [`RemoteFault`](IpcError::RemoteFault), [`Cancelled`](IpcError::Cancelled)).
/// Broadcast and subscribe only fail synchronously at the transport boundary.
#[derive(Error, Debug)]
pub enum IpcError {
    /// No reply arrived before the call deadline.
    #[error("call timed out")]
    Timeout,

    /// The call was withdrawn before a reply arrived.
    #[error("call cancelled")]
    Cancelled,

    /// The target node has no handler registered under the requested method.
    #[error("no method registered under '{0}'")]
    MethodNotFound(String),

    /// The remote handler failed; carries the forwarded description only,
    /// never the remote stack.
    #[error("remote handler failed: {0}")]
    RemoteFault(String),

    /// Publish or subscribe failed at the transport boundary. Not retried
    /// by this layer.
    #[error("transport error: {0}")]
    Transport(String),

    /// Transient transport failure; retried when retry is configured,
    /// surfaced once attempts are exhausted.
    #[error("retryable transport error: {0}")]
    TransportRetryable(String),

    /// Payload encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Node id contains characters outside `[A-Za-z0-9_-]`.
    #[error("invalid node id: '{0}'")]
    InvalidNodeId(String),
}

/// Result type alias for IPC operations.
pub type Result<T> = std::result::Result<T, IpcError>;
