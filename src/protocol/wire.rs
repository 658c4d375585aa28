use crate::{CorrelationId, IpcError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request envelope published to `rpc.<target>.request`.
///
/// `args` carries whatever the caller's argument type serialized to; tuples
/// encode as JSON sequences, which is the documented calling convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    pub correlation_id: CorrelationId,
    pub method: String,
    pub args: Value,
    /// Where the responder must publish the reply.
    pub reply_subject: String,
}

/// Outcome marker on a reply envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// Classifies a remote failure so the caller can map it back into the
/// typed error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    MethodNotFound,
    HandlerFault,
}

impl FaultKind {
    fn as_str(self) -> &'static str {
        match self {
            FaultKind::MethodNotFound => "method_not_found",
            FaultKind::HandlerFault => "handler_fault",
        }
    }
}

/// Error description carried in the `value` field of an error reply.
///
/// Only the description crosses the wire, never the remote stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

/// Reply envelope published to the request's `reply_subject`.
///
/// On success `value` holds the handler's encoded result; on error it holds
/// an encoded [`Fault`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallReply {
    pub correlation_id: CorrelationId,
    pub status: ReplyStatus,
    pub value: Value,
}

impl CallReply {
    /// Build a success reply.
    pub fn ok(correlation_id: CorrelationId, value: Value) -> Self {
        // ---
        Self {
            correlation_id,
            status: ReplyStatus::Ok,
            value,
        }
    }

    /// Build an error reply carrying a fault description.
    pub fn fault(correlation_id: CorrelationId, kind: FaultKind, message: impl Into<String>) -> Self {
        // ---
        Self {
            correlation_id,
            status: ReplyStatus::Error,
            value: serde_json::json!({
                "kind": kind.as_str(),
                "message": message.into(),
            }),
        }
    }

    /// Resolve the reply into the caller-facing result.
    ///
    /// A malformed fault body degrades to `RemoteFault` carrying the raw
    /// value text rather than failing the decode.
    pub fn into_result(self) -> Result<Value> {
        // ---
        match self.status {
            ReplyStatus::Ok => Ok(self.value),
            ReplyStatus::Error => {
                let fault: Fault = serde_json::from_value(self.value.clone()).unwrap_or(Fault {
                    kind: FaultKind::HandlerFault,
                    message: self.value.to_string(),
                });
                Err(match fault.kind {
                    FaultKind::MethodNotFound => IpcError::MethodNotFound(fault.message),
                    FaultKind::HandlerFault => IpcError::RemoteFault(fault.message),
                })
            }
        }
    }
}
