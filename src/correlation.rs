use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique token linking a request to its eventual reply.
///
/// Correlation ids travel *in-band* inside wire envelopes; the transport
/// never interprets them. Each id is in flight at most once: the pending-call
/// table removes an entry the moment it resolves, so a duplicate or late
/// reply finds nothing and is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh unique correlation id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
