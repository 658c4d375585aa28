//! Subject naming conventions.
//!
//! Every node owns two private subjects: one for incoming requests and one
//! for replies to its own outstanding calls. Broadcast channels share a
//! common prefix so they can never collide with RPC traffic.

/// Subject a node listens on for incoming RPC requests.
pub fn request_subject(node_id: &str) -> String {
    format!("rpc.{node_id}.request")
}

/// Subject a node listens on for replies to its outstanding calls.
///
/// Carried inside each request envelope as `reply_subject`, so responders
/// never derive it themselves.
pub fn reply_subject(node_id: &str) -> String {
    format!("rpc.{node_id}.reply")
}

/// Subject for a broadcast channel.
pub fn broadcast_subject(channel: &str) -> String {
    format!("broadcast.{channel}")
}
