//! Domain layer public interface.
//!
//! Domain-level abstractions independent of any concrete bus, protocol, or
//! client library. Consumers import symbols via this module, not from the
//! individual files.

mod transport;

// --- Transport domain re-exports ---

pub use transport::{
    //
    Address,
    Envelope,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportPtr,
};
