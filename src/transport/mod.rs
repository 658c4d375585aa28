//! Transport implementations.
//!
//! Concrete implementations of the domain-level `Transport` trait, exposed
//! only through constructor functions. Domain and node code never depend on
//! transport-specific types; broker-backed transports plug in behind the
//! same trait from outside the crate.

mod memory;

pub use memory::create_transport as create_memory_transport;
