//! Transport implementations shipped with the router.
//!
//! Broker-backed transports live outside this crate and implement
//! [`Subscriber`](msgrouter_core::Subscriber) and
//! [`Publisher`](msgrouter_core::Publisher) the same way.

mod memory;

pub use memory::InMemoryPubSub;
