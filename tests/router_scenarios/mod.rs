//! Router scenarios.
//!
//! `harness` wires a router to an [`InMemoryPubSub`](msgrouter::InMemoryPubSub)
//! and records everything published, so tests can count handler invocations
//! and dead-letter publishes without a broker.

#![allow(dead_code)]

mod harness;
mod logging;
