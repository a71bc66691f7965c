//! Message broker adapters
//!
//! In-process topics with at-least-once delivery semantics. Used by the CLI
//! for local runs and by tests to drive the saga consumer.

pub mod memory;

pub use memory::{InMemoryBroker, InMemoryConsumer, StoredMessage};
