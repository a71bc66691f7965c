//! Saga participant: coordinator state machine and partitioned consume loop.

pub mod consumer;
pub mod coordinator;

pub use consumer::{partition_for, ConsumerSettings, ConsumerStats, SagaConsumer};
pub use coordinator::{Disposition, SagaCoordinator};
