//! Ordered message stream ports.
//!
//! The consumer side delivers messages at least once; a message is only
//! considered handled once acknowledged.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// A message read from a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    /// Partition key; messages sharing a key are handled in order
    pub key: Option<String>,
    pub payload: String,
}

impl InboundMessage {
    /// Key used to serialize processing.
    pub fn ordering_key(&self) -> String {
        self.key
            .clone()
            .unwrap_or_else(|| format!("{}#{}", self.topic, self.partition))
    }
}

#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Wait up to `timeout` for the next message. `None` means nothing arrived.
    async fn poll(&self, timeout: Duration) -> DomainResult<Option<InboundMessage>>;

    /// Mark a message as handled.
    async fn ack(&self, message: &InboundMessage) -> DomainResult<()>;

    /// Release the subscription.
    async fn close(&self) -> DomainResult<()>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> DomainResult<()>;
}
