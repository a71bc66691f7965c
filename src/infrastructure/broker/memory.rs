use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{EventPublisher, InboundMessage, MessageConsumer};

/// A message as held by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Position across all topics, in publication order
    pub sequence: u64,
    pub topic: String,
    pub offset: u64,
    pub key: Option<String>,
    pub payload: String,
}

#[derive(Debug, Default)]
struct BrokerState {
    next_sequence: u64,
    topics: HashMap<String, Vec<StoredMessage>>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<BrokerState>,
    notify: Notify,
    failing_publishes: AtomicUsize,
}

impl Shared {
    fn state(&self) -> DomainResult<MutexGuard<'_, BrokerState>> {
        self.state
            .lock()
            .map_err(|_| DomainError::PublishFailed("broker state poisoned".to_string()))
    }
}

/// In-process broker holding every topic in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to `topic`, returning its offset.
    pub fn send(&self, topic: &str, key: Option<&str>, payload: impl Into<String>) -> DomainResult<u64> {
        let offset = {
            let mut state = self.shared.state()?;
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            let log = state.topics.entry(topic.to_string()).or_default();
            let offset = log.len() as u64;
            log.push(StoredMessage {
                sequence,
                topic: topic.to_string(),
                offset,
                key: key.map(ToString::to_string),
                payload: payload.into(),
            });
            offset
        };
        self.shared.notify.notify_waiters();
        Ok(offset)
    }

    /// Everything ever written to `topic`, in offset order.
    pub fn messages(&self, topic: &str) -> Vec<StoredMessage> {
        self.shared
            .state()
            .map(|state| state.topics.get(topic).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Make the next `count` publishes fail.
    pub fn fail_next_publishes(&self, count: usize) {
        self.shared.failing_publishes.store(count, Ordering::SeqCst);
    }

    /// Subscribe a new consumer starting at the beginning of each topic.
    pub fn consumer(&self, topics: &[String]) -> InMemoryConsumer {
        InMemoryConsumer {
            shared: Arc::clone(&self.shared),
            topics: topics.to_vec(),
            cursor: Mutex::new(ConsumerCursor::default()),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl EventPublisher for InMemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> DomainResult<()> {
        let fail = self
            .shared
            .failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(DomainError::PublishFailed(format!(
                "broker rejected message for topic '{topic}'"
            )));
        }
        self.send(topic, Some(key), payload)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ConsumerCursor {
    /// Next offset to deliver per topic
    positions: HashMap<String, u64>,
    acked: BTreeSet<(String, u64)>,
}

/// A subscription over one or more topics
///
/// Messages are delivered in publication order across the subscribed topics.
/// Acknowledgements may arrive out of order; [`InMemoryConsumer::rewind`]
/// replays every message that was delivered but never acknowledged, like a
/// consumer group restarting from its committed offsets.
#[derive(Debug)]
pub struct InMemoryConsumer {
    shared: Arc<Shared>,
    topics: Vec<String>,
    cursor: Mutex<ConsumerCursor>,
    closed: AtomicBool,
}

impl InMemoryConsumer {
    fn cursor(&self) -> DomainResult<MutexGuard<'_, ConsumerCursor>> {
        self.cursor
            .lock()
            .map_err(|_| DomainError::InvalidInput("consumer state poisoned".to_string()))
    }

    fn next_ready(&self) -> DomainResult<Option<InboundMessage>> {
        let state = self.shared.state()?;
        let mut cursor = self.cursor()?;

        let candidate = self
            .topics
            .iter()
            .filter_map(|topic| {
                let position = cursor.positions.get(topic).copied().unwrap_or(0);
                let log = state.topics.get(topic)?;
                let index = usize::try_from(position).ok()?;
                log.get(index)
            })
            .min_by_key(|message| message.sequence)
            .cloned();

        Ok(candidate.map(|message| {
            cursor
                .positions
                .insert(message.topic.clone(), message.offset + 1);
            InboundMessage {
                topic: message.topic,
                partition: 0,
                offset: message.offset,
                key: message.key,
                payload: message.payload,
            }
        }))
    }

    /// Restart from the lowest unacknowledged offset of each topic.
    pub fn rewind(&self) -> DomainResult<()> {
        let mut cursor = self.cursor()?;
        let positions: Vec<(String, u64)> = cursor.positions.clone().into_iter().collect();
        for (topic, delivered_to) in positions {
            let committed = (0..delivered_to)
                .find(|offset| !cursor.acked.contains(&(topic.clone(), *offset)))
                .unwrap_or(delivered_to);
            cursor.positions.insert(topic, committed);
        }
        Ok(())
    }

    pub fn is_acked(&self, topic: &str, offset: u64) -> bool {
        self.cursor()
            .map(|cursor| cursor.acked.contains(&(topic.to_string(), offset)))
            .unwrap_or(false)
    }

    pub fn acked_count(&self) -> usize {
        self.cursor().map(|cursor| cursor.acked.len()).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageConsumer for InMemoryConsumer {
    async fn poll(&self, timeout: Duration) -> DomainResult<Option<InboundMessage>> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_closed() {
                return Ok(None);
            }
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.next_ready()? {
                return Ok(Some(message));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, message: &InboundMessage) -> DomainResult<()> {
        self.cursor()?
            .acked
            .insert((message.topic.clone(), message.offset));
        Ok(())
    }

    async fn close(&self) -> DomainResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
        Ok(())
    }
}
