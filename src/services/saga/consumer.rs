//! Partitioned consume loop.
//!
//! A dispatcher polls the subscription and routes every message by its
//! ordering key to one of `partition_workers` sequential workers, so
//! messages sharing a key never run concurrently while distinct keys proceed
//! in parallel. A message whose handling fails is handled again, with
//! growing pauses, before its worker moves on to the next message of the
//! partition. Shutdown stops polling, lets the workers drain their queues
//! and then releases the subscription.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::BrokerConfig;
use crate::domain::ports::{InboundMessage, MessageConsumer};
use crate::services::saga::coordinator::{Disposition, SagaCoordinator};

/// Counters reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub received: u64,
    pub published: u64,
    pub reemitted: u64,
    pub skipped: u64,
    pub rejected: u64,
    /// Failed handling attempts
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    published: AtomicU64,
    reemitted: AtomicU64,
    skipped: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn record(&self, disposition: &Disposition) {
        let counter = match disposition {
            Disposition::Published(_) => &self.published,
            Disposition::Reemitted(_) => &self.reemitted,
            Disposition::Skipped(_) => &self.skipped,
            Disposition::Rejected(_) => &self.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            received: self.received.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            reemitted: self.reemitted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub poll_timeout: Duration,
    pub partition_workers: usize,
    pub worker_queue_depth: usize,
    /// Stop as soon as a poll comes back empty
    pub stop_when_idle: bool,
    /// First pause before a failed message is handled again
    pub redelivery_backoff: Duration,
}

const DEFAULT_REDELIVERY_BACKOFF: Duration = Duration::from_millis(100);
const MAX_REDELIVERY_BACKOFF: Duration = Duration::from_secs(5);

impl From<&BrokerConfig> for ConsumerSettings {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
            partition_workers: config.partition_workers.max(1),
            worker_queue_depth: config.worker_queue_depth.max(1),
            stop_when_idle: false,
            redelivery_backoff: DEFAULT_REDELIVERY_BACKOFF,
        }
    }
}

pub struct SagaConsumer {
    consumer: Arc<dyn MessageConsumer>,
    coordinator: Arc<SagaCoordinator>,
    settings: ConsumerSettings,
}

impl SagaConsumer {
    pub fn new(
        consumer: Arc<dyn MessageConsumer>,
        coordinator: Arc<SagaCoordinator>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            consumer,
            coordinator,
            settings,
        }
    }

    /// Consume until `shutdown` fires (or the stream is idle when configured
    /// to stop then), finish in-flight work and close the subscription.
    pub async fn run(&self, shutdown: CancellationToken) -> DomainResult<ConsumerStats> {
        let counters = Arc::new(Counters::default());
        let workers = self.settings.partition_workers.max(1);
        let (senders, handles): (Vec<_>, Vec<_>) = (0..workers)
            .map(|index| self.spawn_worker(index, Arc::clone(&counters), shutdown.clone()))
            .unzip();

        info!(workers, "saga consumer started");
        loop {
            let polled = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    debug!("shutdown requested");
                    break;
                }
                polled = self.consumer.poll(self.settings.poll_timeout) => polled,
            };

            match polled {
                Ok(Some(message)) => {
                    counters.received.fetch_add(1, Ordering::Relaxed);
                    let worker = partition_for(&message.ordering_key(), workers);
                    if senders[worker].send(message).await.is_err() {
                        error!(worker, "partition worker stopped unexpectedly");
                        break;
                    }
                }
                Ok(None) if self.settings.stop_when_idle => {
                    debug!("stream idle");
                    break;
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "poll failed"),
            }
        }

        drop(senders);
        for handle in handles {
            if let Err(err) = handle.await {
                error!(error = %err, "partition worker panicked");
            }
        }
        self.consumer.close().await?;

        let stats = counters.snapshot();
        info!(
            received = stats.received,
            published = stats.published,
            reemitted = stats.reemitted,
            failed = stats.failed,
            "saga consumer stopped"
        );
        Ok(stats)
    }

    fn spawn_worker(
        &self,
        index: usize,
        counters: Arc<Counters>,
        shutdown: CancellationToken,
    ) -> (mpsc::Sender<InboundMessage>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<InboundMessage>(self.settings.worker_queue_depth.max(1));
        let consumer = Arc::clone(&self.consumer);
        let coordinator = Arc::clone(&self.coordinator);
        let initial_backoff = self.settings.redelivery_backoff;

        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let mut backoff = initial_backoff;
                let disposition = loop {
                    match coordinator.handle(&message).await {
                        Ok(disposition) => break Some(disposition),
                        Err(err) => {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                worker = index,
                                topic = %message.topic,
                                offset = message.offset,
                                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                                error = %err,
                                "handling failed, retrying"
                            );
                        }
                    }
                    tokio::select! {
                        () = shutdown.cancelled() => break None,
                        () = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_REDELIVERY_BACKOFF);
                };

                let Some(disposition) = disposition else {
                    // later messages of this partition must not overtake it
                    error!(
                        worker = index,
                        topic = %message.topic,
                        offset = message.offset,
                        "message left unacknowledged for redelivery"
                    );
                    break;
                };
                counters.record(&disposition);
                if let Err(err) = consumer.ack(&message).await {
                    warn!(worker = index, offset = message.offset, error = %err, "ack failed");
                }
            }
            debug!(worker = index, "partition worker drained");
        });
        (tx, handle)
    }
}

/// Worker responsible for an ordering key.
pub fn partition_for(key: &str, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let workers = workers.max(1) as u64;
    usize::try_from(hasher.finish() % workers).unwrap_or(0)
}
