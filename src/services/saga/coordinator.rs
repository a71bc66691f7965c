//! Saga participant state machine.
//!
//! Each inbound event drives exactly one transition for its transaction.
//! The ledger is written before the outcome is published, so a redelivered
//! message re-emits the stored outcome instead of mutating the store again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{SagaCommand, SagaEvent, SagaPhase, SagaStatus, SagaTrigger};
use crate::domain::ports::{EventPublisher, InboundMessage, SagaLedger, SagaRecord};
use crate::services::indexing_service::{IndexingService, NewDocument};
use crate::services::retry::RetryPolicy;
use crate::services::timeouts::bounded;

/// What the coordinator did with one inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// A transition ran and its outcome was published
    Published(SagaEvent),
    /// The transaction was already settled; the stored outcome was published again
    Reemitted(SagaEvent),
    /// Not a command for this participant
    Skipped(String),
    /// The message can never be processed
    Rejected(String),
}

impl Disposition {
    pub fn outcome(&self) -> Option<&SagaEvent> {
        match self {
            Self::Published(event) | Self::Reemitted(event) => Some(event),
            Self::Skipped(_) | Self::Rejected(_) => None,
        }
    }
}

pub struct SagaCoordinator {
    indexing: Arc<IndexingService>,
    ledger: Arc<dyn SagaLedger>,
    publisher: Arc<dyn EventPublisher>,
    retry: RetryPolicy,
    result_topic: String,
    publish_timeout: Duration,
}

impl SagaCoordinator {
    pub fn new(
        indexing: Arc<IndexingService>,
        ledger: Arc<dyn SagaLedger>,
        publisher: Arc<dyn EventPublisher>,
        retry: RetryPolicy,
        result_topic: impl Into<String>,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            indexing,
            ledger,
            publisher,
            retry,
            result_topic: result_topic.into(),
            publish_timeout,
        }
    }

    /// Process one inbound message.
    ///
    /// `Ok` means the message may be acknowledged. An error leaves it
    /// unacknowledged for redelivery.
    #[instrument(skip(self, message), fields(topic = %message.topic, offset = message.offset))]
    pub async fn handle(&self, message: &InboundMessage) -> DomainResult<Disposition> {
        let event = match SagaEvent::from_json(&message.payload) {
            Ok(event) => event,
            Err(err) => {
                error!(error = %err, "dropping malformed saga event");
                return Ok(Disposition::Rejected(err.to_string()));
            }
        };

        let Some(command) = SagaCommand::from_status(event.status) else {
            warn!(
                transaction_id = %event.transaction_id,
                status = %event.status,
                "event is not a command for this participant"
            );
            return Ok(Disposition::Skipped(format!(
                "status {} carries no command",
                event.status
            )));
        };

        let record = self.ledger.get(&event.transaction_id).await?;
        if let Err(duplicate) = check_duplicate(record.as_ref(), command) {
            return self.reemit(record, duplicate).await;
        }

        match command {
            SagaCommand::Create => self.create(event, record).await,
            SagaCommand::Compensate => self.compensate(event, record).await,
        }
    }

    #[instrument(skip_all, fields(transaction_id = %event.transaction_id, stage = "create"))]
    async fn create(&self, event: SagaEvent, record: Option<SagaRecord>) -> DomainResult<Disposition> {
        let mut phase = record.map_or(SagaPhase::Received, |r| r.phase);
        if phase == SagaPhase::Received {
            phase = phase.transition(SagaTrigger::Begin)?;
        }
        self.save(&event.transaction_id, phase, None).await?;

        let (phase, outcome) = match self.index(&event).await {
            Ok(ids) => {
                info!(chunks = ids.len(), "document indexed");
                (
                    phase.transition(SagaTrigger::IndexSucceeded)?,
                    event.outcome(
                        SagaStatus::Success,
                        format!("Document indexed in {} chunks", ids.len()),
                    ),
                )
            }
            Err(err) => {
                if matches!(err, DomainError::CompensationFailure { .. }) {
                    error!(error = %err, "partial chunks could not be removed");
                } else {
                    warn!(error = %err, kind = err.kind(), "indexing failed");
                }
                (
                    phase.transition(SagaTrigger::IndexFailed)?,
                    event.outcome(
                        SagaStatus::Fail,
                        format!("Indexing failed ({}): {err}", err.kind()),
                    ),
                )
            }
        };

        self.save(&event.transaction_id, phase, Some(outcome.clone())).await?;
        self.publish(&outcome).await?;
        Ok(Disposition::Published(outcome))
    }

    async fn index(&self, event: &SagaEvent) -> DomainResult<Vec<i64>> {
        let document = NewDocument::from_payload(&event.payload)?;
        let chunks = self
            .retry
            .execute("embed", || self.indexing.prepare_document(&document))
            .await?;
        self.indexing.insert_document(document.key, chunks).await
    }

    #[instrument(skip_all, fields(transaction_id = %event.transaction_id, stage = "rollback"))]
    async fn compensate(&self, event: SagaEvent, record: Option<SagaRecord>) -> DomainResult<Disposition> {
        let mut phase = record.map_or(SagaPhase::Received, |r| r.phase);
        if phase != SagaPhase::RollbackPending {
            phase = phase.transition(SagaTrigger::RollbackRequested)?;
        }
        self.save(&event.transaction_id, phase, None).await?;

        let removed = match event.payload.key() {
            Ok(key) => self.indexing.delete_document_version(&key).await,
            Err(err) => Err(err),
        };

        let (phase, outcome) = match removed {
            Ok(removed) => {
                info!(removed, "rollback applied");
                (
                    phase.transition(SagaTrigger::CompensationApplied)?,
                    event.outcome(
                        SagaStatus::Success,
                        format!("Rollback applied, {removed} chunks removed"),
                    ),
                )
            }
            Err(err) => {
                let failure = DomainError::CompensationFailure {
                    transaction_id: event.transaction_id.clone(),
                    reason: err.to_string(),
                };
                error!(error = %failure, "rollback failed, manual cleanup required");
                (
                    phase.transition(SagaTrigger::CompensationFailed)?,
                    event.outcome(SagaStatus::Fail, failure.to_string()),
                )
            }
        };

        self.save(&event.transaction_id, phase, Some(outcome.clone())).await?;
        self.publish(&outcome).await?;
        Ok(Disposition::Published(outcome))
    }

    async fn reemit(&self, record: Option<SagaRecord>, duplicate: DomainError) -> DomainResult<Disposition> {
        debug!(reason = %duplicate, "transaction already settled");
        let Some(outcome) = record.and_then(|r| r.last_outcome) else {
            return Ok(Disposition::Skipped(duplicate.to_string()));
        };
        self.publish(&outcome).await?;
        Ok(Disposition::Reemitted(outcome))
    }

    async fn save(&self, transaction_id: &str, phase: SagaPhase, outcome: Option<SagaEvent>) -> DomainResult<()> {
        self.ledger
            .put(SagaRecord {
                transaction_id: transaction_id.to_string(),
                phase,
                last_outcome: outcome,
                updated_at: Utc::now(),
            })
            .await
    }

    async fn publish(&self, outcome: &SagaEvent) -> DomainResult<()> {
        let payload = outcome.to_json()?;
        bounded(
            "broker.publish",
            self.publish_timeout,
            self.publisher
                .publish(&self.result_topic, &outcome.transaction_id, &payload),
        )
        .await
        .map_err(|err| match err {
            DomainError::PublishFailed(_) => err,
            other => DomainError::PublishFailed(other.to_string()),
        })?;
        debug!(
            transaction_id = %outcome.transaction_id,
            status = %outcome.status,
            topic = %self.result_topic,
            "outcome published"
        );
        Ok(())
    }
}

/// Whether the command must be answered from the ledger instead of run.
fn check_duplicate(record: Option<&SagaRecord>, command: SagaCommand) -> DomainResult<()> {
    let Some(record) = record else {
        return Ok(());
    };
    let settled = match command {
        // a create after any outcome, or after a rollback began, never indexes again
        SagaCommand::Create => record.phase.is_settled() || record.phase == SagaPhase::RollbackPending,
        SagaCommand::Compensate => record.phase.is_terminal(),
    };
    if settled {
        Err(DomainError::DuplicateTransaction(format!(
            "{} is {}",
            record.transaction_id, record.phase
        )))
    } else {
        Ok(())
    }
}
