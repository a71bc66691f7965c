//! Saga event domain model.
//!
//! Inbound commands and outbound outcomes share one wire shape. The event
//! history travels with every event and only ever grows.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::collections::DocumentKey;
use crate::domain::errors::{DomainError, DomainResult};

/// Service that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSource {
    Orchestrator,
    DocumentBotService,
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Orchestrator => write!(f, "ORCHESTRATOR"),
            Self::DocumentBotService => write!(f, "DOCUMENT_BOT_SERVICE"),
        }
    }
}

/// Status carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    Success,
    RollbackPending,
    Fail,
}

impl fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::RollbackPending => write!(f, "ROLLBACK_PENDING"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// Document carried by a creation command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    pub project_id: Option<i64>,
    pub document_id: Option<i64>,
    pub name: Option<String>,
    pub version: Option<i64>,
    pub text: Option<String>,
}

impl DocumentPayload {
    /// Identity of the document version, if the payload names one.
    pub fn key(&self) -> DomainResult<DocumentKey> {
        match (self.project_id, self.document_id, self.version) {
            (Some(project_id), Some(document_id), Some(version)) => Ok(DocumentKey {
                project_id,
                document_id,
                version,
            }),
            _ => Err(DomainError::InvalidInput(
                "payload must carry projectId, documentId and version".to_string(),
            )),
        }
    }

    /// Text to index; blank text is rejected.
    pub fn text(&self) -> DomainResult<&str> {
        match self.text.as_deref() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(DomainError::InvalidInput(
                "payload text is empty".to_string(),
            )),
        }
    }
}

/// One step in the saga's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub source: EventSource,
    pub status: SagaStatus,
    #[serde(default)]
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A saga event as exchanged with the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaEvent {
    #[serde(default)]
    pub id: String,
    pub transaction_id: String,
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub payload: DocumentPayload,
    pub source: EventSource,
    pub created_at: DateTime<Utc>,
    pub status: SagaStatus,
    #[serde(default)]
    event_history: Vec<HistoryEntry>,
}

impl SagaEvent {
    pub fn new(
        transaction_id: impl Into<String>,
        order_id: impl Into<String>,
        payload: DocumentPayload,
        source: EventSource,
        status: SagaStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            transaction_id: transaction_id.into(),
            order_id: order_id.into(),
            payload,
            source,
            created_at: Utc::now(),
            status,
            event_history: Vec::new(),
        }
    }

    /// Parse an inbound message body.
    pub fn from_json(raw: &str) -> DomainResult<Self> {
        let event: Self = serde_json::from_str(raw)
            .map_err(|e| DomainError::InvalidInput(format!("malformed saga event: {e}")))?;
        if event.transaction_id.trim().is_empty() {
            return Err(DomainError::InvalidInput(
                "saga event has an empty transactionId".to_string(),
            ));
        }
        Ok(event)
    }

    pub fn to_json(&self) -> DomainResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.event_history
    }

    /// Append a history entry. Timestamps never go backwards.
    pub fn push_history(&mut self, source: EventSource, status: SagaStatus, message: impl Into<String>) {
        let mut created_at = Utc::now();
        if let Some(last) = self.event_history.last() {
            created_at = created_at.max(last.created_at);
        }
        self.event_history.push(HistoryEntry {
            source,
            status,
            message: message.into(),
            created_at,
        });
    }

    /// Derive the outcome event this participant publishes.
    #[must_use]
    pub fn outcome(&self, status: SagaStatus, message: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.source = EventSource::DocumentBotService;
        next.status = status;
        next.push_history(EventSource::DocumentBotService, status, message);
        if let Some(last) = next.event_history.last() {
            next.created_at = last.created_at;
        }
        next
    }

    /// Whether `self` extends `earlier` without rewriting any entry.
    pub fn history_extends(&self, earlier: &Self) -> bool {
        self.event_history.len() >= earlier.event_history.len()
            && self.event_history[..earlier.event_history.len()] == earlier.event_history[..]
    }
}

/// What an inbound event asks this participant to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaCommand {
    /// Index the payload document
    Create,
    /// Remove whatever was indexed for the payload document
    Compensate,
}

impl SagaCommand {
    pub fn from_status(status: SagaStatus) -> Option<Self> {
        match status {
            SagaStatus::Success => Some(Self::Create),
            SagaStatus::RollbackPending => Some(Self::Compensate),
            SagaStatus::Fail => None,
        }
    }
}

/// Lifecycle of one transaction inside this participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaPhase {
    Received,
    Processing,
    Succeeded,
    RollbackPending,
    Compensated,
    Failed,
}

/// Events that move a transaction between phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SagaTrigger {
    Begin,
    IndexSucceeded,
    IndexFailed,
    RollbackRequested,
    CompensationApplied,
    CompensationFailed,
}

impl fmt::Display for SagaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "RECEIVED",
            Self::Processing => "PROCESSING",
            Self::Succeeded => "SUCCESS",
            Self::RollbackPending => "ROLLBACK_PENDING",
            Self::Compensated => "SUCCESS(compensated)",
            Self::Failed => "FAIL",
        };
        f.write_str(name)
    }
}

impl SagaPhase {
    /// No further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Compensated | Self::Failed)
    }

    /// An outcome event has been produced for this phase.
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Succeeded | Self::Compensated | Self::Failed)
    }

    /// Wire status reported for this phase.
    pub const fn status(self) -> Option<SagaStatus> {
        match self {
            Self::Succeeded | Self::Compensated => Some(SagaStatus::Success),
            Self::Failed => Some(SagaStatus::Fail),
            Self::RollbackPending => Some(SagaStatus::RollbackPending),
            Self::Received | Self::Processing => None,
        }
    }

    /// The transition table.
    pub fn transition(self, trigger: SagaTrigger) -> DomainResult<Self> {
        use SagaPhase as P;
        use SagaTrigger as T;

        let next = match (self, trigger) {
            (P::Received, T::Begin) => P::Processing,
            (P::Processing, T::IndexSucceeded) => P::Succeeded,
            (P::Processing, T::IndexFailed) => P::Failed,
            (P::Received | P::Processing | P::Succeeded, T::RollbackRequested) => {
                P::RollbackPending
            }
            (P::RollbackPending, T::CompensationApplied) => P::Compensated,
            (P::RollbackPending, T::CompensationFailed) => P::Failed,
            (from, trigger) => {
                return Err(DomainError::InvalidStateTransition {
                    from: from.to_string(),
                    to: format!("{trigger:?}"),
                    reason: "no transition defined".to_string(),
                })
            }
        };
        Ok(next)
    }
}
