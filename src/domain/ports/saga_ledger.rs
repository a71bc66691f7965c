//! Per-transaction saga state used for idempotency.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::{SagaEvent, SagaPhase};

/// What this participant knows about a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaRecord {
    pub transaction_id: String,
    pub phase: SagaPhase,
    /// Last outcome event produced, re-emitted on redelivery
    pub last_outcome: Option<SagaEvent>,
    pub updated_at: DateTime<Utc>,
}

impl SagaRecord {
    pub fn new(transaction_id: impl Into<String>, phase: SagaPhase) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            phase,
            last_outcome: None,
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait SagaLedger: Send + Sync {
    async fn get(&self, transaction_id: &str) -> DomainResult<Option<SagaRecord>>;

    async fn put(&self, record: SagaRecord) -> DomainResult<()>;
}
