//! In-memory saga ledger

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::DomainResult;
use crate::domain::ports::{SagaLedger, SagaRecord};

/// Ledger keeping per-transaction state for the lifetime of the process
#[derive(Debug, Default)]
pub struct InMemorySagaLedger {
    records: RwLock<HashMap<String, SagaRecord>>,
}

impl InMemorySagaLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SagaLedger for InMemorySagaLedger {
    async fn get(&self, transaction_id: &str) -> DomainResult<Option<SagaRecord>> {
        Ok(self.records.read().await.get(transaction_id).cloned())
    }

    async fn put(&self, record: SagaRecord) -> DomainResult<()> {
        self.records
            .write()
            .await
            .insert(record.transaction_id.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::SagaPhase;

    #[tokio::test]
    async fn test_put_replaces_previous_record() {
        let ledger = InMemorySagaLedger::new();
        assert!(ledger.get("tx").await.unwrap().is_none());

        ledger.put(SagaRecord::new("tx", SagaPhase::Processing)).await.unwrap();
        ledger.put(SagaRecord::new("tx", SagaPhase::Succeeded)).await.unwrap();

        let record = ledger.get("tx").await.unwrap().unwrap();
        assert_eq!(record.phase, SagaPhase::Succeeded);
        assert_eq!(ledger.len().await, 1);
    }
}
