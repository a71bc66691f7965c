//! Common test utilities for integration tests
//!
//! Shared fixtures: in-process store, broker and ledger wired to the real
//! services, plus an embedding provider that returns a fixed query vector.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use docbot::domain::errors::DomainResult;
use docbot::domain::models::{
    ChunkingConfig, DocumentPayload, EventSource, RetrievalConfig, SagaEvent, SagaStatus,
};
use docbot::domain::ports::{EmbeddingInput, EmbeddingOutput, EmbeddingProvider};
use docbot::infrastructure::broker::InMemoryBroker;
use docbot::infrastructure::saga_ledger::InMemorySagaLedger;
use docbot::infrastructure::vector::{Chunker, HashEmbeddingProvider, InMemoryVectorStore};
use docbot::services::{
    EmbeddingPipeline, IndexingService, RetrievalService, RetryPolicy, SagaCoordinator,
};

pub const DIM: usize = 16;
pub const CREATE_TOPIC: &str = "document-bot-success";
pub const ROLLBACK_TOPIC: &str = "document-bot-fail";
pub const RESULT_TOPIC: &str = "orchestrator";

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Setup test logging
#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Embedding provider answering every text with the same vector
pub struct FixedProvider {
    pub vector: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for FixedProvider {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn dimension(&self) -> usize {
        self.vector.len()
    }

    async fn embed(&self, _text: &str) -> DomainResult<Vec<f32>> {
        Ok(self.vector.clone())
    }

    async fn embed_batch(&self, inputs: &[EmbeddingInput]) -> DomainResult<Vec<EmbeddingOutput>> {
        Ok(inputs
            .iter()
            .map(|input| EmbeddingOutput {
                id: input.id.clone(),
                vector: self.vector.clone(),
            })
            .collect())
    }

    fn max_batch_size(&self) -> usize {
        16
    }
}

pub fn hash_pipeline(tokens_per_chunk: usize, overlap: usize) -> Arc<EmbeddingPipeline> {
    Arc::new(EmbeddingPipeline::new(
        Arc::new(Chunker::with_config(ChunkingConfig::whitespace(tokens_per_chunk, overlap)).unwrap()),
        Arc::new(HashEmbeddingProvider::new(DIM, 8).unwrap()),
        8,
        TIMEOUT,
    ))
}

/// Retrieval over `store` where every query embeds to `query`.
pub fn fixed_retrieval(store: Arc<InMemoryVectorStore>, query: Vec<f32>) -> RetrievalService {
    let pipeline = Arc::new(EmbeddingPipeline::new(
        Arc::new(Chunker::with_config(ChunkingConfig::whitespace(8, 0)).unwrap()),
        Arc::new(FixedProvider { vector: query }),
        8,
        TIMEOUT,
    ));
    RetrievalService::new(store, pipeline, RetrievalConfig::default(), TIMEOUT)
}

/// Everything the saga participant needs, in memory
pub struct SagaHarness {
    pub store: Arc<InMemoryVectorStore>,
    pub broker: InMemoryBroker,
    pub ledger: Arc<InMemorySagaLedger>,
    pub coordinator: Arc<SagaCoordinator>,
}

impl SagaHarness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryVectorStore::with_default_collections(DIM));
        let indexing = Arc::new(IndexingService::new(store.clone(), hash_pipeline(4, 0), TIMEOUT));
        let broker = InMemoryBroker::new();
        let ledger = Arc::new(InMemorySagaLedger::new());
        let coordinator = Arc::new(SagaCoordinator::new(
            indexing,
            ledger.clone(),
            Arc::new(broker.clone()),
            RetryPolicy::new(2, 1, 5),
            RESULT_TOPIC,
            TIMEOUT,
        ));
        Self {
            store,
            broker,
            ledger,
            coordinator,
        }
    }

    pub fn inbound_topics() -> Vec<String> {
        vec![CREATE_TOPIC.to_string(), ROLLBACK_TOPIC.to_string()]
    }

    /// Queue an orchestrator event on the topic matching its status.
    pub fn send(&self, event: &SagaEvent) {
        let topic = match event.status {
            SagaStatus::RollbackPending => ROLLBACK_TOPIC,
            SagaStatus::Success | SagaStatus::Fail => CREATE_TOPIC,
        };
        self.broker
            .send(topic, Some(&event.transaction_id), event.to_json().unwrap())
            .unwrap();
    }

    pub fn outcomes(&self) -> Vec<SagaEvent> {
        self.broker
            .messages(RESULT_TOPIC)
            .iter()
            .map(|m| SagaEvent::from_json(&m.payload).unwrap())
            .collect()
    }
}

/// An orchestrator command for document `document_id` of project 1.
pub fn command(transaction_id: &str, status: SagaStatus, document_id: i64, text: &str) -> SagaEvent {
    let mut event = SagaEvent::new(
        transaction_id,
        format!("order-{transaction_id}"),
        DocumentPayload {
            project_id: Some(1),
            document_id: Some(document_id),
            name: Some(format!("doc-{document_id}")),
            version: Some(1),
            text: Some(text.to_string()),
        },
        EventSource::Orchestrator,
        status,
    );
    event.push_history(EventSource::Orchestrator, status, "Saga started!");
    event
}

pub fn words(n: usize) -> String {
    (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
}
