//! Process-scoped wiring.
//!
//! Builds the store handle, embedding provider and services once from the
//! loaded configuration and hands them out by reference.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::adapters::embeddings::{HttpEmbeddingConfig, HttpEmbeddingProvider};
use crate::adapters::generation::{HttpGenerationConfig, HttpTextGenerator};
use crate::domain::errors::DomainResult;
use crate::domain::models::{Config, EmbeddingProviderKind};
use crate::domain::ports::{EmbeddingProvider, EventPublisher, SagaLedger, TextGenerator};
use crate::infrastructure::saga_ledger::InMemorySagaLedger;
use crate::infrastructure::vector::{Chunker, HashEmbeddingProvider, InMemoryVectorStore};
use crate::services::{
    EmbeddingPipeline, IndexingService, ReportService, RetrievalService, RetryPolicy,
    SagaCoordinator, SummaryService,
};

pub struct AppContext {
    pub config: Config,
    pub store: Arc<InMemoryVectorStore>,
    pub pipeline: Arc<EmbeddingPipeline>,
    pub indexing: Arc<IndexingService>,
    pub retrieval: Arc<RetrievalService>,
    pub ledger: Arc<dyn SagaLedger>,
    snapshot: Option<PathBuf>,
}

impl AppContext {
    pub async fn build(config: Config) -> DomainResult<Self> {
        let dimension = config.embedding.dimension;
        let snapshot = config.store.snapshot_path.as_ref().map(PathBuf::from);
        let store = Arc::new(match &snapshot {
            Some(path) => InMemoryVectorStore::open(path, dimension).await?,
            None => InMemoryVectorStore::with_default_collections(dimension),
        });

        let provider: Arc<dyn EmbeddingProvider> = match config.embedding.provider {
            EmbeddingProviderKind::Hash => Arc::new(HashEmbeddingProvider::new(
                dimension,
                config.embedding.batch_size,
            )?),
            EmbeddingProviderKind::Http => Arc::new(HttpEmbeddingProvider::new(
                HttpEmbeddingConfig::from(&config.embedding),
            )?),
        };
        let pipeline = Arc::new(EmbeddingPipeline::new(
            Arc::new(Chunker::with_config(config.chunking.clone())?),
            provider,
            config.embedding.batch_size,
            Duration::from_millis(config.embedding.timeout_ms),
        ));

        let store_timeout = Duration::from_millis(config.store.timeout_ms);
        let indexing = Arc::new(IndexingService::new(
            store.clone(),
            pipeline.clone(),
            store_timeout,
        ));
        let retrieval = Arc::new(RetrievalService::new(
            store.clone(),
            pipeline.clone(),
            config.retrieval.clone(),
            store_timeout,
        ));

        info!(
            provider = pipeline.provider_name(),
            dimension,
            snapshot = ?snapshot,
            "application context ready"
        );
        Ok(Self {
            config,
            store,
            pipeline,
            indexing,
            retrieval,
            ledger: Arc::new(InMemorySagaLedger::new()),
            snapshot,
        })
    }

    /// Saga coordinator publishing outcomes through `publisher`.
    pub fn coordinator(&self, publisher: Arc<dyn EventPublisher>) -> SagaCoordinator {
        SagaCoordinator::new(
            self.indexing.clone(),
            self.ledger.clone(),
            publisher,
            RetryPolicy::from(&self.config.saga),
            self.config.broker.result_topic.clone(),
            Duration::from_millis(self.config.broker.publish_timeout_ms),
        )
    }

    pub fn text_generator(&self) -> DomainResult<Arc<dyn TextGenerator>> {
        Ok(Arc::new(HttpTextGenerator::new(HttpGenerationConfig::from(
            &self.config.generation,
        ))?))
    }

    pub fn reports(&self, generator: Arc<dyn TextGenerator>) -> ReportService {
        let summaries = Arc::new(SummaryService::new(self.indexing.clone(), generator));
        ReportService::new(self.retrieval.clone(), self.indexing.clone(), summaries)
    }

    /// Write the store snapshot when one is configured.
    pub async fn persist(&self) -> DomainResult<()> {
        if let Some(path) = &self.snapshot {
            self.store.save(path).await?;
        }
        Ok(())
    }
}
