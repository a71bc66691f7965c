//! Hybrid retrieval engine.
//!
//! Embeds the query once and runs single-field, filtered, multi-field
//! (weighted) or paged searches through the vector store gateway. Retrieval
//! never retries: store failures surface as
//! [`DomainError::RetrievalBackend`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    fields, AnnSearchRequest, FilterExpr, IteratorRequest, PagedResults, RankedHit, RetrievalConfig,
    SearchHit, WeightedRanker, PROJECTS,
};
use crate::domain::ports::{SearchCursor, VectorStoreGateway};
use crate::services::embedding_pipeline::EmbeddingPipeline;
use crate::services::timeouts::bounded;

/// Single-field semantic query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub collection: String,
    pub field: String,
    pub text: String,
    #[serde(default)]
    pub filter: Option<FilterExpr>,
    /// Falls back to the configured default limit
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub output_fields: Vec<String>,
}

impl SearchQuery {
    pub fn new(collection: &str, field: &str, text: &str) -> Self {
        Self {
            collection: collection.to_string(),
            field: field.to_string(),
            text: text.to_string(),
            filter: None,
            limit: None,
            output_fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_output_fields(mut self, fields: &[&str]) -> Self {
        self.output_fields = fields.iter().map(ToString::to_string).collect();
        self
    }
}

/// One embedding field of a hybrid query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridField {
    pub field: String,
    /// Relative, non-negative
    pub weight: f32,
    /// Candidates for this field; raised to the final limit when lower
    #[serde(default)]
    pub sub_limit: Option<usize>,
    #[serde(default)]
    pub nprobe: Option<u32>,
}

impl HybridField {
    pub fn new(field: &str, weight: f32) -> Self {
        Self {
            field: field.to_string(),
            weight,
            sub_limit: None,
            nprobe: None,
        }
    }
}

/// Multi-field weighted query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridQuery {
    pub collection: String,
    pub text: String,
    pub fields: Vec<HybridField>,
    #[serde(default)]
    pub filter: Option<FilterExpr>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub output_fields: Vec<String>,
}

/// Paged query over a server-side cursor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterateQuery {
    pub collection: String,
    pub field: String,
    pub text: String,
    #[serde(default)]
    pub filter: Option<FilterExpr>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    pub limit: usize,
    #[serde(default)]
    pub output_fields: Vec<String>,
}

/// A project returned by the project search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectHit {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub project_type: String,
    pub budget: i64,
    /// Composite score, lower is better
    pub score: f32,
}

impl ProjectHit {
    fn from_ranked(hit: &RankedHit) -> Self {
        let record = &hit.record;
        Self {
            id: hit.id,
            name: record.str(fields::NAME).unwrap_or_default().to_string(),
            description: record.str(fields::DESCRIPTION).unwrap_or_default().to_string(),
            project_type: record.str(fields::PROJECT_TYPE).unwrap_or_default().to_string(),
            budget: record.int(fields::BUDGET).unwrap_or_default(),
            score: hit.score,
        }
    }
}

pub struct RetrievalService {
    store: Arc<dyn VectorStoreGateway>,
    pipeline: Arc<EmbeddingPipeline>,
    config: RetrievalConfig,
    store_timeout: Duration,
}

impl RetrievalService {
    pub fn new(
        store: Arc<dyn VectorStoreGateway>,
        pipeline: Arc<EmbeddingPipeline>,
        config: RetrievalConfig,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            pipeline,
            config,
            store_timeout,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Nearest neighbours on one embedding field, optionally filtered.
    #[instrument(skip(self, query), fields(collection = %query.collection, field = %query.field))]
    pub async fn search(&self, query: &SearchQuery) -> DomainResult<Vec<SearchHit>> {
        if let Some(filter) = &query.filter {
            filter.validate()?;
        }
        let vector = self.pipeline.embed(&query.text).await?;
        let limit = query.limit.unwrap_or(self.config.default_limit);

        let mut request = AnnSearchRequest::new(&query.field, vector, limit).with_nprobe(self.config.nprobe);
        request.output_fields.clone_from(&query.output_fields);
        if let Some(filter) = &query.filter {
            request = request.with_filter(filter.clone());
        }
        request.validate()?;

        let hits = bounded(
            "store.search",
            self.store_timeout,
            self.store.search(&query.collection, &request),
        )
        .await
        .map_err(backend)?;
        debug!(hits = hits.len(), "search finished");
        Ok(hits)
    }

    /// Search whose scalar predicate is mandatory.
    pub async fn filtered_search(&self, query: &SearchQuery) -> DomainResult<Vec<SearchHit>> {
        if query.filter.is_none() {
            return Err(DomainError::InvalidInput(
                "filtered search requires a filter".to_string(),
            ));
        }
        self.search(query).await
    }

    /// One sub-search per field merged by the weighted reranker.
    #[instrument(skip(self, query), fields(collection = %query.collection, fields = query.fields.len()))]
    pub async fn hybrid_search(&self, query: &HybridQuery) -> DomainResult<Vec<RankedHit>> {
        if query.fields.is_empty() {
            return Err(DomainError::InvalidInput(
                "hybrid search needs at least one field".to_string(),
            ));
        }
        if let Some(filter) = &query.filter {
            filter.validate()?;
        }
        let ranker = WeightedRanker::new(query.fields.iter().map(|f| f.weight).collect())?
            .with_missing_policy(self.config.missing_field_policy);
        let limit = query.limit.unwrap_or(self.config.default_limit);
        let vector = self.pipeline.embed(&query.text).await?;

        let requests = query
            .fields
            .iter()
            .map(|field| {
                let sub_limit = field.sub_limit.unwrap_or(self.config.sub_limit).max(limit);
                let mut request = AnnSearchRequest::new(&field.field, vector.clone(), sub_limit)
                    .with_nprobe(field.nprobe.unwrap_or(self.config.nprobe));
                request.output_fields.clone_from(&query.output_fields);
                if let Some(filter) = &query.filter {
                    request = request.with_filter(filter.clone());
                }
                request.validate().map(|()| request)
            })
            .collect::<DomainResult<Vec<_>>>()?;

        let ranked = bounded(
            "store.hybrid_search",
            self.store_timeout,
            self.store
                .hybrid_search(&query.collection, &requests, &ranker, limit),
        )
        .await
        .map_err(backend)?;
        debug!(hits = ranked.len(), "hybrid search finished");
        Ok(ranked)
    }

    /// Drain a server-side cursor up to `limit` records.
    ///
    /// The cursor is closed on every exit path.
    #[instrument(skip(self, query), fields(collection = %query.collection, limit = query.limit))]
    pub async fn iterate_search(&self, query: &IterateQuery) -> DomainResult<PagedResults> {
        let vector = self.pipeline.embed(&query.text).await?;
        let request = IteratorRequest {
            field: query.field.clone(),
            vector,
            filter: query.filter.clone(),
            batch_size: query.batch_size.unwrap_or(self.config.iterator_batch_size),
            limit: query.limit,
            output_fields: query.output_fields.clone(),
        };
        request.validate()?;

        let mut cursor = bounded(
            "store.iterate",
            self.store_timeout,
            self.store.iterate(&query.collection, &request),
        )
        .await
        .map_err(backend)?;

        let drained = self.drain(cursor.as_mut(), query.limit).await;
        let closed = cursor.close().await;

        let results = drained.map_err(backend)?;
        if let Err(err) = closed {
            warn!(error = %err, "failed to close search cursor");
        }
        debug!(hits = results.hits.len(), batches = results.batches, "iteration finished");
        Ok(results)
    }

    async fn drain(&self, cursor: &mut dyn SearchCursor, limit: usize) -> DomainResult<PagedResults> {
        let mut results = PagedResults::default();
        while results.hits.len() < limit {
            let batch = bounded("store.next_batch", self.store_timeout, cursor.next_batch()).await?;
            if batch.is_empty() {
                break;
            }
            results.batches += 1;
            let room = limit - results.hits.len();
            results.hits.extend(batch.into_iter().take(room));
        }
        Ok(results)
    }

    /// Project search over name and description embeddings.
    pub async fn search_projects(&self, term: &str) -> DomainResult<Vec<ProjectHit>> {
        let query = HybridQuery {
            collection: PROJECTS.to_string(),
            text: term.to_string(),
            fields: vec![
                HybridField::new(fields::NAME_EMBEDDING, self.config.project_name_weight),
                HybridField::new(
                    fields::DESCRIPTION_EMBEDDING,
                    self.config.project_description_weight,
                ),
            ],
            filter: None,
            limit: Some(self.config.project_limit),
            output_fields: [fields::NAME, fields::DESCRIPTION, fields::PROJECT_TYPE, fields::BUDGET]
                .iter()
                .map(ToString::to_string)
                .collect(),
        };
        Ok(self
            .hybrid_search(&query)
            .await?
            .iter()
            .map(ProjectHit::from_ranked)
            .collect())
    }
}

/// Store-side failures become retrieval backend errors; caller mistakes pass through.
fn backend(err: DomainError) -> DomainError {
    match err {
        DomainError::StoreUnavailable { .. } | DomainError::Timeout { .. } => {
            DomainError::RetrievalBackend(err.to_string())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ChunkingConfig, DocumentChunk, DOCUMENTS};
    use crate::infrastructure::vector::{Chunker, HashEmbeddingProvider, InMemoryVectorStore};

    const DIM: usize = 32;

    fn pipeline() -> Arc<EmbeddingPipeline> {
        Arc::new(EmbeddingPipeline::new(
            Arc::new(Chunker::with_config(ChunkingConfig::whitespace(16, 2)).unwrap()),
            Arc::new(HashEmbeddingProvider::new(DIM, 16).unwrap()),
            16,
            Duration::from_secs(5),
        ))
    }

    async fn seeded(texts: &[&str]) -> (Arc<InMemoryVectorStore>, RetrievalService) {
        let store = Arc::new(InMemoryVectorStore::with_default_collections(DIM));
        let provider = HashEmbeddingProvider::new(DIM, 16).unwrap();
        let records = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                DocumentChunk {
                    id: None,
                    project_id: 1,
                    document_id: i as i64 + 1,
                    name: format!("doc-{i}"),
                    version: 1,
                    chunk_index: 1,
                    text: (*text).to_string(),
                    text_embedding: provider.generate(text),
                }
                .to_record()
            })
            .collect();
        store.insert(DOCUMENTS, records).await.unwrap();
        let service = RetrievalService::new(
            store.clone(),
            pipeline(),
            RetrievalConfig::default(),
            Duration::from_secs(5),
        );
        (store, service)
    }

    #[tokio::test]
    async fn test_search_returns_exact_match_first() {
        let (_, service) = seeded(&["solar farms", "wind turbines", "tidal power"]).await;
        let hits = service
            .search(&SearchQuery::new(DOCUMENTS, fields::TEXT_EMBEDDING, "wind turbines"))
            .await
            .unwrap();
        assert_eq!(hits[0].record.str(fields::TEXT), Some("wind turbines"));
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[tokio::test]
    async fn test_filtered_search_requires_filter() {
        let (_, service) = seeded(&["a"]).await;
        let query = SearchQuery::new(DOCUMENTS, fields::TEXT_EMBEDDING, "a");
        assert!(matches!(
            service.filtered_search(&query).await,
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_unsafe_filter_is_rejected_before_search() {
        let (_, service) = seeded(&["a"]).await;
        let query = SearchQuery::new(DOCUMENTS, fields::TEXT_EMBEDDING, "a")
            .with_filter(FilterExpr::eq("name or 1==1", "x"));
        assert!(service.search(&query).await.is_err());
    }

    #[tokio::test]
    async fn test_store_outage_is_backend_error() {
        let (store, service) = seeded(&["a"]).await;
        store.set_unavailable(true).await;
        let result = service
            .search(&SearchQuery::new(DOCUMENTS, fields::TEXT_EMBEDDING, "a"))
            .await;
        assert!(matches!(result, Err(DomainError::RetrievalBackend(_))));
    }

    #[tokio::test]
    async fn test_hybrid_requires_fields_and_valid_weights() {
        let (_, service) = seeded(&["a"]).await;
        let mut query = HybridQuery {
            collection: DOCUMENTS.to_string(),
            text: "a".to_string(),
            fields: vec![],
            filter: None,
            limit: Some(2),
            output_fields: vec![],
        };
        assert!(service.hybrid_search(&query).await.is_err());

        query.fields = vec![HybridField::new(fields::TEXT_EMBEDDING, -1.0)];
        assert!(matches!(
            service.hybrid_search(&query).await,
            Err(DomainError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_iterator_closes_cursor_on_fetch_failure() {
        let texts: Vec<String> = (0..12).map(|i| format!("text {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let (store, service) = seeded(&refs).await;
        store.fail_cursor_fetch(2).await;

        let result = service
            .iterate_search(&IterateQuery {
                collection: DOCUMENTS.to_string(),
                field: fields::TEXT_EMBEDDING.to_string(),
                text: "text".to_string(),
                filter: None,
                batch_size: Some(5),
                limit: 12,
                output_fields: vec![],
            })
            .await;

        assert!(matches!(result, Err(DomainError::RetrievalBackend(_))));
        assert_eq!(store.open_cursors(), 0);
    }
}
