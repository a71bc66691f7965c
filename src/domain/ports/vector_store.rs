//! Vector store gateway port.
//!
//! Collection-scoped access to an external store that provides approximate
//! nearest neighbour search, scalar filtering and persistence. Hits come back
//! ordered by ascending distance, ties by primary key. Finding nothing is an
//! empty result, never an error.

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AnnSearchRequest, IteratorRequest, QueryRequest, RankedHit, Record, SearchHit, WeightedRanker,
};

/// Forward-only server-side cursor over search results.
#[async_trait]
pub trait SearchCursor: Send {
    /// Next batch of hits. An empty batch means the cursor is exhausted.
    async fn next_batch(&mut self) -> DomainResult<Vec<SearchHit>>;

    /// Release the server-side cursor. Closing twice is a no-op.
    async fn close(&mut self) -> DomainResult<()>;
}

#[async_trait]
pub trait VectorStoreGateway: Send + Sync {
    /// Insert records, returning their primary keys in input order.
    async fn insert(&self, collection: &str, records: Vec<Record>) -> DomainResult<Vec<i64>>;

    /// Fetch records by primary key. Missing ids are skipped.
    async fn get(&self, collection: &str, ids: &[i64]) -> DomainResult<Vec<Record>>;

    /// Delete records by primary key, returning how many existed.
    async fn delete(&self, collection: &str, ids: &[i64]) -> DomainResult<usize>;

    /// Insert or replace the record with the given id.
    async fn upsert(&self, collection: &str, record: Record) -> DomainResult<i64>;

    /// Scalar query.
    async fn query(&self, collection: &str, request: &QueryRequest) -> DomainResult<Vec<Record>>;

    /// ANN search over one embedding field.
    async fn search(&self, collection: &str, request: &AnnSearchRequest) -> DomainResult<Vec<SearchHit>>;

    /// Open a paged search cursor.
    async fn iterate(
        &self,
        collection: &str,
        request: &IteratorRequest,
    ) -> DomainResult<Box<dyn SearchCursor>>;

    /// One sub-search per request, merged by the weighted ranker.
    async fn hybrid_search(
        &self,
        collection: &str,
        requests: &[AnnSearchRequest],
        ranker: &WeightedRanker,
        limit: usize,
    ) -> DomainResult<Vec<RankedHit>> {
        let sub_results =
            try_join_all(requests.iter().map(|request| self.search(collection, request))).await?;
        ranker.rerank(sub_results, limit)
    }

    /// Delete every record matching the filter, returning how many were removed.
    async fn delete_where(&self, collection: &str, request: &QueryRequest) -> DomainResult<usize> {
        let ids: Vec<i64> = self
            .query(collection, request)
            .await?
            .into_iter()
            .filter_map(|record| record.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        self.delete(collection, &ids).await
    }
}
