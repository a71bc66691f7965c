//! In-process vector store
//!
//! Exact (brute force) L2 search over named collections with scalar
//! filtering, auto-assigned primary keys, forward-only cursors and JSON
//! snapshots. Distances are Euclidean; `nprobe` is accepted and ignored.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AnnSearchRequest, CollectionSchema, FieldValue, FilterExpr, IteratorRequest, QueryRequest,
    Record, SearchHit, SortKey,
};
use crate::domain::ports::{SearchCursor, VectorStoreGateway};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Collection {
    schema: CollectionSchema,
    next_id: i64,
    records: BTreeMap<i64, Record>,
}

impl Collection {
    fn new(schema: CollectionSchema) -> Self {
        Self {
            schema,
            next_id: 1,
            records: BTreeMap::new(),
        }
    }
}

/// On-disk form of the store
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    collections: Vec<Collection>,
}

/// Failures to inject into subsequent calls
#[derive(Debug, Default)]
struct FaultPlan {
    unavailable: bool,
    /// Records accepted before inserts start failing
    insert_budget: Option<usize>,
    fail_deletes: bool,
    /// Deletes that fail before deletes succeed again
    delete_failures: usize,
    /// 1-based cursor fetch that fails
    cursor_failure_at: Option<usize>,
    /// 1-based cursor fetch that never completes
    cursor_stall_at: Option<usize>,
}

/// In-memory implementation of [`VectorStoreGateway`]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
    faults: Mutex<FaultPlan>,
    open_cursors: Arc<AtomicUsize>,
}

impl InMemoryVectorStore {
    pub fn new(schemas: Vec<CollectionSchema>) -> Self {
        let collections = schemas
            .into_iter()
            .map(|schema| (schema.name.clone(), Collection::new(schema)))
            .collect();
        Self {
            collections: RwLock::new(collections),
            faults: Mutex::new(FaultPlan::default()),
            open_cursors: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Store with the documents, lectures and projects collections.
    pub fn with_default_collections(dimension: usize) -> Self {
        Self::new(CollectionSchema::all(dimension))
    }

    /// Load a snapshot, or start empty when the file does not exist yet.
    pub async fn open(path: &Path, dimension: usize) -> DomainResult<Self> {
        if !path.exists() {
            return Ok(Self::with_default_collections(dimension));
        }
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DomainError::store("load_snapshot", e.to_string()))?;
        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        if let Some(mismatch) = snapshot
            .collections
            .iter()
            .find(|c| c.schema.dimension != dimension)
        {
            return Err(DomainError::ValidationFailed(format!(
                "snapshot collection '{}' has dimension {}, configured {dimension}",
                mismatch.schema.name, mismatch.schema.dimension
            )));
        }
        let store = Self::with_default_collections(dimension);
        {
            let mut collections = store.collections.write().await;
            for collection in snapshot.collections {
                collections.insert(collection.schema.name.clone(), collection);
            }
        }
        Ok(store)
    }

    /// Write every collection to `path` as JSON.
    pub async fn save(&self, path: &Path) -> DomainResult<()> {
        let snapshot = {
            let collections = self.collections.read().await;
            let mut all: Vec<Collection> = collections.values().cloned().collect();
            all.sort_by(|a, b| a.schema.name.cmp(&b.schema.name));
            Snapshot { collections: all }
        };
        let raw = serde_json::to_string(&snapshot)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::store("save_snapshot", e.to_string()))?;
        }
        tokio::fs::write(path, raw)
            .await
            .map_err(|e| DomainError::store("save_snapshot", e.to_string()))
    }

    /// Number of records in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, |c| c.records.len())
    }

    /// Cursors opened and not yet closed.
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(AtomicOrdering::SeqCst)
    }

    /// Make every call fail as if the store were unreachable.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().await.unavailable = unavailable;
    }

    /// Accept `records` more records, then fail inserts part way through.
    pub async fn fail_inserts_after(&self, records: usize) {
        self.faults.lock().await.insert_budget = Some(records);
    }

    pub async fn set_fail_deletes(&self, fail: bool) {
        self.faults.lock().await.fail_deletes = fail;
    }

    /// Fail only the next `deletes` delete calls.
    pub async fn fail_next_deletes(&self, deletes: usize) {
        self.faults.lock().await.delete_failures = deletes;
    }

    /// Fail the `fetch`-th batch of the next cursors.
    pub async fn fail_cursor_fetch(&self, fetch: usize) {
        self.faults.lock().await.cursor_failure_at = Some(fetch);
    }

    /// Make the `fetch`-th batch of the next cursors hang.
    pub async fn stall_cursor_fetch(&self, fetch: usize) {
        self.faults.lock().await.cursor_stall_at = Some(fetch);
    }

    pub async fn clear_faults(&self) {
        *self.faults.lock().await = FaultPlan::default();
    }

    async fn check_available(&self, operation: &str) -> DomainResult<()> {
        if self.faults.lock().await.unavailable {
            return Err(DomainError::store(operation, "store is unreachable"));
        }
        Ok(())
    }

    /// Filtered, sorted hits for a vector search.
    fn rank(
        collection: &Collection,
        field: &str,
        vector: &[f32],
        filter: Option<&FilterExpr>,
        output_fields: &[&str],
    ) -> DomainResult<Vec<SearchHit>> {
        if !collection.schema.has_vector(field) {
            return Err(DomainError::ValidationFailed(format!(
                "collection '{}' has no embedding field '{field}'",
                collection.schema.name
            )));
        }
        if vector.len() != collection.schema.dimension {
            return Err(DomainError::ValidationFailed(format!(
                "query vector has dimension {}, expected {}",
                vector.len(),
                collection.schema.dimension
            )));
        }
        if let Some(filter) = filter {
            filter.validate()?;
        }

        let mut hits: Vec<SearchHit> = collection
            .records
            .iter()
            .filter(|(_, record)| filter.is_none_or(|f| f.matches(record)))
            .filter_map(|(id, record)| {
                record.vector(field).map(|stored| SearchHit {
                    id: *id,
                    distance: l2_distance(stored, vector),
                    record: record.project(output_fields),
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        Ok(hits)
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn compare_sort_key(a: &Record, b: &Record, key: &SortKey) -> Ordering {
    let value = |r: &Record| -> Option<FieldValue> {
        if key.field == "id" {
            r.id.map(FieldValue::Int)
        } else {
            r.scalar(&key.field).cloned()
        }
    };
    let ordering = match (value(a), value(b)) {
        (Some(FieldValue::Str(x)), Some(FieldValue::Str(y))) => x.cmp(&y),
        (Some(x), Some(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => Ordering::Equal,
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    if key.descending {
        ordering.reverse()
    } else {
        ordering
    }
}

fn missing_collection(operation: &str, name: &str) -> DomainError {
    DomainError::store(operation, format!("collection '{name}' does not exist"))
}

#[async_trait]
impl VectorStoreGateway for InMemoryVectorStore {
    async fn insert(&self, collection: &str, records: Vec<Record>) -> DomainResult<Vec<i64>> {
        self.check_available("insert").await?;
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing_collection("insert", collection))?;

        for record in &records {
            target.schema.validate(record)?;
            if let Some(id) = record.id {
                if target.records.contains_key(&id) {
                    return Err(DomainError::InvalidInput(format!(
                        "primary key {id} already exists in '{collection}'"
                    )));
                }
            }
        }

        let mut faults = self.faults.lock().await;
        let mut ids = Vec::with_capacity(records.len());
        for mut record in records {
            if let Some(budget) = faults.insert_budget.as_mut() {
                if *budget == 0 {
                    return Err(DomainError::store(
                        "insert",
                        format!("write rejected after {} records", ids.len()),
                    ));
                }
                *budget -= 1;
            }
            let id = match record.id {
                Some(id) => id,
                None => {
                    let id = target.next_id;
                    target.next_id += 1;
                    id
                }
            };
            target.next_id = target.next_id.max(id + 1);
            record.id = Some(id);
            target.records.insert(id, record);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn get(&self, collection: &str, ids: &[i64]) -> DomainResult<Vec<Record>> {
        self.check_available("get").await?;
        let collections = self.collections.read().await;
        let source = collections
            .get(collection)
            .ok_or_else(|| missing_collection("get", collection))?;
        Ok(ids
            .iter()
            .filter_map(|id| source.records.get(id).cloned())
            .collect())
    }

    async fn delete(&self, collection: &str, ids: &[i64]) -> DomainResult<usize> {
        self.check_available("delete").await?;
        {
            let mut faults = self.faults.lock().await;
            if faults.delete_failures > 0 {
                faults.delete_failures -= 1;
                return Err(DomainError::store("delete", "delete rejected"));
            }
            if faults.fail_deletes {
                return Err(DomainError::store("delete", "delete rejected"));
            }
        }
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing_collection("delete", collection))?;
        Ok(ids
            .iter()
            .filter(|id| target.records.remove(id).is_some())
            .count())
    }

    async fn upsert(&self, collection: &str, record: Record) -> DomainResult<i64> {
        self.check_available("upsert").await?;
        let Some(id) = record.id else {
            return Err(DomainError::InvalidInput(
                "upsert requires a primary key".to_string(),
            ));
        };
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing_collection("upsert", collection))?;
        target.schema.validate(&record)?;
        target.next_id = target.next_id.max(id + 1);
        target.records.insert(id, record);
        Ok(id)
    }

    async fn query(&self, collection: &str, request: &QueryRequest) -> DomainResult<Vec<Record>> {
        self.check_available("query").await?;
        request.filter.validate()?;
        let collections = self.collections.read().await;
        let source = collections
            .get(collection)
            .ok_or_else(|| missing_collection("query", collection))?;

        let output_fields: Vec<&str> = request.output_fields.iter().map(String::as_str).collect();
        let mut records: Vec<Record> = source
            .records
            .values()
            .filter(|record| request.filter.matches(record))
            .map(|record| record.project(&output_fields))
            .collect();

        records.sort_by(|a, b| {
            request
                .sort
                .iter()
                .map(|key| compare_sort_key(a, b, key))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or_else(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = request.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn search(&self, collection: &str, request: &AnnSearchRequest) -> DomainResult<Vec<SearchHit>> {
        self.check_available("search").await?;
        request.validate()?;
        let collections = self.collections.read().await;
        let source = collections
            .get(collection)
            .ok_or_else(|| missing_collection("search", collection))?;

        let mut hits = Self::rank(
            source,
            &request.field,
            &request.vector,
            request.filter.as_ref(),
            &request.output_field_refs(),
        )?;
        hits.truncate(request.limit);
        Ok(hits)
    }

    async fn iterate(
        &self,
        collection: &str,
        request: &IteratorRequest,
    ) -> DomainResult<Box<dyn SearchCursor>> {
        self.check_available("iterate").await?;
        request.validate()?;
        let hits = {
            let collections = self.collections.read().await;
            let source = collections
                .get(collection)
                .ok_or_else(|| missing_collection("iterate", collection))?;
            let output_fields: Vec<&str> =
                request.output_fields.iter().map(String::as_str).collect();
            let mut hits = Self::rank(
                source,
                &request.field,
                &request.vector,
                request.filter.as_ref(),
                &output_fields,
            )?;
            hits.truncate(request.limit);
            hits
        };

        let (fail_at, stall_at) = {
            let faults = self.faults.lock().await;
            (faults.cursor_failure_at, faults.cursor_stall_at)
        };
        self.open_cursors.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(Box::new(InMemoryCursor {
            hits: hits.into_iter(),
            batch_size: request.batch_size,
            fetches: 0,
            fail_at,
            stall_at,
            open: Some(Arc::clone(&self.open_cursors)),
        }))
    }
}

/// Cursor over a search snapshot taken when it was opened
struct InMemoryCursor {
    hits: std::vec::IntoIter<SearchHit>,
    batch_size: usize,
    fetches: usize,
    fail_at: Option<usize>,
    stall_at: Option<usize>,
    open: Option<Arc<AtomicUsize>>,
}

impl InMemoryCursor {
    fn release(&mut self) {
        if let Some(counter) = self.open.take() {
            counter.fetch_sub(1, AtomicOrdering::SeqCst);
        }
    }
}

/// A cursor abandoned without `close`, e.g. by a cancelled search, still
/// gives its slot back.
impl Drop for InMemoryCursor {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl SearchCursor for InMemoryCursor {
    async fn next_batch(&mut self) -> DomainResult<Vec<SearchHit>> {
        if self.open.is_none() {
            return Err(DomainError::store("next_batch", "cursor is closed"));
        }
        self.fetches += 1;
        if self.fail_at == Some(self.fetches) {
            return Err(DomainError::store(
                "next_batch",
                format!("cursor fetch {} failed", self.fetches),
            ));
        }
        if self.stall_at == Some(self.fetches) {
            std::future::pending::<()>().await;
        }
        Ok(self.hits.by_ref().take(self.batch_size).collect())
    }

    async fn close(&mut self) -> DomainResult<()> {
        self.release();
        Ok(())
    }
}
