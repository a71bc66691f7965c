//! Collection services for documents, lectures and projects.
//!
//! Document inserts are all-or-nothing per document version: a failed insert
//! removes whatever chunks it managed to write, and a successful one replaces
//! any chunks previously indexed under the same key. When the older chunks
//! cannot be removed the new ones are withdrawn again, so a key never holds
//! two chunk sets.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    fields, DocumentChunk, DocumentKey, DocumentPayload, FilterExpr, LectureChunk, Project,
    QueryRequest, Record, DOCUMENTS, LECTURES, PROJECTS,
};
use crate::domain::ports::VectorStoreGateway;
use crate::services::embedding_pipeline::EmbeddingPipeline;
use crate::services::timeouts::bounded;

/// A document version to index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub key: DocumentKey,
    pub name: String,
    pub text: String,
}

impl NewDocument {
    pub fn from_payload(payload: &DocumentPayload) -> DomainResult<Self> {
        Ok(Self {
            key: payload.key()?,
            name: payload.name.clone().unwrap_or_default(),
            text: payload.text()?.to_string(),
        })
    }
}

/// One indexed document version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: i64,
    pub version: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLecture {
    pub name: String,
    pub content: String,
    pub difficulty: i64,
    pub min_age: i64,
    pub max_age: i64,
    pub creator_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub budget: i64,
    #[serde(rename = "type")]
    pub project_type: String,
}

pub struct IndexingService {
    store: Arc<dyn VectorStoreGateway>,
    pipeline: Arc<EmbeddingPipeline>,
    store_timeout: Duration,
}

impl IndexingService {
    pub fn new(
        store: Arc<dyn VectorStoreGateway>,
        pipeline: Arc<EmbeddingPipeline>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            pipeline,
            store_timeout,
        }
    }

    // ---- documents ----

    /// Chunk, embed and insert a document version.
    pub async fn create_document(&self, document: &NewDocument) -> DomainResult<Vec<i64>> {
        let chunks = self.prepare_document(document).await?;
        self.insert_document(document.key, chunks).await
    }

    /// Chunk and embed a document without touching the store.
    pub async fn prepare_document(&self, document: &NewDocument) -> DomainResult<Vec<DocumentChunk>> {
        let source_id = document.key.source_id();
        let embedded = self.pipeline.chunk_and_embed(&source_id, &document.text).await?;
        if embedded.is_empty() {
            return Err(DomainError::InvalidInput(format!(
                "document {source_id} produced no chunks"
            )));
        }
        Ok(embedded
            .into_iter()
            .map(|chunk| DocumentChunk {
                id: None,
                project_id: document.key.project_id,
                document_id: document.key.document_id,
                name: document.name.clone(),
                version: document.key.version,
                chunk_index: chunk.chunk_index,
                text: chunk.text,
                text_embedding: chunk.embedding,
            })
            .collect())
    }

    /// Insert prepared chunks for `key` as one unit.
    ///
    /// On failure every chunk written by this call is removed before the
    /// error is returned. On success older chunks of the key are deleted; if
    /// that delete fails the new chunks are removed and the delete error is
    /// returned.
    #[instrument(skip(self, chunks), fields(source_id = %key.source_id(), chunks = chunks.len()))]
    pub async fn insert_document(&self, key: DocumentKey, chunks: Vec<DocumentChunk>) -> DomainResult<Vec<i64>> {
        let previous = self.document_ids(&key).await?;
        let records: Vec<Record> = chunks.iter().map(DocumentChunk::to_record).collect();

        match bounded(
            "store.insert",
            self.store_timeout,
            self.store.insert(DOCUMENTS, records),
        )
        .await
        {
            Ok(ids) => {
                if !previous.is_empty() {
                    let stale: Vec<i64> = previous.into_iter().collect();
                    match bounded(
                        "store.delete",
                        self.store_timeout,
                        self.store.delete(DOCUMENTS, &stale),
                    )
                    .await
                    {
                        Ok(removed) => debug!(removed, "superseded previous chunks"),
                        Err(err) => {
                            warn!(error = %err, "could not supersede previous chunks, withdrawing new ones");
                            self.withdraw(&key, &ids).await?;
                            return Err(err);
                        }
                    }
                }
                info!(inserted = ids.len(), "document indexed");
                Ok(ids)
            }
            Err(err) => {
                warn!(error = %err, "insert failed, removing partial chunks");
                self.remove_partial(&key, &previous).await?;
                Err(err)
            }
        }
    }

    async fn remove_partial(&self, key: &DocumentKey, previous: &HashSet<i64>) -> DomainResult<()> {
        let written: Vec<i64> = self
            .document_ids(key)
            .await
            .map_err(|e| compensation_failed(key, &e))?
            .into_iter()
            .filter(|id| !previous.contains(id))
            .collect();
        if written.is_empty() {
            return Ok(());
        }
        bounded(
            "store.delete",
            self.store_timeout,
            self.store.delete(DOCUMENTS, &written),
        )
        .await
        .map_err(|e| {
            error!(error = %e, leftover = written.len(), "could not remove partial chunks");
            compensation_failed(key, &e)
        })?;
        Ok(())
    }

    async fn withdraw(&self, key: &DocumentKey, ids: &[i64]) -> DomainResult<()> {
        bounded(
            "store.delete",
            self.store_timeout,
            self.store.delete(DOCUMENTS, ids),
        )
        .await
        .map_err(|e| {
            error!(error = %e, leftover = ids.len(), "could not withdraw new chunks");
            compensation_failed(key, &e)
        })?;
        Ok(())
    }

    async fn document_ids(&self, key: &DocumentKey) -> DomainResult<HashSet<i64>> {
        let request = QueryRequest::new(key.filter()).with_output_fields(&[fields::CHUNK_INDEX]);
        let records = bounded(
            "store.query",
            self.store_timeout,
            self.store.query(DOCUMENTS, &request),
        )
        .await?;
        Ok(records.into_iter().filter_map(|r| r.id).collect())
    }

    /// Chunks of a document version in chunk order.
    pub async fn document_chunks(&self, key: &DocumentKey) -> DomainResult<Vec<DocumentChunk>> {
        let request = QueryRequest::new(key.filter()).sorted_by(&[fields::CHUNK_INDEX]);
        bounded(
            "store.query",
            self.store_timeout,
            self.store.query(DOCUMENTS, &request),
        )
        .await?
        .iter()
        .map(DocumentChunk::from_record)
        .collect()
    }

    pub async fn get_document_chunk(&self, id: i64) -> DomainResult<Option<DocumentChunk>> {
        let records = bounded("store.get", self.store_timeout, self.store.get(DOCUMENTS, &[id])).await?;
        records.first().map(DocumentChunk::from_record).transpose()
    }

    pub async fn delete_document_chunk(&self, id: i64) -> DomainResult<bool> {
        let removed =
            bounded("store.delete", self.store_timeout, self.store.delete(DOCUMENTS, &[id])).await?;
        Ok(removed > 0)
    }

    /// Remove every chunk of a document version, returning how many existed.
    #[instrument(skip(self), fields(source_id = %key.source_id()))]
    pub async fn delete_document_version(&self, key: &DocumentKey) -> DomainResult<usize> {
        let removed = bounded(
            "store.delete_where",
            self.store_timeout,
            self.store.delete_where(DOCUMENTS, &QueryRequest::new(key.filter())),
        )
        .await?;
        info!(removed, "document version removed");
        Ok(removed)
    }

    /// Document versions of a project ordered by document then version.
    pub async fn find_documents_by_project(&self, project_id: i64) -> DomainResult<Vec<DocumentSummary>> {
        let filter = FilterExpr::eq(fields::PROJECT_ID, project_id)
            .and(FilterExpr::eq(fields::CHUNK_INDEX, 1));
        let request = QueryRequest::new(filter)
            .with_output_fields(&[fields::DOCUMENT_ID, fields::VERSION, fields::NAME])
            .sorted_by(&[fields::DOCUMENT_ID, fields::VERSION]);

        let records = bounded(
            "store.query",
            self.store_timeout,
            self.store.query(DOCUMENTS, &request),
        )
        .await?;
        Ok(records
            .iter()
            .filter_map(|r| {
                Some(DocumentSummary {
                    document_id: r.int(fields::DOCUMENT_ID)?,
                    version: r.int(fields::VERSION)?,
                    name: r.str(fields::NAME).unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    // ---- lectures ----

    /// Index a lecture: one record per content chunk, each carrying the
    /// lecture name embedding.
    pub async fn create_lecture(&self, lecture: &NewLecture) -> DomainResult<Vec<i64>> {
        if lecture.name.trim().is_empty() {
            return Err(DomainError::InvalidInput("lecture name is empty".to_string()));
        }
        if lecture.min_age > lecture.max_age {
            return Err(DomainError::InvalidInput(format!(
                "min_age {} exceeds max_age {}",
                lecture.min_age, lecture.max_age
            )));
        }
        let name_embedding = self.pipeline.embed(&lecture.name).await?;
        let chunks = self.pipeline.chunk_and_embed(&lecture.name, &lecture.content).await?;
        if chunks.is_empty() {
            return Err(DomainError::InvalidInput("lecture content is empty".to_string()));
        }

        let records = chunks
            .into_iter()
            .map(|chunk| {
                LectureChunk {
                    id: None,
                    name: lecture.name.clone(),
                    content: chunk.text,
                    difficulty: lecture.difficulty,
                    min_age: lecture.min_age,
                    max_age: lecture.max_age,
                    creator_id: lecture.creator_id,
                    chunk_index: chunk.chunk_index,
                    name_embedding: name_embedding.clone(),
                    content_embedding: chunk.embedding,
                }
                .to_record()
            })
            .collect();
        bounded("store.insert", self.store_timeout, self.store.insert(LECTURES, records)).await
    }

    pub async fn get_lecture_chunk(&self, id: i64) -> DomainResult<Option<LectureChunk>> {
        let records = bounded("store.get", self.store_timeout, self.store.get(LECTURES, &[id])).await?;
        records.first().map(LectureChunk::from_record).transpose()
    }

    /// Replace every chunk of the lecture with the same name and creator.
    pub async fn update_lecture(&self, lecture: &NewLecture) -> DomainResult<Vec<i64>> {
        let filter = FilterExpr::eq(fields::NAME, lecture.name.as_str())
            .and(FilterExpr::eq(fields::CREATOR_ID, lecture.creator_id));
        let removed = bounded(
            "store.delete_where",
            self.store_timeout,
            self.store.delete_where(LECTURES, &QueryRequest::new(filter)),
        )
        .await?;
        debug!(removed, lecture = %lecture.name, "removed previous lecture chunks");
        self.create_lecture(lecture).await
    }

    pub async fn delete_lecture_chunk(&self, id: i64) -> DomainResult<bool> {
        let removed =
            bounded("store.delete", self.store_timeout, self.store.delete(LECTURES, &[id])).await?;
        Ok(removed > 0)
    }

    // ---- projects ----

    pub async fn create_project(&self, project: &NewProject) -> DomainResult<i64> {
        let record = self.project_record(project).await?;
        let ids = bounded(
            "store.insert",
            self.store_timeout,
            self.store.insert(PROJECTS, vec![record]),
        )
        .await?;
        ids.first()
            .copied()
            .ok_or_else(|| DomainError::store("insert", "no primary key returned"))
    }

    pub async fn get_project(&self, id: i64) -> DomainResult<Option<Project>> {
        let records = bounded("store.get", self.store_timeout, self.store.get(PROJECTS, &[id])).await?;
        records.first().map(Project::from_record).transpose()
    }

    /// Upsert the project with freshly computed embeddings.
    pub async fn update_project(&self, project: &NewProject) -> DomainResult<i64> {
        let record = self.project_record(project).await?;
        bounded("store.upsert", self.store_timeout, self.store.upsert(PROJECTS, record)).await
    }

    pub async fn delete_project(&self, id: i64) -> DomainResult<bool> {
        let removed =
            bounded("store.delete", self.store_timeout, self.store.delete(PROJECTS, &[id])).await?;
        Ok(removed > 0)
    }

    async fn project_record(&self, project: &NewProject) -> DomainResult<Record> {
        if project.name.trim().is_empty() {
            return Err(DomainError::InvalidInput("project name is empty".to_string()));
        }
        let mut vectors = self
            .pipeline
            .embed_batch(&[project.name.clone(), project.description.clone()])
            .await?
            .into_iter();
        let (Some(name_embedding), Some(description_embedding)) = (vectors.next(), vectors.next())
        else {
            return Err(DomainError::EmbeddingFailure(
                "project embeddings incomplete".to_string(),
            ));
        };
        Ok(Project {
            id: project.id,
            name: project.name.clone(),
            description: project.description.clone(),
            budget: project.budget,
            project_type: project.project_type.clone(),
            name_embedding,
            description_embedding,
        }
        .to_record())
    }
}

fn compensation_failed(key: &DocumentKey, err: &DomainError) -> DomainError {
    DomainError::CompensationFailure {
        transaction_id: key.source_id(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ChunkingConfig;
    use crate::infrastructure::vector::{Chunker, HashEmbeddingProvider, InMemoryVectorStore};

    const DIM: usize = 16;

    fn service() -> (Arc<InMemoryVectorStore>, IndexingService) {
        let store = Arc::new(InMemoryVectorStore::with_default_collections(DIM));
        let pipeline = Arc::new(EmbeddingPipeline::new(
            Arc::new(Chunker::with_config(ChunkingConfig::whitespace(4, 0)).unwrap()),
            Arc::new(HashEmbeddingProvider::new(DIM, 8).unwrap()),
            8,
            Duration::from_secs(5),
        ));
        let service = IndexingService::new(store.clone(), pipeline, Duration::from_secs(5));
        (store, service)
    }

    fn document(document_id: i64, version: i64, words: usize) -> NewDocument {
        NewDocument {
            key: DocumentKey {
                project_id: 7,
                document_id,
                version,
            },
            name: format!("doc-{document_id}"),
            text: (0..words).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" "),
        }
    }

    #[tokio::test]
    async fn test_create_document_inserts_contiguous_chunks() {
        let (store, service) = service();
        let doc = document(1, 1, 10);

        let ids = service.create_document(&doc).await.unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(store.count(DOCUMENTS).await, 3);

        let chunks = service.document_chunks(&doc.key).await.unwrap();
        assert_eq!(chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_reindexing_supersedes_previous_chunks() {
        let (store, service) = service();
        let doc = document(1, 1, 10);
        let first = service.create_document(&doc).await.unwrap();
        let second = service.create_document(&document(1, 1, 4)).await.unwrap();

        assert_eq!(store.count(DOCUMENTS).await, 1);
        assert!(service.get_document_chunk(first[0]).await.unwrap().is_none());
        assert!(service.get_document_chunk(second[0]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_no_partial_chunks() {
        let (store, service) = service();
        service.create_document(&document(1, 1, 4)).await.unwrap();
        store.fail_inserts_after(2).await;

        let result = service.create_document(&document(1, 1, 20)).await;

        assert!(matches!(result, Err(DomainError::StoreUnavailable { .. })));
        // only the earlier version survives
        assert_eq!(store.count(DOCUMENTS).await, 1);
    }

    #[tokio::test]
    async fn test_failed_cleanup_is_compensation_failure() {
        let (store, service) = service();
        store.fail_inserts_after(1).await;
        store.set_fail_deletes(true).await;

        let result = service.create_document(&document(2, 1, 12)).await;
        assert!(matches!(result, Err(DomainError::CompensationFailure { .. })));
    }

    #[tokio::test]
    async fn test_failed_supersede_keeps_only_previous_chunks() {
        let (store, service) = service();
        let first = service.create_document(&document(1, 1, 8)).await.unwrap();
        store.fail_next_deletes(1).await;

        let result = service.create_document(&document(1, 1, 12)).await;

        assert!(matches!(result, Err(DomainError::StoreUnavailable { .. })));
        assert_eq!(store.count(DOCUMENTS).await, 2);
        for id in first {
            assert!(service.get_document_chunk(id).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_failed_supersede_and_withdraw_is_compensation_failure() {
        let (store, service) = service();
        service.create_document(&document(1, 1, 8)).await.unwrap();
        store.set_fail_deletes(true).await;

        let result = service.create_document(&document(1, 1, 12)).await;
        assert!(matches!(result, Err(DomainError::CompensationFailure { .. })));
    }

    #[tokio::test]
    async fn test_delete_document_version_only_touches_that_version() {
        let (store, service) = service();
        let v1 = document(1, 1, 8);
        service.create_document(&v1).await.unwrap();
        service.create_document(&document(1, 2, 8)).await.unwrap();

        assert_eq!(service.delete_document_version(&v1.key).await.unwrap(), 2);
        assert_eq!(store.count(DOCUMENTS).await, 2);
        assert_eq!(service.delete_document_version(&v1.key).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_documents_by_project_lists_versions() {
        let (_, service) = service();
        service.create_document(&document(2, 1, 8)).await.unwrap();
        service.create_document(&document(1, 2, 8)).await.unwrap();
        service.create_document(&document(1, 1, 8)).await.unwrap();

        let found = service.find_documents_by_project(7).await.unwrap();
        let keys: Vec<(i64, i64)> = found.iter().map(|d| (d.document_id, d.version)).collect();
        assert_eq!(keys, vec![(1, 1), (1, 2), (2, 1)]);
        assert!(service.find_documents_by_project(99).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lecture_update_replaces_chunks() {
        let (store, service) = service();
        let mut lecture = NewLecture {
            name: "Fractions".to_string(),
            content: "one two three four five six seven eight".to_string(),
            difficulty: 2,
            min_age: 8,
            max_age: 10,
            creator_id: 3,
        };
        let ids = service.create_lecture(&lecture).await.unwrap();
        assert_eq!(ids.len(), 2);

        let chunk = service.get_lecture_chunk(ids[0]).await.unwrap().unwrap();
        assert_eq!(chunk.chunk_index, 1);
        assert_eq!(chunk.content, "one two three four");

        lecture.content = "short".to_string();
        service.update_lecture(&lecture).await.unwrap();
        assert_eq!(store.count(LECTURES).await, 1);
    }

    #[tokio::test]
    async fn test_lecture_age_range_is_validated() {
        let (_, service) = service();
        let lecture = NewLecture {
            name: "x".to_string(),
            content: "y".to_string(),
            difficulty: 1,
            min_age: 12,
            max_age: 10,
            creator_id: 1,
        };
        assert!(matches!(
            service.create_lecture(&lecture).await,
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_project_crud() {
        let (_, service) = service();
        let mut project = NewProject {
            id: 42,
            name: "Solar".to_string(),
            description: "Rooftop panels".to_string(),
            budget: 2500,
            project_type: "INTERNAL".to_string(),
        };
        assert_eq!(service.create_project(&project).await.unwrap(), 42);

        project.budget = 3000;
        service.update_project(&project).await.unwrap();
        let stored = service.get_project(42).await.unwrap().unwrap();
        assert_eq!(stored.budget, 3000);
        assert_eq!(stored.name_embedding.len(), DIM);

        assert!(service.delete_project(42).await.unwrap());
        assert!(service.get_project(42).await.unwrap().is_none());
    }
}
