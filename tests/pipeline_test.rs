//! Chunking, embedding and indexing of whole documents.

mod common;

use std::sync::Arc;

use common::{hash_pipeline, words, DIM, TIMEOUT};
use docbot::domain::models::{DocumentKey, DOCUMENTS};
use docbot::infrastructure::vector::InMemoryVectorStore;
use docbot::services::{IndexingService, NewDocument};

#[tokio::test]
async fn test_long_text_splits_into_overlapping_windows() {
    let pipeline = hash_pipeline(128, 10);
    let text = words(300);

    let chunks = pipeline.chunk_and_embed("1/1@1", &text).await.unwrap();

    assert_eq!(chunks.len(), 3);
    let indexes: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indexes, vec![1, 2, 3]);
    assert!(chunks.iter().all(|c| c.embedding.len() == DIM));
    assert!(chunks.iter().all(|c| c.source_id == "1/1@1"));

    // the second window starts ten tokens before the first one ends
    assert!(chunks[0].text.ends_with("w118 w119 w120 w121 w122 w123 w124 w125 w126 w127"));
    assert!(chunks[1].text.starts_with("w118 "));
    assert!(chunks[2].text.ends_with("w299"));
}

#[tokio::test]
async fn test_chunking_is_deterministic() {
    let pipeline = hash_pipeline(16, 4);
    let text = words(70);

    let first = pipeline.chunk_and_embed("doc", &text).await.unwrap();
    let second = pipeline.chunk_and_embed("doc", &text).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_empty_text_yields_no_chunks() {
    let pipeline = hash_pipeline(16, 4);
    assert!(pipeline.chunk_and_embed("doc", "   ").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_indexed_document_round_trips_through_store() {
    let store = Arc::new(InMemoryVectorStore::with_default_collections(DIM));
    let indexing = IndexingService::new(store.clone(), hash_pipeline(10, 2), TIMEOUT);
    let key = DocumentKey {
        project_id: 3,
        document_id: 9,
        version: 2,
    };

    let ids = indexing
        .create_document(&NewDocument {
            key,
            name: "handbook".to_string(),
            text: words(25),
        })
        .await
        .unwrap();
    assert_eq!(ids.len(), 3);
    assert_eq!(store.count(DOCUMENTS).await, 3);

    let chunks = indexing.document_chunks(&key).await.unwrap();
    let indexes: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indexes, vec![1, 2, 3]);
    assert!(chunks.iter().all(|c| c.name == "handbook" && c.key() == key));

    assert_eq!(indexing.delete_document_version(&key).await.unwrap(), 3);
    assert_eq!(store.count(DOCUMENTS).await, 0);
}
