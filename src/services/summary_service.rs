//! Document summarisation through the text generation collaborator.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::errors::DomainResult;
use crate::domain::models::DocumentKey;
use crate::domain::ports::TextGenerator;
use crate::services::indexing_service::IndexingService;

const SYSTEM_PROMPT: &str = "You summarise project documents. Answer with a short, factual summary \
of the text the user sends, in the language of the text.";

pub struct SummaryService {
    indexing: Arc<IndexingService>,
    generator: Arc<dyn TextGenerator>,
}

impl SummaryService {
    pub fn new(indexing: Arc<IndexingService>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            indexing,
            generator,
        }
    }

    /// Reassembled text of a document version, `None` when nothing is indexed.
    pub async fn document_text(&self, key: &DocumentKey) -> DomainResult<Option<String>> {
        let chunks = self.indexing.document_chunks(key).await?;
        let mut texts = chunks.iter().map(|c| c.text.as_str());
        let Some(first) = texts.next() else {
            return Ok(None);
        };
        Ok(Some(texts.fold(first.to_string(), |acc, next| join_overlapping(&acc, next))))
    }

    #[instrument(skip(self), fields(source_id = %key.source_id(), generator = self.generator.name()))]
    pub async fn summarize_document(&self, key: &DocumentKey) -> DomainResult<Option<String>> {
        let Some(text) = self.document_text(key).await? else {
            debug!("document has no chunks");
            return Ok(None);
        };
        let summary = self.generator.generate(SYSTEM_PROMPT, &text).await?;
        Ok(Some(summary))
    }
}

/// Append `next` to `text`, dropping the words `next` repeats from the end of `text`.
fn join_overlapping(text: &str, next: &str) -> String {
    let tail: Vec<&str> = text.split_whitespace().collect();
    let head: Vec<&str> = next.split_whitespace().collect();
    let longest = tail.len().min(head.len());
    let overlap = (1..=longest)
        .rev()
        .find(|&k| tail[tail.len() - k..] == head[..k])
        .unwrap_or(0);

    let rest = head[overlap..].join(" ");
    if rest.is_empty() {
        text.to_string()
    } else {
        format!("{text} {rest}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainError;
    use crate::domain::models::ChunkingConfig;
    use crate::infrastructure::vector::{Chunker, HashEmbeddingProvider, InMemoryVectorStore};
    use crate::services::embedding_pipeline::EmbeddingPipeline;
    use crate::services::indexing_service::NewDocument;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Echoes the prompt back so tests can see what was sent
    #[derive(Default)]
    struct EchoGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn generate(&self, _system: &str, prompt: &str) -> DomainResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(format!("summary of {} words", prompt.split_whitespace().count()))
        }
    }

    struct BrokenGenerator;

    #[async_trait]
    impl TextGenerator for BrokenGenerator {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn generate(&self, _system: &str, _prompt: &str) -> DomainResult<String> {
            Err(DomainError::GenerationFailed("model offline".to_string()))
        }
    }

    fn indexing() -> Arc<IndexingService> {
        let pipeline = Arc::new(EmbeddingPipeline::new(
            Arc::new(Chunker::with_config(ChunkingConfig::whitespace(5, 2)).unwrap()),
            Arc::new(HashEmbeddingProvider::new(8, 8).unwrap()),
            8,
            Duration::from_secs(5),
        ));
        Arc::new(IndexingService::new(
            Arc::new(InMemoryVectorStore::with_default_collections(8)),
            pipeline,
            Duration::from_secs(5),
        ))
    }

    fn key() -> DocumentKey {
        DocumentKey {
            project_id: 1,
            document_id: 1,
            version: 1,
        }
    }

    #[test]
    fn test_join_overlapping_drops_repeated_words() {
        assert_eq!(join_overlapping("a b c d", "c d e"), "a b c d e");
        assert_eq!(join_overlapping("a b", "c"), "a b c");
        assert_eq!(join_overlapping("a b", "a b"), "a b");
    }

    #[tokio::test]
    async fn test_summary_uses_reassembled_text() {
        let indexing = indexing();
        let text = (1..=12).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        indexing
            .create_document(&NewDocument {
                key: key(),
                name: "plan".to_string(),
                text: text.clone(),
            })
            .await
            .unwrap();

        let generator = Arc::new(EchoGenerator::default());
        let service = SummaryService::new(indexing, generator.clone());

        let summary = service.summarize_document(&key()).await.unwrap();
        assert_eq!(summary.as_deref(), Some("summary of 12 words"));
        assert_eq!(generator.prompts.lock().unwrap()[0], text);
    }

    #[tokio::test]
    async fn test_missing_document_has_no_summary() {
        let service = SummaryService::new(indexing(), Arc::new(BrokenGenerator));
        assert!(service.summarize_document(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_generation_errors_surface() {
        let indexing = indexing();
        indexing
            .create_document(&NewDocument {
                key: key(),
                name: "plan".to_string(),
                text: "some text".to_string(),
            })
            .await
            .unwrap();
        let service = SummaryService::new(indexing, Arc::new(BrokenGenerator));
        assert!(matches!(
            service.summarize_document(&key()).await,
            Err(DomainError::GenerationFailed(_))
        ));
    }
}
