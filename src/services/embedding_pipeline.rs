//! Chunking and embedding pipeline.
//!
//! Turns raw text into token-bounded chunks and chunks into vectors, grouping
//! up to `batch_size` chunks per model invocation. The pipeline holds no state
//! between calls.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EmbeddedChunk, TextChunk};
use crate::domain::ports::{EmbeddingInput, EmbeddingProvider};
use crate::infrastructure::vector::Chunker;
use crate::services::timeouts::bounded;

pub struct EmbeddingPipeline {
    chunker: Arc<Chunker>,
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    timeout: Duration,
}

impl EmbeddingPipeline {
    pub fn new(
        chunker: Arc<Chunker>,
        provider: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
        timeout: Duration,
    ) -> Self {
        let batch_size = batch_size.clamp(1, provider.max_batch_size().max(1));
        Self {
            chunker,
            provider,
            batch_size,
            timeout,
        }
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Split text into numbered token windows.
    pub fn chunk(&self, text: &str) -> DomainResult<Vec<TextChunk>> {
        self.chunker.chunk(text)?.collect()
    }

    /// Embed a single text, e.g. a query.
    pub async fn embed(&self, text: &str) -> DomainResult<Vec<f32>> {
        let vector = bounded("embed", self.timeout, self.provider.embed(text)).await?;
        self.check_dimension(&vector)?;
        Ok(vector)
    }

    /// Embed texts in batches; the result is aligned 1:1 with `texts`.
    #[instrument(skip(self, texts), fields(count = texts.len(), batch_size = self.batch_size))]
    pub async fn embed_batch(&self, texts: &[String]) -> DomainResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (batch_number, batch) in texts.chunks(self.batch_size).enumerate() {
            let inputs: Vec<EmbeddingInput> = batch
                .iter()
                .enumerate()
                .map(|(i, text)| EmbeddingInput {
                    id: (batch_number * self.batch_size + i).to_string(),
                    text: text.clone(),
                })
                .collect();

            let outputs =
                bounded("embed_batch", self.timeout, self.provider.embed_batch(&inputs)).await?;
            if outputs.len() != inputs.len() {
                return Err(DomainError::EmbeddingFailure(format!(
                    "provider returned {} vectors for {} texts",
                    outputs.len(),
                    inputs.len()
                )));
            }
            for output in outputs {
                self.check_dimension(&output.vector)?;
                vectors.push(output.vector);
            }
            debug!(batch = batch_number + 1, size = batch.len(), "embedded batch");
        }
        Ok(vectors)
    }

    /// Chunk `text` and embed every chunk.
    pub async fn chunk_and_embed(&self, source_id: &str, text: &str) -> DomainResult<Vec<EmbeddedChunk>> {
        let chunks = self.chunk(text)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed_batch(&texts).await?;

        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| EmbeddedChunk {
                source_id: source_id.to_string(),
                chunk_index: chunk.chunk_index,
                text: chunk.text,
                embedding,
            })
            .collect())
    }

    fn check_dimension(&self, vector: &[f32]) -> DomainResult<()> {
        if vector.len() == self.dimension() {
            Ok(())
        } else {
            Err(DomainError::EmbeddingFailure(format!(
                "embedding has dimension {}, expected {}",
                vector.len(),
                self.dimension()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ChunkingConfig;
    use crate::domain::ports::EmbeddingOutput;
    use crate::infrastructure::vector::HashEmbeddingProvider;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records the size of every batch it receives
    struct CountingProvider {
        inner: HashEmbeddingProvider,
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        async fn embed(&self, text: &str) -> DomainResult<Vec<f32>> {
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, inputs: &[EmbeddingInput]) -> DomainResult<Vec<EmbeddingOutput>> {
            self.batches.lock().unwrap().push(inputs.len());
            self.inner.embed_batch(inputs).await
        }

        fn max_batch_size(&self) -> usize {
            64
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl EmbeddingProvider for SlowProvider {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn dimension(&self) -> usize {
            4
        }

        async fn embed(&self, _text: &str) -> DomainResult<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![0.0; 4])
        }

        async fn embed_batch(&self, _inputs: &[EmbeddingInput]) -> DomainResult<Vec<EmbeddingOutput>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }

        fn max_batch_size(&self) -> usize {
            8
        }
    }

    fn chunker(size: usize, overlap: usize) -> Arc<Chunker> {
        Arc::new(Chunker::with_config(ChunkingConfig::whitespace(size, overlap)).unwrap())
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[tokio::test]
    async fn test_batches_never_exceed_batch_size() {
        let provider = Arc::new(CountingProvider {
            inner: HashEmbeddingProvider::new(16, 64).unwrap(),
            batches: Mutex::new(Vec::new()),
        });
        let pipeline = EmbeddingPipeline::new(chunker(4, 0), provider.clone(), 3, Duration::from_secs(5));

        let chunks = pipeline.chunk_and_embed("1/1@1", &words(28)).await.unwrap();

        assert_eq!(chunks.len(), 7);
        assert_eq!(*provider.batches.lock().unwrap(), vec![3, 3, 1]);
        assert!(chunks.iter().all(|c| c.embedding.len() == 16));
        assert_eq!(
            chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(),
            (1..=7).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_batch_size_is_capped_by_provider() {
        let provider = Arc::new(HashEmbeddingProvider::new(8, 2).unwrap());
        let pipeline = EmbeddingPipeline::new(chunker(4, 0), provider, 128, Duration::from_secs(5));
        assert_eq!(pipeline.batch_size(), 2);
    }

    #[tokio::test]
    async fn test_embed_batch_is_aligned_with_input() {
        let provider = Arc::new(HashEmbeddingProvider::new(32, 2).unwrap());
        let pipeline = EmbeddingPipeline::new(chunker(4, 0), provider.clone(), 2, Duration::from_secs(5));
        let texts: Vec<String> = ["alpha", "beta", "gamma"].iter().map(ToString::to_string).collect();

        let vectors = pipeline.embed_batch(&texts).await.unwrap();
        for (text, vector) in texts.iter().zip(&vectors) {
            assert_eq!(vector, &provider.generate(text));
        }
    }

    #[tokio::test]
    async fn test_blank_text_yields_no_chunks() {
        let provider = Arc::new(HashEmbeddingProvider::new(8, 4).unwrap());
        let pipeline = EmbeddingPipeline::new(chunker(4, 1), provider, 4, Duration::from_secs(5));
        assert!(pipeline.chunk_and_embed("s", "   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_text_is_invalid_input() {
        let provider = Arc::new(HashEmbeddingProvider::new(8, 4).unwrap());
        let pipeline = EmbeddingPipeline::new(chunker(4, 1), provider, 4, Duration::from_secs(5));
        assert!(matches!(
            pipeline.chunk_and_embed("s", "nul\u{0}byte").await,
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out() {
        let pipeline = EmbeddingPipeline::new(
            chunker(4, 1),
            Arc::new(SlowProvider),
            4,
            Duration::from_millis(100),
        );
        let err = pipeline.embed("query").await.unwrap_err();
        assert!(matches!(err, DomainError::Timeout { .. }));
        assert!(err.is_retryable());
    }
}
