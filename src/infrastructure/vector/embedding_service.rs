//! Local embedding provider
//!
//! Deterministic feature-hashing embeddings: each lowercased word and each
//! adjacent word pair is hashed to a signed bucket, and the result is L2
//! normalized. Texts sharing vocabulary land close together, which is enough
//! for local runs and tests without a model server.

use async_trait::async_trait;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::collections::DEFAULT_DIMENSION;
use crate::domain::ports::{EmbeddingInput, EmbeddingOutput, EmbeddingProvider};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Deterministic in-process embedding provider
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimension: usize,
    max_batch_size: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize, max_batch_size: usize) -> DomainResult<Self> {
        if dimension == 0 {
            return Err(DomainError::ValidationFailed(
                "embedding dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            max_batch_size: max_batch_size.max(1),
        })
    }

    /// Generate the embedding for `text`.
    pub fn generate(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        for word in &words {
            self.accumulate(&mut embedding, word.as_bytes(), 1.0);
        }
        for pair in words.windows(2) {
            let joined = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut embedding, joined.as_bytes(), 0.5);
        }

        // Use f64 for magnitude calculation to avoid accumulation errors with many dimensions
        let magnitude_f64: f64 = embedding
            .iter()
            .map(|x| f64::from(*x) * f64::from(*x))
            .sum::<f64>()
            .sqrt();

        if magnitude_f64 > 1e-10 {
            #[allow(clippy::cast_possible_truncation)]
            let magnitude = magnitude_f64 as f32;
            for val in &mut embedding {
                *val /= magnitude;
            }
        } else {
            // Empty text maps to the uniform unit vector
            #[allow(clippy::cast_precision_loss)]
            let uniform_val = 1.0 / (self.dimension as f32).sqrt();
            embedding.fill(uniform_val);
        }

        embedding
    }

    fn accumulate(&self, embedding: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        #[allow(clippy::cast_possible_truncation)]
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        embedding[bucket] += sign * weight;
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            max_batch_size: 128,
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> DomainResult<Vec<f32>> {
        Ok(self.generate(text))
    }

    async fn embed_batch(&self, inputs: &[EmbeddingInput]) -> DomainResult<Vec<EmbeddingOutput>> {
        Ok(inputs
            .iter()
            .map(|input| EmbeddingOutput {
                id: input.id.clone(),
                vector: self.generate(&input.text),
            })
            .collect())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l2(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn test_embed_single() {
        let provider = HashEmbeddingProvider::default();
        let embedding = provider.embed("Hello world").await.unwrap();
        assert_eq!(embedding.len(), 384);
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_order() {
        let provider = HashEmbeddingProvider::default();
        let inputs: Vec<EmbeddingInput> = ["Hello", "World", "Test"]
            .iter()
            .enumerate()
            .map(|(i, text)| EmbeddingInput {
                id: i.to_string(),
                text: (*text).to_string(),
            })
            .collect();

        let outputs = provider.embed_batch(&inputs).await.unwrap();
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[1].id, "1");
        assert_eq!(outputs[1].vector, provider.generate("World"));
    }

    #[test]
    fn test_zero_dimension_is_rejected() {
        assert!(HashEmbeddingProvider::new(0, 8).is_err());
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let provider = HashEmbeddingProvider::default();
        let query = provider.generate("solar panel installation");
        let related = provider.generate("Installation of solar panel arrays");
        let unrelated = provider.generate("medieval poetry anthology");
        assert!(l2(&query, &related) < l2(&query, &unrelated));
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let provider = HashEmbeddingProvider::default();
        assert_eq!(provider.generate("Hello, World!"), provider.generate("hello world"));
    }

    #[test]
    fn test_empty_text_is_unit_vector() {
        let provider = HashEmbeddingProvider::new(16, 4).unwrap();
        let embedding = provider.generate("");
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }
}
