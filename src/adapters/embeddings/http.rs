//! HTTP embedding provider adapter.
//!
//! Talks to any OpenAI-compatible `/embeddings` endpoint (hosted APIs or a
//! local sentence-transformers server).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::EmbeddingConfig;
use crate::domain::ports::embedding::{EmbeddingInput, EmbeddingOutput, EmbeddingProvider};

/// Environment variable consulted when no key is configured
pub const API_KEY_ENV: &str = "DOCBOT_EMBEDDING_API_KEY";

/// Configuration for the HTTP embedding provider.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingConfig {
    /// API key. Optional for local servers.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Expected embedding dimension
    pub dimension: usize,
    pub timeout: Duration,
    /// Maximum texts per single request
    pub max_batch_size: usize,
}

impl From<&EmbeddingConfig> for HttpEmbeddingConfig {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimension: config.dimension,
            timeout: Duration::from_millis(config.timeout_ms),
            max_batch_size: config.batch_size.max(1),
        }
    }
}

impl HttpEmbeddingConfig {
    fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.is_empty())
    }
}

/// HTTP embedding provider.
pub struct HttpEmbeddingProvider {
    config: HttpEmbeddingConfig,
    client: reqwest::Client,
}

impl HttpEmbeddingProvider {
    pub fn new(config: HttpEmbeddingConfig) -> DomainResult<Self> {
        if config.dimension == 0 {
            return Err(DomainError::ValidationFailed(
                "embedding dimension must be greater than 0".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DomainError::EmbeddingFailure(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    async fn call_embeddings_api(&self, texts: Vec<String>) -> DomainResult<Vec<Vec<f32>>> {
        let expected = texts.len();
        let url = format!("{}/embeddings", self.config.base_url);
        let request_body = EmbeddingsRequest {
            model: self.config.model.clone(),
            input: texts,
        };

        let mut request = self.client.post(&url).json(&request_body);
        if let Some(api_key) = self.config.api_key() {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DomainError::EmbeddingFailure(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(DomainError::EmbeddingFailure(format!(
                "embedding API returned {status}: {body}"
            )));
        }

        let result: EmbeddingsResponse = response.json().await.map_err(|e| {
            DomainError::EmbeddingFailure(format!("failed to parse embedding response: {e}"))
        })?;

        // Sort by index to maintain input order
        let mut data = result.data;
        data.sort_by_key(|d| d.index);

        if data.len() != expected {
            return Err(DomainError::EmbeddingFailure(format!(
                "requested {expected} embeddings, received {}",
                data.len()
            )));
        }
        if let Some(bad) = data.iter().find(|d| d.embedding.len() != self.config.dimension) {
            return Err(DomainError::EmbeddingFailure(format!(
                "model returned dimension {}, expected {}",
                bad.embedding.len(),
                self.config.dimension
            )));
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed(&self, text: &str) -> DomainResult<Vec<f32>> {
        self.call_embeddings_api(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::EmbeddingFailure("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, inputs: &[EmbeddingInput]) -> DomainResult<Vec<EmbeddingOutput>> {
        let mut all_outputs = Vec::with_capacity(inputs.len());
        for chunk in inputs.chunks(self.config.max_batch_size) {
            let texts = chunk.iter().map(|i| i.text.clone()).collect();
            let vectors = self.call_embeddings_api(texts).await?;
            all_outputs.extend(chunk.iter().zip(vectors).map(|(input, vector)| EmbeddingOutput {
                id: input.id.clone(),
                vector,
            }));
        }
        Ok(all_outputs)
    }

    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn config(base_url: String, dimension: usize, max_batch_size: usize) -> HttpEmbeddingConfig {
        HttpEmbeddingConfig {
            api_key: Some("test-key".to_string()),
            base_url,
            model: "mini".to_string(),
            dimension,
            timeout: Duration::from_secs(5),
            max_batch_size,
        }
    }

    fn inputs(texts: &[&str]) -> Vec<EmbeddingInput> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| EmbeddingInput {
                id: i.to_string(),
                text: (*text).to_string(),
            })
            .collect()
    }

    #[test]
    fn test_config_from_domain() {
        let domain = EmbeddingConfig {
            base_url: "http://host/v1/".to_string(),
            ..EmbeddingConfig::default()
        };
        let config = HttpEmbeddingConfig::from(&domain);
        assert_eq!(config.base_url, "http://host/v1");
        assert_eq!(config.dimension, 384);
        assert_eq!(config.max_batch_size, 128);
    }

    #[tokio::test]
    async fn test_embed_batch_reorders_by_index() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({"model": "mini"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data":[{"embedding":[0.0,1.0],"index":1},{"embedding":[1.0,0.0],"index":0}]}"#,
            )
            .create_async()
            .await;

        let provider = HttpEmbeddingProvider::new(config(server.url(), 2, 8)).unwrap();
        let outputs = provider.embed_batch(&inputs(&["a", "b"])).await.unwrap();

        mock.assert_async().await;
        assert_eq!(outputs[0].vector, vec![1.0, 0.0]);
        assert_eq!(outputs[1].id, "1");
        assert_eq!(outputs[1].vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_embed_batch_splits_by_max_batch_size() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_body(r#"{"data":[{"embedding":[1.0],"index":0}]}"#)
            .expect(3)
            .create_async()
            .await;

        let provider = HttpEmbeddingProvider::new(config(server.url(), 1, 1)).unwrap();
        let outputs = provider.embed_batch(&inputs(&["a", "b", "c"])).await.unwrap();

        mock.assert_async().await;
        assert_eq!(outputs.len(), 3);
    }

    #[tokio::test]
    async fn test_server_error_is_embedding_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let provider = HttpEmbeddingProvider::new(config(server.url(), 2, 8)).unwrap();
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err, DomainError::EmbeddingFailure(ref msg) if msg.contains("503")));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_body(r#"{"data":[{"embedding":[1.0,2.0,3.0],"index":0}]}"#)
            .create_async()
            .await;

        let provider = HttpEmbeddingProvider::new(config(server.url(), 2, 8)).unwrap();
        assert!(matches!(
            provider.embed("hello").await,
            Err(DomainError::EmbeddingFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        let provider =
            HttpEmbeddingProvider::new(config("http://127.0.0.1:9".to_string(), 2, 8)).unwrap();
        assert!(provider.embed_batch(&[]).await.unwrap().is_empty());
    }
}
