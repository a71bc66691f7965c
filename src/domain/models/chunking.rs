//! Text chunking domain models
//!
//! Documents are split into overlapping token windows before embedding.
//! Chunk indices are 1-based and contiguous per source.

use serde::{Deserialize, Serialize};

/// Tokenizer used to measure chunk windows
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerKind {
    /// Maximal runs of non-whitespace characters
    Whitespace,
    /// `cl100k_base` byte-pair encoding
    #[default]
    Cl100k,
}

/// Configuration for document chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum size of each chunk in tokens
    #[serde(default = "default_tokens_per_chunk")]
    pub tokens_per_chunk: usize,

    /// Overlap between consecutive chunks in tokens
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Tokenizer that defines what a token is
    #[serde(default)]
    pub tokenizer: TokenizerKind,
}

const fn default_tokens_per_chunk() -> usize {
    128
}

const fn default_chunk_overlap() -> usize {
    10
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            tokens_per_chunk: default_tokens_per_chunk(),
            chunk_overlap: default_chunk_overlap(),
            tokenizer: TokenizerKind::default(),
        }
    }
}

impl ChunkingConfig {
    /// Whitespace-tokenized windows of the given size and overlap
    pub fn whitespace(tokens_per_chunk: usize, chunk_overlap: usize) -> Self {
        Self {
            tokens_per_chunk,
            chunk_overlap,
            tokenizer: TokenizerKind::Whitespace,
        }
    }

    /// Validate the chunking configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.tokens_per_chunk == 0 {
            return Err("tokens_per_chunk must be greater than 0".to_string());
        }

        if self.chunk_overlap >= self.tokens_per_chunk {
            return Err("chunk_overlap must be less than tokens_per_chunk".to_string());
        }

        Ok(())
    }

    /// Number of windows a text of `token_count` tokens produces
    pub fn expected_chunks(&self, token_count: usize) -> usize {
        if token_count == 0 {
            return 0;
        }
        if token_count <= self.tokens_per_chunk {
            return 1;
        }
        let stride = self.tokens_per_chunk - self.chunk_overlap;
        1 + (token_count - self.tokens_per_chunk).div_ceil(stride)
    }
}

/// A window of text produced by the chunker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextChunk {
    /// Position of the chunk within its source, starting at 1
    pub chunk_index: u32,

    /// The text content of this chunk
    pub text: String,

    /// Number of tokens in this chunk
    pub token_count: usize,
}

/// A chunk paired with its embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedChunk {
    /// Identifier of the document the chunk was cut from
    pub source_id: String,

    /// Position of the chunk within its source, starting at 1
    pub chunk_index: u32,

    pub text: String,

    /// Dense vector of the configured dimension
    pub embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChunkingConfig::default();
        assert_eq!(config.tokens_per_chunk, 128);
        assert_eq!(config.chunk_overlap, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        assert!(ChunkingConfig::whitespace(0, 0).validate().is_err());
        assert!(ChunkingConfig::whitespace(10, 10).validate().is_err());
        assert!(ChunkingConfig::whitespace(10, 11).validate().is_err());
    }

    #[test]
    fn test_expected_chunks() {
        let config = ChunkingConfig::whitespace(128, 10);
        assert_eq!(config.expected_chunks(0), 0);
        assert_eq!(config.expected_chunks(1), 1);
        assert_eq!(config.expected_chunks(128), 1);
        assert_eq!(config.expected_chunks(129), 2);
        assert_eq!(config.expected_chunks(246), 2);
        assert_eq!(config.expected_chunks(300), 3);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: ChunkingConfig = serde_json::from_str(r#"{"tokenizer":"whitespace"}"#).unwrap();
        assert_eq!(config.tokens_per_chunk, 128);
        assert_eq!(config.tokenizer, TokenizerKind::Whitespace);
    }
}
