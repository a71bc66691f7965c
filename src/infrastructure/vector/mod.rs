//! Vector infrastructure components
//!
//! Text chunking, local embedding generation and the in-process vector
//! store used for local runs and tests.

pub mod chunker;
pub mod embedding_service;
pub mod memory_store;

pub use chunker::{Chunker, Chunks};
pub use embedding_service::HashEmbeddingProvider;
pub use memory_store::InMemoryVectorStore;
