//! Adapters for external HTTP services.

pub mod embeddings;
pub mod generation;
