//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces that infrastructure adapters implement:
//! - EmbeddingProvider: text to vector
//! - VectorStoreGateway / SearchCursor: external vector store
//! - MessageConsumer / EventPublisher: saga message stream
//! - SagaLedger: per-transaction idempotency state
//! - TextGenerator: external completion model

pub mod embedding;
pub mod message_stream;
pub mod saga_ledger;
pub mod text_generator;
pub mod vector_store;

pub use embedding::{EmbeddingInput, EmbeddingOutput, EmbeddingProvider};
pub use message_stream::{EventPublisher, InboundMessage, MessageConsumer};
pub use saga_ledger::{SagaLedger, SagaRecord};
pub use text_generator::TextGenerator;
pub use vector_store::{SearchCursor, VectorStoreGateway};
