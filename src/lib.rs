//! Docbot - document bot saga participant and hybrid retrieval engine
//!
//! Docbot indexes project documents, lectures and projects into a vector
//! store on behalf of a saga orchestrator and answers semantic queries over
//! them.
//!
//! # Architecture
//!
//! The crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Service Layer** (`services`): embedding pipeline, retrieval, indexing and the saga coordinator
//! - **Infrastructure Layer** (`infrastructure`): chunker, in-process store, broker, ledger, config and logging
//! - **Adapters** (`adapters`): HTTP embedding and text generation clients
//! - **Application Layer** (`application`): process-scoped wiring
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use docbot::application::AppContext;
//! use docbot::domain::models::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let context = AppContext::build(Config::default()).await?;
//!     let projects = context.retrieval.search_projects("solar").await?;
//!     println!("{projects:?}");
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::AppContext;
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{Config, FilterExpr, SagaEvent, SagaStatus, WeightedRanker};
pub use domain::ports::{EmbeddingProvider, MessageConsumer, SagaLedger, VectorStoreGateway};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{EmbeddingPipeline, IndexingService, RetrievalService, SagaCoordinator};
