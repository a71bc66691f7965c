//! Infrastructure layer module
//!
//! Adapters and external integrations:
//! - Configuration management
//! - Logging infrastructure
//! - Chunking, embeddings and the in-process vector store
//! - In-process message broker
//! - Saga ledger
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod broker;
pub mod config;
pub mod logging;
pub mod saga_ledger;
pub mod vector;
