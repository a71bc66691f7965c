//! Domain layer for the document bot
//!
//! Models, errors and the ports infrastructure adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
