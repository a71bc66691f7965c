//! CLI command implementations.

pub mod consume;
pub mod ingest;
pub mod projects;
pub mod search;
