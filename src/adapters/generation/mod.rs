//! Text generation adapters.

pub mod http;

pub use http::{HttpGenerationConfig, HttpTextGenerator};
