//! Settings for the document bot.
//!
//! [`ConfigLoader`] layers built-in defaults, `.docbot/config.yaml`,
//! `.docbot/local.yaml` and `DOCBOT_*` environment variables (nested keys
//! split on `__`), then rejects logging, chunking, embedding, broker or
//! retrieval settings the bot cannot run with.

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, ENV_PREFIX};
