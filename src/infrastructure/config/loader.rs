use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Directory holding project configuration, relative to the working directory
pub const CONFIG_DIR: &str = ".docbot";

/// Prefix for environment overrides; nested keys are separated by `__`
pub const ENV_PREFIX: &str = "DOCBOT_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Invalid chunking: {0}")]
    InvalidChunking(String),

    #[error("Invalid embedding dimension: {0}. Must be at least 1")]
    InvalidDimension(usize),

    #[error("Invalid embedding batch size: {0}. Must be at least 1")]
    InvalidBatchSize(usize),

    #[error("Invalid partition_workers: {0}. Must be between 1 and 256")]
    InvalidPartitionWorkers(usize),

    #[error("Topic names cannot be empty")]
    EmptyTopic,

    #[error("Create and rollback topics must differ, both are '{0}'")]
    DuplicateTopic(String),

    #[error("Invalid reranker weight: {0}. Must be finite and non-negative")]
    InvalidWeight(f32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid timeout for {0}: must be at least 1ms")]
    InvalidTimeout(&'static str),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .docbot/config.yaml
    /// 3. .docbot/local.yaml (optional overrides)
    /// 4. Environment variables (DOCBOT_* prefix)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(Path::new("."))
    }

    /// Same as [`ConfigLoader::load`] with `.docbot/` resolved under `base`.
    pub fn load_from_dir(base: &Path) -> Result<Config> {
        let dir = base.join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring env overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        config
            .chunking
            .validate()
            .map_err(ConfigError::InvalidChunking)?;

        if config.embedding.dimension == 0 {
            return Err(ConfigError::InvalidDimension(config.embedding.dimension));
        }
        if config.embedding.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(config.embedding.batch_size));
        }

        let broker = &config.broker;
        if broker.partition_workers == 0 || broker.partition_workers > 256 {
            return Err(ConfigError::InvalidPartitionWorkers(broker.partition_workers));
        }
        if [&broker.create_topic, &broker.rollback_topic, &broker.result_topic]
            .iter()
            .any(|t| t.trim().is_empty())
        {
            return Err(ConfigError::EmptyTopic);
        }
        if broker.create_topic == broker.rollback_topic {
            return Err(ConfigError::DuplicateTopic(broker.create_topic.clone()));
        }
        if broker.worker_queue_depth == 0 {
            return Err(ConfigError::ValidationFailed(
                "broker.worker_queue_depth must be at least 1".to_string(),
            ));
        }

        let retrieval = &config.retrieval;
        for weight in [retrieval.project_name_weight, retrieval.project_description_weight] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidWeight(weight));
            }
        }
        if retrieval.project_name_weight + retrieval.project_description_weight <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "at least one project weight must be positive".to_string(),
            ));
        }
        if retrieval.default_limit == 0 || retrieval.iterator_batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "retrieval limits must be at least 1".to_string(),
            ));
        }

        if config.saga.initial_backoff_ms > config.saga.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.saga.initial_backoff_ms,
                config.saga.max_backoff_ms,
            ));
        }

        for (name, value) in [
            ("store", config.store.timeout_ms),
            ("embedding", config.embedding.timeout_ms),
            ("broker.poll", broker.poll_timeout_ms),
            ("broker.publish", broker.publish_timeout_ms),
            ("generation", config.generation.timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidTimeout(name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::EmbeddingProviderKind;
    use crate::domain::models::MissingFieldPolicy;
    use std::fs;

    fn write_config(base: &Path, name: &str, body: &str) {
        let dir = base.join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunking.tokens_per_chunk, 128);
        assert_eq!(config.chunking.chunk_overlap, 10);
        assert_eq!(config.broker.create_topic, "document-bot-success");
        assert_eq!(config.broker.rollback_topic, "document-bot-fail");
        assert_eq!(config.broker.result_topic, "orchestrator");
        assert_eq!(config.retrieval.nprobe, 12);
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Hash);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
chunking:
  tokens_per_chunk: 256
  chunk_overlap: 32
  tokenizer: whitespace
broker:
  partition_workers: 8
retrieval:
  missing_field_policy: drop
logging:
  level: debug
  format: pretty
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.chunking.tokens_per_chunk, 256);
        assert_eq!(config.chunking.chunk_overlap, 32);
        assert_eq!(config.broker.partition_workers, 8);
        assert_eq!(config.broker.group_id, "document-bot-group");
        assert_eq!(config.retrieval.missing_field_policy, MissingFieldPolicy::Drop);
        assert_eq!(config.logging.format, "pretty");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));
    }

    #[test]
    fn test_validate_overlap_not_below_window() {
        let mut config = Config::default();
        config.chunking.chunk_overlap = config.chunking.tokens_per_chunk;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidChunking(_)
        ));
    }

    #[test]
    fn test_validate_zero_workers() {
        let mut config = Config::default();
        config.broker.partition_workers = 0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidPartitionWorkers(0)
        ));
    }

    #[test]
    fn test_validate_same_inbound_topics() {
        let mut config = Config::default();
        config.broker.rollback_topic = config.broker.create_topic.clone();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::DuplicateTopic(_)
        ));
    }

    #[test]
    fn test_validate_negative_weight() {
        let mut config = Config::default();
        config.retrieval.project_name_weight = -0.4;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidWeight(_)
        ));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.saga.initial_backoff_ms = 30_000;
        config.saga.max_backoff_ms = 10_000;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBackoff(30_000, 10_000)
        ));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.broker.publish_timeout_ms = 0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidTimeout("broker.publish")
        ));
    }

    #[test]
    fn test_hierarchical_merging() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "config.yaml",
            "broker:\n  partition_workers: 2\n  group_id: base\nlogging:\n  level: info\n  format: json\n",
        );
        write_config(dir.path(), "local.yaml", "broker:\n  partition_workers: 6\nlogging:\n  level: debug\n");

        let config = temp_env::with_vars_unset(
            ["DOCBOT_BROKER__PARTITION_WORKERS", "DOCBOT_LOGGING__LEVEL"],
            || ConfigLoader::load_from_dir(dir.path()),
        )
        .unwrap();

        assert_eq!(config.broker.partition_workers, 6, "Override should win");
        assert_eq!(config.broker.group_id, "base", "Base value should persist");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_env_override_wins_over_files() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "config.yaml", "broker:\n  partition_workers: 2\n");

        let config = temp_env::with_vars(
            [
                ("DOCBOT_BROKER__PARTITION_WORKERS", Some("12")),
                ("DOCBOT_RETRIEVAL__PROJECT_LIMIT", Some("3")),
                ("DOCBOT_EMBEDDING__PROVIDER", Some("http")),
            ],
            || ConfigLoader::load_from_dir(dir.path()),
        )
        .unwrap();

        assert_eq!(config.broker.partition_workers, 12);
        assert_eq!(config.retrieval.project_limit, 3);
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Http);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "config.yaml", "logging:\n  format: xml\n");

        let err = temp_env::with_vars_unset(["DOCBOT_LOGGING__FORMAT"], || {
            ConfigLoader::load_from_dir(dir.path())
        })
        .unwrap_err();
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_env::with_vars_unset(["DOCBOT_RETRIEVAL__PROJECT_LIMIT"], || {
            ConfigLoader::load_from_dir(dir.path())
        })
        .unwrap();
        assert_eq!(config.retrieval.project_limit, 2);
    }
}
