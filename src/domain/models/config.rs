use serde::{Deserialize, Serialize};

use super::chunking::ChunkingConfig;
use super::collections::DEFAULT_DIMENSION;
use super::ranking::MissingFieldPolicy;

/// Main configuration structure for the document bot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Vector store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Embedding model and batching
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Token window chunking
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Message broker and topics
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Retrieval defaults
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Saga retry policy
    #[serde(default)]
    pub saga: SagaConfig,

    /// Text generation collaborator
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    #[serde(default = "default_store_host")]
    pub host: String,

    #[serde(default = "default_store_port")]
    pub port: u16,

    /// Deadline for a single store call
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,

    /// JSON snapshot used by the in-process store to persist between runs
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

fn default_store_host() -> String {
    "localhost".to_string()
}

const fn default_store_port() -> u16 {
    19530
}

const fn default_store_timeout_ms() -> u64 {
    10_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_store_host(),
            port: default_store_port(),
            timeout_ms: default_store_timeout_ms(),
            snapshot_path: None,
        }
    }
}

/// Embedding backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    /// Deterministic in-process feature hashing
    Hash,
    /// OpenAI-compatible `/embeddings` endpoint
    Http,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProviderKind,

    /// Vector dimension shared by every collection
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum chunks per model invocation
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Deadline for a single embedding call
    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// API key for the HTTP provider. Falls back to `DOCBOT_EMBEDDING_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
}

const fn default_embedding_provider() -> EmbeddingProviderKind {
    EmbeddingProviderKind::Hash
}

const fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}

const fn default_batch_size() -> usize {
    128
}

const fn default_embedding_timeout_ms() -> u64 {
    30_000
}

fn default_embedding_base_url() -> String {
    "http://localhost:8080/v1".to_string()
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            dimension: default_dimension(),
            batch_size: default_batch_size(),
            timeout_ms: default_embedding_timeout_ms(),
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            api_key: None,
        }
    }
}

/// Broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BrokerConfig {
    #[serde(default = "default_broker_address")]
    pub address: String,

    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Topic carrying creation commands
    #[serde(default = "default_create_topic")]
    pub create_topic: String,

    /// Topic carrying compensation commands
    #[serde(default = "default_rollback_topic")]
    pub rollback_topic: String,

    /// Topic outcome events are published to
    #[serde(default = "default_result_topic")]
    pub result_topic: String,

    /// Upper bound on a single poll
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Deadline for handing an outcome to the broker
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,

    /// Number of sequential per-key workers
    #[serde(default = "default_partition_workers")]
    pub partition_workers: usize,

    /// Messages buffered per worker before polling pauses
    #[serde(default = "default_worker_queue_depth")]
    pub worker_queue_depth: usize,
}

fn default_broker_address() -> String {
    "localhost:9092".to_string()
}

fn default_group_id() -> String {
    "document-bot-group".to_string()
}

fn default_create_topic() -> String {
    "document-bot-success".to_string()
}

fn default_rollback_topic() -> String {
    "document-bot-fail".to_string()
}

fn default_result_topic() -> String {
    "orchestrator".to_string()
}

const fn default_poll_timeout_ms() -> u64 {
    1_000
}

const fn default_publish_timeout_ms() -> u64 {
    5_000
}

const fn default_partition_workers() -> usize {
    4
}

const fn default_worker_queue_depth() -> usize {
    16
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: default_broker_address(),
            group_id: default_group_id(),
            create_topic: default_create_topic(),
            rollback_topic: default_rollback_topic(),
            result_topic: default_result_topic(),
            poll_timeout_ms: default_poll_timeout_ms(),
            publish_timeout_ms: default_publish_timeout_ms(),
            partition_workers: default_partition_workers(),
            worker_queue_depth: default_worker_queue_depth(),
        }
    }
}

impl BrokerConfig {
    pub fn inbound_topics(&self) -> Vec<String> {
        vec![self.create_topic.clone(), self.rollback_topic.clone()]
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetrievalConfig {
    /// Results returned when the caller gives no limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "default_nprobe")]
    pub nprobe: u32,

    /// Candidates requested per hybrid sub-search, raised to the final limit if lower
    #[serde(default = "default_sub_limit")]
    pub sub_limit: usize,

    #[serde(default = "default_iterator_batch_size")]
    pub iterator_batch_size: usize,

    #[serde(default)]
    pub missing_field_policy: MissingFieldPolicy,

    /// Weight of the project name embedding
    #[serde(default = "default_project_name_weight")]
    pub project_name_weight: f32,

    /// Weight of the project description embedding
    #[serde(default = "default_project_description_weight")]
    pub project_description_weight: f32,

    /// Final limit of the project search
    #[serde(default = "default_project_limit")]
    pub project_limit: usize,
}

const fn default_limit() -> usize {
    5
}

const fn default_nprobe() -> u32 {
    12
}

const fn default_sub_limit() -> usize {
    5
}

const fn default_iterator_batch_size() -> usize {
    100
}

const fn default_project_name_weight() -> f32 {
    0.4
}

const fn default_project_description_weight() -> f32 {
    0.6
}

const fn default_project_limit() -> usize {
    2
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            nprobe: default_nprobe(),
            sub_limit: default_sub_limit(),
            iterator_batch_size: default_iterator_batch_size(),
            missing_field_policy: MissingFieldPolicy::default(),
            project_name_weight: default_project_name_weight(),
            project_description_weight: default_project_description_weight(),
            project_limit: default_project_limit(),
        }
    }
}

/// Saga retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SagaConfig {
    /// Extra attempts after an embedding failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    200
}

const fn default_max_backoff_ms() -> u64 {
    5_000
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Text generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GenerationConfig {
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    /// API key. Falls back to `DOCBOT_GENERATION_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_generation_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_generation_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_generation_model() -> String {
    "llama3".to_string()
}

const fn default_generation_timeout_ms() -> u64 {
    60_000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_generation_base_url(),
            model: default_generation_model(),
            api_key: None,
            timeout_ms: default_generation_timeout_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation of log files: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
