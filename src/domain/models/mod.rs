pub mod chunking;
pub mod collections;
pub mod config;
pub mod filter;
pub mod ranking;
pub mod record;
pub mod saga;
pub mod search;

pub use chunking::{ChunkingConfig, EmbeddedChunk, TextChunk, TokenizerKind};
pub use collections::{
    fields, CollectionSchema, DocumentChunk, DocumentKey, LectureChunk, Project, DOCUMENTS,
    LECTURES, PROJECTS,
};
pub use config::{
    BrokerConfig, Config, EmbeddingConfig, EmbeddingProviderKind, GenerationConfig,
    LoggingConfig, RetrievalConfig, SagaConfig, StoreConfig,
};
pub use filter::{CompareOp, FilterExpr};
pub use ranking::{MissingFieldPolicy, RankedHit, WeightedRanker};
pub use record::{FieldValue, Record};
pub use saga::{
    DocumentPayload, EventSource, HistoryEntry, SagaCommand, SagaEvent, SagaPhase, SagaStatus,
    SagaTrigger,
};
pub use search::{AnnSearchRequest, IteratorRequest, PagedResults, QueryRequest, SearchHit, SortKey};
