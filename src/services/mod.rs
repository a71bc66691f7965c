//! Application services
//!
//! - `embedding_pipeline`: chunk text and embed it in bounded batches
//! - `retrieval_service`: single-field, filtered, hybrid and paged search
//! - `indexing_service`: document, lecture and project collections
//! - `summary_service` / `report_service`: generated summaries over indexed documents
//! - `saga`: saga participant coordinator and consume loop

pub mod embedding_pipeline;
pub mod indexing_service;
pub mod report_service;
pub mod retrieval_service;
pub mod retry;
pub mod saga;
pub mod summary_service;
pub mod timeouts;

pub use embedding_pipeline::EmbeddingPipeline;
pub use indexing_service::{DocumentSummary, IndexingService, NewDocument, NewLecture, NewProject};
pub use report_service::{DocumentReport, ProjectReport, Report, ReportService};
pub use retrieval_service::{
    HybridField, HybridQuery, IterateQuery, ProjectHit, RetrievalService, SearchQuery,
};
pub use retry::RetryPolicy;
pub use saga::{ConsumerSettings, ConsumerStats, Disposition, SagaConsumer, SagaCoordinator};
pub use summary_service::SummaryService;
pub use timeouts::bounded;
