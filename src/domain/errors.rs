//! Domain errors for the document bot.

use thiserror::Error;

/// Domain-level errors raised by the pipeline, the retrieval engine and the
/// saga coordinator.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Malformed payload or text that can never be processed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The embedding backend failed. Retryable.
    #[error("Embedding failure: {0}")]
    EmbeddingFailure(String),

    /// The vector store could not be reached or rejected the operation.
    #[error("Vector store unavailable during {operation}: {reason}")]
    StoreUnavailable { operation: String, reason: String },

    /// A retrieval request failed inside the store gateway.
    #[error("Retrieval backend error: {0}")]
    RetrievalBackend(String),

    /// The transaction already reached a terminal state.
    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    /// Deleting the records of a transaction failed. Fatal.
    #[error("Compensation failed for transaction {transaction_id}: {reason}")]
    CompensationFailure {
        transaction_id: String,
        reason: String,
    },

    /// An external call did not complete within its deadline.
    #[error("Timed out after {after_ms}ms during {operation}")]
    Timeout { operation: String, after_ms: u64 },

    /// An outcome event could not be handed to the broker.
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// The saga state machine has no transition for the trigger.
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A text generation collaborator failed.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether the coordinator may retry the failed stage.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::EmbeddingFailure(_) => true,
            Self::Timeout { operation, .. } => operation.starts_with("embed"),
            _ => false,
        }
    }

    /// Short stage label used in history messages and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::EmbeddingFailure(_) => "embedding_failure",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::RetrievalBackend(_) => "retrieval_backend",
            Self::DuplicateTransaction(_) => "duplicate_transaction",
            Self::CompensationFailure { .. } => "compensation_failure",
            Self::Timeout { .. } => "timeout",
            Self::PublishFailed(_) => "publish_failed",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::ValidationFailed(_) => "validation_failed",
            Self::SerializationError(_) => "serialization_error",
            Self::GenerationFailed(_) => "generation_failed",
        }
    }

    pub(crate) fn store(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_failures_are_retryable() {
        assert!(DomainError::EmbeddingFailure("503".into()).is_retryable());
        assert!(DomainError::Timeout {
            operation: "embed_batch".into(),
            after_ms: 100
        }
        .is_retryable());
    }

    #[test]
    fn test_terminal_errors_are_not_retryable() {
        assert!(!DomainError::InvalidInput("empty".into()).is_retryable());
        assert!(!DomainError::store("insert", "down").is_retryable());
        assert!(!DomainError::Timeout {
            operation: "insert".into(),
            after_ms: 100
        }
        .is_retryable());
        assert!(!DomainError::CompensationFailure {
            transaction_id: "t".into(),
            reason: "x".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_serde_error_converts() {
        let err: DomainError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.kind(), "serialization_error");
    }
}
