//! Deadlines for calls that leave the process.

use std::future::Future;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};

/// Await `future` for at most `limit`, reporting elapse as [`DomainError::Timeout`].
pub async fn bounded<T, F>(operation: &str, limit: Duration, future: F) -> DomainResult<T>
where
    F: Future<Output = DomainResult<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(DomainError::Timeout {
            operation: operation.to_string(),
            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
