use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Black-box text completion collaborator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Complete `prompt` with the given system instruction.
    async fn generate(&self, system: &str, prompt: &str) -> DomainResult<String>;
}
