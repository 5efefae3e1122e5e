use async_trait::async_trait;

use super::types::{LLMError, LLMRequest, LLMResponse};

/// Unified LLM provider interface
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name (e.g., "google")
    fn name(&self) -> &str;

    /// Model used when the request leaves `model` empty
    fn default_model(&self) -> &str;

    /// Send a non-streaming request
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse, LLMError>;
}
