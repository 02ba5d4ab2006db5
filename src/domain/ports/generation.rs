//! Managed generation port.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::errors::DomainResult;
use crate::domain::models::{LlmConfig, TaskMode, TokenUsage};

/// Inputs for one generation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationParams {
    /// System prompt.
    pub system_prompt: Option<String>,
    /// User message.
    pub user_message: String,
    /// Task mode.
    pub mode: TaskMode,
    /// Routing override for the provider.
    pub provider: Option<String>,
    /// Routing override for the model.
    pub model: Option<String>,
}

/// Completed generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutput {
    /// Generated text.
    pub content: String,
    /// Provider that answered.
    pub provider: String,
    /// Model that answered.
    pub model: String,
    /// Token usage.
    pub usage: TokenUsage,
}

/// LLM backend used by `llm` transports.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Backend name used as the default provider label.
    fn name(&self) -> &'static str;

    /// Generate a complete response.
    async fn generate(
        &self,
        config: &LlmConfig,
        params: GenerationParams,
    ) -> DomainResult<GenerationOutput>;

    /// Generate while forwarding partial text to `partials`.
    ///
    /// The default sends the whole content as one piece.
    async fn generate_stream(
        &self,
        config: &LlmConfig,
        params: GenerationParams,
        partials: mpsc::Sender<String>,
    ) -> DomainResult<GenerationOutput> {
        let output = self.generate(config, params).await?;
        let _ = partials.send(output.content.clone()).await;
        Ok(output)
    }
}
