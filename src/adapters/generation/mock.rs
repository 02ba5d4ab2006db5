//! Scripted generator for tests and offline runs.

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::domain::errors::{DomainResult, TransportError};
use crate::domain::models::{LlmConfig, TokenUsage};
use crate::domain::ports::{GenerationOutput, GenerationParams, GenerationService};

/// Returns canned text. When chunks are set the content is their
/// concatenation and streaming sends them one by one.
pub struct MockGenerator {
    chunks: Vec<String>,
    failure: Option<TransportError>,
    last_params: Mutex<Option<GenerationParams>>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self {
            chunks: vec!["Mock response.".to_string()],
            failure: None,
            last_params: Mutex::new(None),
        }
    }
}

impl MockGenerator {
    /// Generator answering "Mock response.".
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer with `content` in one chunk.
    pub fn with_response(mut self, content: &str) -> Self {
        self.chunks = vec![content.to_string()];
        self
    }

    /// Answer with `chunks`, streamed in order.
    pub fn with_chunks(mut self, chunks: Vec<&str>) -> Self {
        self.chunks = chunks.into_iter().map(str::to_string).collect();
        self
    }

    /// Fail every call with `error`.
    pub fn failing(mut self, error: TransportError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Parameters of the most recent call.
    pub fn last_params(&self) -> Option<GenerationParams> {
        self.last_params.lock().ok().and_then(|p| p.clone())
    }

    fn respond(&self, config: &LlmConfig, params: GenerationParams) -> DomainResult<GenerationOutput> {
        let model = params
            .model
            .clone()
            .or_else(|| config.model.clone())
            .unwrap_or_else(|| "mock-model".to_string());
        let input = params.user_message.split_whitespace().count() as u64;
        if let Ok(mut last) = self.last_params.lock() {
            *last = Some(params);
        }
        if let Some(error) = &self.failure {
            return Err(error.clone().into());
        }

        let content = self.chunks.concat();
        let output = content.split_whitespace().count() as u64;
        Ok(GenerationOutput {
            content,
            provider: self.name().to_string(),
            model,
            usage: TokenUsage::new(input, output),
        })
    }
}

#[async_trait]
impl GenerationService for MockGenerator {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(
        &self,
        config: &LlmConfig,
        params: GenerationParams,
    ) -> DomainResult<GenerationOutput> {
        self.respond(config, params)
    }

    async fn generate_stream(
        &self,
        config: &LlmConfig,
        params: GenerationParams,
        partials: mpsc::Sender<String>,
    ) -> DomainResult<GenerationOutput> {
        let output = self.respond(config, params)?;
        for chunk in &self.chunks {
            if partials.send(chunk.clone()).await.is_err() {
                break;
            }
        }
        Ok(output)
    }
}
