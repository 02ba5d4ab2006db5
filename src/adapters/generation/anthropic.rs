//! Anthropic Messages API generator.
//!
//! Non-streaming calls read the whole response. Streaming calls consume the
//! server-sent event stream and forward each text delta as it arrives.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::adapters::http::transport_error;
use crate::domain::errors::{DomainError, DomainResult, TransportError};
use crate::domain::models::{AnthropicConfig, LlmConfig, TokenUsage};
use crate::domain::ports::{GenerationOutput, GenerationParams, GenerationService};

const API_VERSION: &str = "2023-06-01";
const PROVIDER: &str = "anthropic";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct StartMessage {
    model: String,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct TextDelta {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

/// One server-sent event from a streaming Messages call.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SseEvent {
    MessageStart {
        message: StartMessage,
    },
    ContentBlockDelta {
        delta: TextDelta,
    },
    MessageDelta {
        #[serde(default)]
        usage: Usage,
    },
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Other,
}

fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    match serde_json::from_str(data) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "Skipping unparseable stream event");
            None
        }
    }
}

/// Managed generation over the Anthropic Messages API.
pub struct AnthropicGenerator {
    config: AnthropicConfig,
    client: Client,
}

impl AnthropicGenerator {
    /// Generator using `config`; the API key is resolved per call.
    pub fn new(config: AnthropicConfig) -> DomainResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| DomainError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn api_key(&self) -> DomainResult<String> {
        self.config
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| DomainError::Configuration("ANTHROPIC_API_KEY not set".to_string()))
    }

    fn model<'a>(&'a self, config: &'a LlmConfig, params: &'a GenerationParams) -> &'a str {
        params
            .model
            .as_deref()
            .or(config.model.as_deref())
            .unwrap_or(&self.config.default_model)
    }

    async fn post(
        &self,
        config: &LlmConfig,
        params: &GenerationParams,
        stream: bool,
    ) -> DomainResult<reqwest::Response> {
        let api_key = self.api_key()?;
        let body = MessagesRequest {
            model: self.model(config, params),
            max_tokens: config.max_tokens.unwrap_or(self.config.max_tokens),
            system: params.system_prompt.as_deref().filter(|s| !s.is_empty()),
            messages: vec![Message {
                role: "user",
                content: &params.user_message,
            }],
            stream,
            temperature: config.temperature,
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url.trim_end_matches('/')))
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body }.into());
        }
        Ok(response)
    }
}

#[async_trait]
impl GenerationService for AnthropicGenerator {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn generate(
        &self,
        config: &LlmConfig,
        params: GenerationParams,
    ) -> DomainResult<GenerationOutput> {
        let response = self.post(config, &params, false).await?;
        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            DomainError::SerializationError(format!("invalid Messages API response: {e}"))
        })?;

        let content = parsed
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(GenerationOutput {
            content,
            provider: PROVIDER.to_string(),
            model: parsed.model,
            usage: TokenUsage::new(parsed.usage.input_tokens, parsed.usage.output_tokens),
        })
    }

    async fn generate_stream(
        &self,
        config: &LlmConfig,
        params: GenerationParams,
        partials: mpsc::Sender<String>,
    ) -> DomainResult<GenerationOutput> {
        let response = self.post(config, &params, true).await?;
        let mut model = self.model(config, &params).to_string();
        let mut content = String::new();
        let mut input_tokens = 0;
        let mut output_tokens = 0;

        let mut bytes = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        while let Some(chunk) = bytes.next().await {
            buffer.extend_from_slice(&chunk.map_err(|e| transport_error(&e))?);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                match parse_sse_line(line.trim_end()) {
                    Some(SseEvent::MessageStart { message }) => {
                        model = message.model;
                        input_tokens = message.usage.input_tokens;
                    }
                    Some(SseEvent::ContentBlockDelta { delta }) if !delta.text.is_empty() => {
                        content.push_str(&delta.text);
                        if partials.send(delta.text).await.is_err() {
                            debug!("Partial receiver dropped; continuing to aggregate");
                        }
                    }
                    Some(SseEvent::MessageDelta { usage }) => {
                        output_tokens = usage.output_tokens;
                    }
                    Some(SseEvent::Error { error }) => {
                        return Err(TransportError::Connection(format!(
                            "stream error {}: {}",
                            error.error_type, error.message
                        ))
                        .into());
                    }
                    _ => {}
                }
            }
        }

        Ok(GenerationOutput {
            content,
            provider: PROVIDER.to_string(),
            model,
            usage: TokenUsage::new(input_tokens, output_tokens),
        })
    }
}
