//! Transport dispatcher.
//!
//! Executes a normalized request against the agent's transport: managed
//! generation, a configurable HTTP API, or a JSON-RPC 2.0 remote agent.
//! Every call records exactly one metrics sample.

pub mod headers;
pub mod retry;
pub mod transforms;

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult, TransportError};
use crate::domain::models::{
    ApiConfig, DispatchRequest, DispatchResult, DispatchStatus, DispatchTiming, DispatcherConfig,
    ExternalConfig, LlmConfig, RedactionContext, TokenUsage, TransportConfig, TransportKind,
};
use crate::domain::ports::{
    GenerationParams, GenerationService, HttpClient, HttpRequest, HttpResponse,
};
use crate::services::metrics::MetricsRecorder;
use crate::services::redaction::{scrub_and_cap, RedactionPipeline};

pub use headers::HeaderAllowList;
pub use retry::{RetryPolicy, Retryable};

/// Executes a normalized request on the agent's transport.
///
/// Applies timeouts, retries, header filtering and redaction, and records
/// one metrics sample per dispatch.
pub struct TransportDispatcher {
    http: Arc<dyn HttpClient>,
    generator: Arc<dyn GenerationService>,
    redaction: RedactionPipeline,
    metrics: Arc<MetricsRecorder>,
    config: DispatcherConfig,
    retry: RetryPolicy,
    headers: HeaderAllowList,
}

impl TransportDispatcher {
    /// Create a dispatcher.
    ///
    /// # Arguments
    ///
    /// * `http` - Client for `api` and `external` agents
    /// * `generator` - Backend for `llm` agents
    /// * `redaction` - Pipeline applied to outbound text and error messages
    /// * `metrics` - Recorder receiving one sample per dispatch
    /// * `config` - Timeouts, retry policy and extra allowed headers
    pub fn new(
        http: Arc<dyn HttpClient>,
        generator: Arc<dyn GenerationService>,
        redaction: RedactionPipeline,
        metrics: Arc<MetricsRecorder>,
        config: DispatcherConfig,
    ) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        let headers = HeaderAllowList::new(&config.extra_allowed_headers);
        Self {
            http,
            generator,
            redaction,
            metrics,
            config,
            retry,
            headers,
        }
    }

    /// Recorder this dispatcher writes to.
    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    /// Redaction pipeline in use.
    pub fn redaction(&self) -> &RedactionPipeline {
        &self.redaction
    }

    /// Execute the request and return the aggregate result.
    #[instrument(skip_all, fields(agent = %request.agent.slug, kind = %request.transport_kind()))]
    pub async fn dispatch(&self, request: DispatchRequest) -> DomainResult<DispatchResult> {
        self.run(request, None).await
    }

    /// Like [`dispatch`](Self::dispatch), forwarding partial text for `llm`
    /// transports as it arrives. Streaming calls are attempted once.
    #[instrument(skip_all, fields(agent = %request.agent.slug, kind = %request.transport_kind()))]
    pub async fn dispatch_streaming(
        &self,
        request: DispatchRequest,
        partials: mpsc::Sender<String>,
    ) -> DomainResult<DispatchResult> {
        self.run(request, Some(partials)).await
    }

    async fn run(
        &self,
        request: DispatchRequest,
        partials: Option<mpsc::Sender<String>>,
    ) -> DomainResult<DispatchResult> {
        let started = Utc::now();
        let kind = request.transport_kind();
        let slug = request.agent.slug.clone();

        let outcome = self.execute(request, partials, started).await;

        match &outcome {
            Ok(result) => {
                self.metrics
                    .record(kind, &slug, result.is_success(), result.timing.duration_ms, result.status_code)
                    .await;
                info!(
                    status = result.status.as_str(),
                    duration_ms = result.timing.duration_ms,
                    status_code = ?result.status_code,
                    "Dispatch finished"
                );
            }
            Err(e) => {
                let duration_ms = DispatchTiming::since(started).duration_ms;
                let status_code = match e {
                    DomainError::Transport(t) => t.status_code(),
                    _ => None,
                };
                self.metrics
                    .record(kind, &slug, false, duration_ms, status_code)
                    .await;
                warn!(error = %e, duration_ms, "Dispatch failed");
            }
        }
        outcome
    }

    async fn execute(
        &self,
        request: DispatchRequest,
        partials: Option<mpsc::Sender<String>>,
        started: DateTime<Utc>,
    ) -> DomainResult<DispatchResult> {
        let request = self.redact(request).await;
        let agent = request.agent.clone();

        match &agent.transport {
            TransportConfig::Llm(config) => self.call_llm(config, &request, partials, started).await,
            TransportConfig::Api(config) => self.call_api(config, &request, started).await,
            TransportConfig::External(config) => {
                self.call_external(config, &request, started).await
            }
        }
    }

    /// Apply redaction before anything leaves the process.
    async fn redact(&self, mut request: DispatchRequest) -> DispatchRequest {
        let ctx = RedactionContext {
            is_local: request.routing.is_local,
            organization_scope: request.organization_slug.as_deref(),
        };
        let user_message = self
            .redaction
            .redact(&request.agent, &request.user_message, ctx)
            .await;
        let system_prompt = match &request.system_prompt {
            Some(prompt) => Some(self.redaction.redact(&request.agent, prompt, ctx).await),
            None => None,
        };
        let masked = self
            .redaction
            .mask_fields(&request.agent, &mut request.raw_payload);
        if masked > 0 {
            debug!(fields = masked, "Masked payload fields");
        }

        request.user_message = user_message;
        request.system_prompt = system_prompt;
        request
    }

    fn timeout_for(&self, kind: TransportKind, override_ms: Option<u64>) -> Duration {
        let default_ms = match kind {
            TransportKind::Llm => self.config.llm_timeout_ms,
            TransportKind::Api => self.config.api_timeout_ms,
            TransportKind::External => self.config.external_timeout_ms,
        };
        Duration::from_millis(override_ms.unwrap_or(default_ms))
    }

    fn cap(&self, message: &str) -> String {
        scrub_and_cap(message, self.config.error_message_cap)
    }

    async fn call_llm(
        &self,
        config: &LlmConfig,
        request: &DispatchRequest,
        partials: Option<mpsc::Sender<String>>,
        started: DateTime<Utc>,
    ) -> DomainResult<DispatchResult> {
        let limit = self.timeout_for(TransportKind::Llm, config.timeout_ms);
        let params = GenerationParams {
            system_prompt: request.system_prompt.clone(),
            user_message: request.user_message.clone(),
            mode: request.mode,
            provider: request.routing.provider.clone(),
            model: request.routing.model.clone(),
        };

        let outcome = match partials {
            Some(partials) => {
                with_timeout(limit, self.generator.generate_stream(config, params, partials)).await
            }
            None => {
                self.retry
                    .execute(|| with_timeout(limit, self.generator.generate(config, params.clone())))
                    .await
            }
        };

        match outcome {
            Ok(output) => Ok(DispatchResult {
                content: output.content,
                provider: output.provider,
                model: output.model,
                usage: output.usage,
                timing: DispatchTiming::since(started),
                status: DispatchStatus::Completed,
                error_message: None,
                status_code: None,
            }),
            Err(DomainError::Transport(e)) => self.transport_failure(e, request, started),
            Err(e) => Err(e),
        }
    }

    async fn call_api(
        &self,
        config: &ApiConfig,
        request: &DispatchRequest,
        started: DateTime<Utc>,
    ) -> DomainResult<DispatchResult> {
        let limit = self.timeout_for(TransportKind::Api, config.timeout_ms);
        let body = transforms::render_request_body(
            config
                .request_transform
                .as_ref()
                .and_then(|t| t.template.as_deref()),
            request,
        )?;

        let mut headers = self.headers.filter(&config.headers, &request.headers);
        if !headers.iter().any(|(k, _)| k == "content-type") {
            headers.push(("content-type".to_string(), body.content_type().to_string()));
        }
        let http_request = HttpRequest {
            method: config.method.to_uppercase(),
            url: config.url.clone(),
            headers,
            body: Some(body.into_string()),
        };

        let outcome = self
            .retry
            .execute(|| self.send_checked(limit, http_request.clone()))
            .await;

        match outcome {
            Ok(response) => Ok(self.completed(
                transforms::extract_api_content(&response.body, config.response_transform.as_ref()),
                TransportKind::Api,
                request,
                Some(response.status),
                started,
            )),
            Err(e) => self.transport_failure(e, request, started),
        }
    }

    async fn call_external(
        &self,
        config: &ExternalConfig,
        request: &DispatchRequest,
        started: DateTime<Utc>,
    ) -> DomainResult<DispatchResult> {
        let limit = self.timeout_for(TransportKind::External, config.timeout_ms);
        let rpc = transforms::build_rpc_request(request);

        let mut headers = self.headers.filter(&config.headers, &request.headers);
        headers.retain(|(k, _)| k != "content-type");
        headers.push(("content-type".to_string(), "application/json".to_string()));
        let http_request = HttpRequest {
            method: "POST".to_string(),
            url: config.url.clone(),
            headers,
            body: Some(rpc.to_string()),
        };

        let outcome = self
            .retry
            .execute(|| {
                let http_request = http_request.clone();
                async move {
                    let response = self.send_checked(limit, http_request).await?;
                    let value = transforms::parse_rpc_response(&response.body)?;
                    Ok::<_, TransportError>((response.status, value))
                }
            })
            .await;

        match outcome {
            Ok((status, value)) => Ok(self.completed(
                transforms::extract_external_content(&value, config.response_transform.as_ref()),
                TransportKind::External,
                request,
                Some(status),
                started,
            )),
            Err(e) => self.transport_failure(e, request, started),
        }
    }

    /// One HTTP attempt under `limit`. Non-2xx becomes `TransportError::Status`.
    async fn send_checked(
        &self,
        limit: Duration,
        request: HttpRequest,
    ) -> Result<HttpResponse, TransportError> {
        let response = timeout(limit, self.http.send(request))
            .await
            .map_err(|_| TransportError::Timeout(limit))??;
        if response.is_success() {
            Ok(response)
        } else {
            Err(TransportError::Status {
                status: response.status,
                body: response.body,
            })
        }
    }

    fn completed(
        &self,
        content: String,
        kind: TransportKind,
        request: &DispatchRequest,
        status_code: Option<u16>,
        started: DateTime<Utc>,
    ) -> DispatchResult {
        DispatchResult {
            content,
            provider: kind.as_str().to_string(),
            model: request.agent.slug.clone(),
            usage: TokenUsage::default(),
            timing: DispatchTiming::since(started),
            status: DispatchStatus::Completed,
            error_message: None,
            status_code,
        }
    }

    /// Upstream answers become an error result; connection failures and
    /// timeouts are returned as errors. Messages are scrubbed and capped.
    fn transport_failure(
        &self,
        error: TransportError,
        request: &DispatchRequest,
        started: DateTime<Utc>,
    ) -> DomainResult<DispatchResult> {
        let kind = request.transport_kind();
        if error.is_upstream_response() {
            let (provider, model) = match &request.agent.transport {
                TransportConfig::Llm(c) => (
                    request
                        .routing
                        .provider
                        .clone()
                        .or_else(|| c.provider.clone())
                        .unwrap_or_else(|| self.generator.name().to_string()),
                    request
                        .routing
                        .model
                        .clone()
                        .or_else(|| c.model.clone())
                        .unwrap_or_default(),
                ),
                _ => (kind.as_str().to_string(), request.agent.slug.clone()),
            };
            return Ok(DispatchResult {
                content: String::new(),
                provider,
                model,
                usage: TokenUsage::default(),
                timing: DispatchTiming::since(started),
                status: DispatchStatus::Error,
                error_message: Some(self.cap(&error.to_string())),
                status_code: error.status_code(),
            });
        }

        let sanitized = match error {
            TransportError::Connection(message) => TransportError::Connection(self.cap(&message)),
            other => other,
        };
        Err(DomainError::Transport(sanitized))
    }
}

/// Run a generation future under `limit`, mapping expiry to a transport timeout.
async fn with_timeout<T, F>(limit: Duration, fut: F) -> DomainResult<T>
where
    F: Future<Output = DomainResult<T>>,
{
    timeout(limit, fut)
        .await
        .map_err(|_| DomainError::Transport(TransportError::Timeout(limit)))?
}
