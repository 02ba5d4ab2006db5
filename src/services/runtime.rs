//! Invocation facade: resolve, normalize, dispatch.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentDefinition, AgentStatus, ContentType, DispatchRequest, DispatchResult, RoutingDecision,
    TaskMode,
};
use crate::services::content_normalizer::ContentNormalizer;
use crate::services::dispatcher::TransportDispatcher;
use crate::services::registry_cache::RegistryCache;
use crate::services::stream_publisher::{StreamPublisher, StreamReceiver};

/// Caller-side description of one agent call.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Calling organization; selects the registry scope.
    pub organization: Option<String>,
    /// Target agent slug.
    pub slug: String,
    /// Message text.
    pub message: String,
    /// Task mode.
    pub mode: TaskMode,
    /// Structured payload.
    pub payload: Option<Value>,
    /// Declared content type of the message or payload.
    pub content_type: Option<ContentType>,
    /// Routing decision; remote by default.
    pub routing: RoutingDecision,
    /// Extra request headers.
    pub headers: HashMap<String, String>,
    /// Caller session.
    pub session_id: Option<String>,
    /// Conversation id.
    pub conversation_id: Option<String>,
    /// Calling user.
    pub user_id: Option<String>,
}

impl Invocation {
    /// Remote invocation of `slug`.
    pub fn new(slug: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            message: message.into(),
            routing: RoutingDecision::remote(),
            ..Default::default()
        }
    }

    /// Set the calling organization.
    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    /// Set the task mode.
    pub fn with_mode(mut self, mode: TaskMode) -> Self {
        self.mode = mode;
        self
    }

    /// Attach a structured payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Declare the content type.
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Set the routing decision.
    pub fn with_routing(mut self, routing: RoutingDecision) -> Self {
        self.routing = routing;
        self
    }

    fn into_request(self, agent: Arc<AgentDefinition>, stream: bool) -> DispatchRequest {
        let mut request = DispatchRequest::new(agent, self.message)
            .with_mode(self.mode)
            .with_routing(self.routing);
        if let Some(org) = self.organization {
            request = request.with_organization(org);
        }
        if let Some(payload) = self.payload {
            request = request.with_payload(payload);
        }
        if let Some(content_type) = self.content_type {
            request = request.with_content_type(content_type);
        }
        if let Some(session) = self.session_id {
            request = request.with_session(session);
        }
        if let Some(conversation) = self.conversation_id {
            request = request.with_conversation(conversation);
        }
        if let Some(user) = self.user_id {
            request = request.with_user(user);
        }
        for (name, value) in self.headers {
            request = request.with_header(name, value);
        }
        request.stream_requested = stream;
        request
    }
}

/// Entry point for agent calls: resolve, normalize, then dispatch or stream.
pub struct AgentRuntime {
    cache: Arc<RegistryCache>,
    normalizer: ContentNormalizer,
    dispatcher: Arc<TransportDispatcher>,
    publisher: StreamPublisher,
}

impl AgentRuntime {
    /// Runtime over a registry cache and dispatcher; streams buffer `stream_capacity` events.
    pub fn new(
        cache: Arc<RegistryCache>,
        dispatcher: Arc<TransportDispatcher>,
        stream_capacity: usize,
    ) -> Self {
        let publisher = StreamPublisher::new(dispatcher.clone(), stream_capacity);
        Self {
            cache,
            normalizer: ContentNormalizer::new(),
            dispatcher,
            publisher,
        }
    }

    /// Registry cache in use.
    pub fn cache(&self) -> &Arc<RegistryCache> {
        &self.cache
    }

    /// Dispatcher in use.
    pub fn dispatcher(&self) -> &Arc<TransportDispatcher> {
        &self.dispatcher
    }

    /// Resolve an invokable agent. Archived agents are refused.
    pub async fn resolve(&self, org: Option<&str>, slug: &str) -> DomainResult<Arc<AgentDefinition>> {
        let definition = self
            .cache
            .get(org, slug)
            .await?
            .ok_or_else(|| DomainError::AgentNotFound(slug.to_string()))?;
        if definition.status == AgentStatus::Archived {
            return Err(DomainError::ValidationFailed(vec![format!(
                "agent '{slug}' is archived"
            )]));
        }
        Ok(definition)
    }

    async fn prepare(&self, invocation: Invocation, stream: bool) -> DomainResult<DispatchRequest> {
        let agent = self
            .resolve(invocation.organization.as_deref(), &invocation.slug)
            .await?;
        let mode = invocation.mode;
        let request = invocation.into_request(agent.clone(), stream);

        let normalized = self.normalizer.normalize(&agent, request, mode);
        if !normalized.ok {
            return Err(DomainError::ContentTypeMismatch {
                expected: normalized
                    .expected
                    .map_or_else(|| "unknown".to_string(), |t| t.to_string()),
                provided: normalized
                    .provided
                    .map_or_else(|| "unknown".to_string(), |t| t.to_string()),
            });
        }
        if let Some(adapter) = normalized.adapter {
            debug!(agent = %agent.slug, adapter, "Request content adapted");
        }
        Ok(normalized.request)
    }

    /// Run an invocation to completion.
    #[instrument(skip_all, fields(agent = %invocation.slug), err)]
    pub async fn invoke(&self, invocation: Invocation) -> DomainResult<DispatchResult> {
        let request = self.prepare(invocation, false).await?;
        self.dispatcher.dispatch(request).await
    }

    /// Start a streamed invocation. Resolution and normalization errors are
    /// returned before any stream is opened.
    #[instrument(skip_all, fields(agent = %invocation.slug), err)]
    pub async fn invoke_streaming(&self, invocation: Invocation) -> DomainResult<StreamReceiver> {
        let request = self.prepare(invocation, true).await?;
        Ok(self.publisher.stream(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::generation::MockGenerator;
    use crate::adapters::memory::InMemoryAgentStore;
    use crate::domain::models::{AgentRecord, DispatcherConfig, StreamEvent};
    use crate::domain::ports::{AgentStore, HttpClient, HttpRequest, HttpResponse};
    use crate::domain::TransportError;
    use crate::services::metrics::MetricsRecorder;
    use crate::services::redaction::RedactionPipeline;
    use async_trait::async_trait;
    use std::time::Duration;

    struct NoHttp;

    #[async_trait]
    impl HttpClient for NoHttp {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Connection("offline".into()))
        }
    }

    async fn runtime(generator: MockGenerator) -> (Arc<InMemoryAgentStore>, Arc<MockGenerator>, AgentRuntime) {
        let store = Arc::new(InMemoryAgentStore::new());
        let cache = Arc::new(RegistryCache::with_ttl(store.clone(), Duration::from_secs(60)));
        let generator = Arc::new(generator);
        let dispatcher = Arc::new(TransportDispatcher::new(
            Arc::new(NoHttp),
            generator.clone(),
            RedactionPipeline::builtin_only(),
            Arc::new(MetricsRecorder::new(8)),
            DispatcherConfig::default(),
        ));
        (store, generator, AgentRuntime::new(cache, dispatcher, 8))
    }

    #[tokio::test]
    async fn test_invoke_resolves_and_dispatches() {
        let (store, _, runtime) = runtime(MockGenerator::new().with_response("hello")).await;
        store.insert(&AgentRecord::new("writer", "context")).await.unwrap();

        let result = runtime.invoke(Invocation::new("writer", "hi")).await.unwrap();
        assert_eq!(result.content, "hello");
    }

    #[tokio::test]
    async fn test_unknown_and_archived_agents_rejected() {
        let (store, _, runtime) = runtime(MockGenerator::new()).await;
        store
            .insert(&AgentRecord::new("old", "context").with_status(AgentStatus::Archived))
            .await
            .unwrap();

        let err = runtime.invoke(Invocation::new("nobody", "hi")).await.unwrap_err();
        assert!(matches!(err, DomainError::AgentNotFound(_)));

        let err = runtime.invoke(Invocation::new("old", "hi")).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    fn json_only(strict: bool) -> AgentRecord {
        let mut record = AgentRecord::new("structured", "context");
        record.descriptor.io.input = Some(ContentType::Json);
        record.descriptor.io.strict = strict;
        record
    }

    #[tokio::test]
    async fn test_strict_mismatch_is_error() {
        let (store, _, runtime) = runtime(MockGenerator::new()).await;
        store.insert(&json_only(true)).await.unwrap();

        let err = runtime
            .invoke(Invocation::new("structured", "just some prose"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::ContentTypeMismatch { ref expected, ref provided }
                if expected == "json" && provided == "markdown"
        ));
    }

    #[tokio::test]
    async fn test_text_adapted_to_structure_before_dispatch() {
        let (store, generator, runtime) = runtime(MockGenerator::new()).await;
        store.insert(&json_only(true)).await.unwrap();

        let message = "```json\n{\"city\": \"Oslo\"}\n```";
        runtime.invoke(Invocation::new("structured", message)).await.unwrap();
        assert_eq!(generator.last_params().unwrap().user_message, message);
    }

    #[tokio::test]
    async fn test_invoke_streaming_orders_events() {
        let (store, _, runtime) = runtime(MockGenerator::new().with_chunks(vec!["a", "b"])).await;
        store.insert(&AgentRecord::new("writer", "context")).await.unwrap();

        let receiver = runtime
            .invoke_streaming(Invocation::new("writer", "hi"))
            .await
            .unwrap();
        let events = receiver.collect().await;
        let names: Vec<_> = events.iter().map(StreamEvent::name).collect();
        assert_eq!(names, vec!["start", "chunk", "chunk", "chunk", "complete"]);
        match events.last() {
            Some(StreamEvent::Complete { result: Some(result), cancelled: false }) => {
                assert_eq!(result.content, "ab");
            }
            other => panic!("unexpected terminal event: {other:?}"),
        }
    }
}
