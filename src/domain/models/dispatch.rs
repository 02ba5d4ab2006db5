//! Per-call request and result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::agent::{AgentDefinition, TaskMode, TransportKind};
use super::content::ContentType;

/// Where a request is routed. Local routes skip organization redaction rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    /// Provider override.
    pub provider: Option<String>,
    /// Model override.
    pub model: Option<String>,
    /// Whether the target runs inside the deployment.
    pub is_local: bool,
}

impl RoutingDecision {
    /// Remote route with no overrides.
    pub fn remote() -> Self {
        Self::default()
    }

    /// Local route with no overrides.
    pub fn local() -> Self {
        Self {
            is_local: true,
            ..Self::default()
        }
    }
}

/// A single normalized call. Built per dispatch and never shared.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Target agent snapshot.
    pub agent: Arc<AgentDefinition>,
    /// Routing decision.
    pub routing: RoutingDecision,
    /// Task mode.
    pub mode: TaskMode,
    /// System prompt; defaults to the agent's.
    pub system_prompt: Option<String>,
    /// Message text.
    pub user_message: String,
    /// Conversation the call belongs to.
    pub conversation_id: Option<String>,
    /// Caller session.
    pub session_id: Option<String>,
    /// Calling user.
    pub user_id: Option<String>,
    /// Organization; defaults to the agent's first scope.
    pub organization_slug: Option<String>,
    /// Structured payload, `Null` when absent.
    pub raw_payload: Value,
    /// Caller's declared content type.
    pub content_type_hint: Option<ContentType>,
    /// Per-request headers, subject to the allow-list.
    pub headers: HashMap<String, String>,
    /// Whether the caller asked for partial output.
    pub stream_requested: bool,
}

impl DispatchRequest {
    /// Request inheriting the agent's prompt and organization.
    pub fn new(agent: Arc<AgentDefinition>, user_message: impl Into<String>) -> Self {
        let system_prompt = agent.prompts.system.clone();
        let organization_slug = agent.primary_organization().map(str::to_string);
        Self {
            agent,
            routing: RoutingDecision::default(),
            mode: TaskMode::default(),
            system_prompt,
            user_message: user_message.into(),
            conversation_id: None,
            session_id: None,
            user_id: None,
            organization_slug,
            raw_payload: Value::Null,
            content_type_hint: None,
            headers: HashMap::new(),
            stream_requested: false,
        }
    }

    /// Set the task mode.
    pub fn with_mode(mut self, mode: TaskMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the routing decision.
    pub fn with_routing(mut self, routing: RoutingDecision) -> Self {
        self.routing = routing;
        self
    }

    /// Attach a structured payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.raw_payload = payload;
        self
    }

    /// Declare the content type.
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type_hint = Some(content_type);
        self
    }

    /// Add a request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Override the organization.
    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization_slug = Some(org.into());
        self
    }

    /// Set the session id.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the conversation id.
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Set the user id.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Transport of the target agent.
    pub fn transport_kind(&self) -> TransportKind {
        self.agent.transport_kind()
    }

    /// Whether the request carries a non-empty structured payload.
    pub fn has_payload(&self) -> bool {
        match &self.raw_payload {
            Value::Null => false,
            Value::Object(m) => !m.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }
}

/// Final state of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    /// Finished with content.
    Completed,
    /// Failed; see `error_message`.
    Error,
}

impl DispatchStatus {
    /// Lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// Token accounting for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input: u64,
    /// Completion tokens.
    pub output: u64,
    /// Sum of both.
    pub total: u64,
}

impl TokenUsage {
    /// Usage with the total filled in.
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }
}

/// Wall-clock timing of one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchTiming {
    /// Start time.
    pub start: DateTime<Utc>,
    /// End time.
    pub end: DateTime<Utc>,
    /// Elapsed milliseconds.
    pub duration_ms: u64,
}

impl DispatchTiming {
    /// Timing from `start` until now.
    pub fn since(start: DateTime<Utc>) -> Self {
        let end = Utc::now();
        let duration_ms = u64::try_from((end - start).num_milliseconds()).unwrap_or(0);
        Self {
            start,
            end,
            duration_ms,
        }
    }
}

/// Outcome of a dispatch. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    /// Response text.
    pub content: String,
    /// Provider that answered.
    pub provider: String,
    /// Model that answered.
    pub model: String,
    /// Token usage.
    pub usage: TokenUsage,
    /// Timing.
    pub timing: DispatchTiming,
    /// Final state.
    pub status: DispatchStatus,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// HTTP status of the upstream call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl DispatchResult {
    /// Whether the dispatch completed.
    pub fn is_success(&self) -> bool {
        self.status == DispatchStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::agent::AgentRecord;
    use serde_json::json;

    fn definition() -> Arc<AgentDefinition> {
        let mut record = AgentRecord::new("helper", "context").with_organization("acme");
        record.descriptor.prompts.system = Some("be brief".into());
        Arc::new(AgentDefinition::try_from(&record).unwrap())
    }

    #[test]
    fn test_request_inherits_agent_defaults() {
        let request = DispatchRequest::new(definition(), "hi");
        assert_eq!(request.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(request.organization_slug.as_deref(), Some("acme"));
        assert_eq!(request.mode, TaskMode::Converse);
        assert!(!request.routing.is_local);
    }

    #[test]
    fn test_has_payload() {
        let request = DispatchRequest::new(definition(), "hi");
        assert!(!request.has_payload());
        assert!(!request.clone().with_payload(json!({})).has_payload());
        assert!(request.with_payload(json!({"a": 1})).has_payload());
    }

    #[test]
    fn test_usage_total() {
        assert_eq!(TokenUsage::new(3, 4).total, 7);
    }
}
