//! Agent records and resolved agent definitions.
//!
//! An [`AgentRecord`] is what the store persists: identity, lifecycle status and
//! a loosely typed descriptor. An [`AgentDefinition`] is the immutable snapshot
//! the registry hands to callers, with the transport configuration resolved
//! exactly once into a [`TransportConfig`] variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::content::ContentType;
use crate::domain::errors::{DomainError, DomainResult};

/// Capability name that forces human approval on promotion.
pub const ORCHESTRATE_CAPABILITY: &str = "orchestrate";

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Editable, not routable.
    Draft,
    /// Routable by the runtime.
    Active,
    /// Retired; kept for history.
    Archived,
}

impl AgentStatus {
    /// Lower-case name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    /// Parse a stored status, ignoring case.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s).ok_or_else(|| anyhow::anyhow!("Invalid agent status: {s}"))
    }
}

/// How an agent is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Managed generation.
    Llm,
    /// Plain HTTP endpoint.
    Api,
    /// Remote agent spoken to over JSON-RPC.
    External,
}

impl TransportKind {
    /// Lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Api => "api",
            Self::External => "external",
        }
    }

    /// Transport used for an agent type. Anything that is not an explicit
    /// `api` or `external` agent runs on managed generation.
    pub fn for_agent_type(agent_type: &str) -> Self {
        match agent_type.to_lowercase().as_str() {
            "api" => Self::Api,
            "external" => Self::External,
            _ => Self::Llm,
        }
    }

    /// Whether the transport can push partial output while running.
    pub fn streams_natively(&self) -> bool {
        matches!(self, Self::Llm)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task mode a request is issued in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    /// Free-form conversation.
    #[default]
    Converse,
    /// Planning without side effects.
    Plan,
    /// Produce an artifact.
    Build,
}

impl TaskMode {
    /// Lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Converse => "converse",
            Self::Plan => "plan",
            Self::Build => "build",
        }
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "converse" => Ok(Self::Converse),
            "plan" => Ok(Self::Plan),
            "build" => Ok(Self::Build),
            _ => Err(anyhow::anyhow!("Invalid task mode: {s}")),
        }
    }
}

/// Managed generation settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// Provider name; the configured default when unset.
    #[serde(default)]
    pub provider: Option<String>,
    /// Model identifier.
    #[serde(default)]
    pub model: Option<String>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Output token cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Per-agent timeout override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Literal body template for API agents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTransform {
    /// Body with `{{placeholder}}` substitutions.
    #[serde(default)]
    pub template: Option<String>,
}

/// Field extraction applied to a response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTransform {
    /// Dotted path of the field to extract.
    #[serde(default)]
    pub field: Option<String>,
}

fn default_method() -> String {
    "POST".to_string()
}

/// HTTP API endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    /// Endpoint URL.
    pub url: String,
    /// HTTP method, `POST` by default.
    #[serde(default = "default_method")]
    pub method: String,
    /// Headers sent with every call, subject to the allow-list.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Body template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_transform: Option<RequestTransform>,
    /// Field extracted from the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_transform: Option<ResponseTransform>,
}

/// Remote agent (JSON-RPC 2.0 over HTTP POST) settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalConfig {
    /// JSON-RPC endpoint URL.
    pub url: String,
    /// Headers sent with every call, subject to the allow-list.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Field extracted from the JSON-RPC result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_transform: Option<ResponseTransform>,
}

/// Transport configuration, resolved once when a definition is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Managed generation.
    Llm(LlmConfig),
    /// HTTP endpoint.
    Api(ApiConfig),
    /// JSON-RPC remote agent.
    External(ExternalConfig),
}

impl TransportConfig {
    /// Transport this configuration belongs to.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Llm(_) => TransportKind::Llm,
            Self::Api(_) => TransportKind::Api,
            Self::External(_) => TransportKind::External,
        }
    }

    /// Per-agent timeout override in milliseconds.
    pub fn timeout_ms(&self) -> Option<u64> {
        match self {
            Self::Llm(c) => c.timeout_ms,
            Self::Api(c) => c.timeout_ms,
            Self::External(c) => c.timeout_ms,
        }
    }
}

/// Prompt templates used for managed generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplates {
    /// System prompt.
    #[serde(default)]
    pub system: Option<String>,
}

/// Declared input/output content types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoContentTypes {
    /// Default expected input type for every mode.
    #[serde(default)]
    pub input: Option<ContentType>,
    /// Per-mode overrides of `input`.
    #[serde(default)]
    pub modes: HashMap<TaskMode, ContentType>,
    /// Declared output type.
    #[serde(default)]
    pub output: Option<ContentType>,
    /// Strict agents reject requests whose content cannot be adapted.
    #[serde(default)]
    pub strict: bool,
    /// Organization template for rendering JSON payloads as text.
    /// Placeholders: `{{message}}`, `{{payload}}`.
    #[serde(default)]
    pub json_template: Option<String>,
}

impl IoContentTypes {
    /// Input type expected in `mode`.
    pub fn expected_input(&self, mode: TaskMode) -> Option<ContentType> {
        self.modes.get(&mode).copied().or(self.input)
    }
}

/// Agent-level redaction settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionSettings {
    /// Payload fields masked before a remote call, e.g. `customer.ssn`.
    #[serde(default)]
    pub field_paths: Vec<String>,
}

/// Loosely typed descriptor blocks as persisted alongside an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    /// Endpoint block; its shape depends on the agent type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Value>,
    /// Generation settings for managed agents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmConfig>,
    /// Capability names, e.g. `orchestrate`.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Prompt templates.
    #[serde(default)]
    pub prompts: PromptTemplates,
    /// Declared content types.
    #[serde(default)]
    pub io: IoContentTypes,
    /// Redaction settings.
    #[serde(default)]
    pub redaction: RedactionSettings,
}

/// Persisted agent row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    /// Store identity.
    pub id: Uuid,
    /// Unique routing name.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Agent kind, e.g. `context`, `api`, `external`, `rag`.
    pub agent_type: String,
    /// Organizations allowed to call the agent; empty means all.
    #[serde(default)]
    pub organization_scopes: Vec<String>,
    /// Lifecycle status.
    pub status: AgentStatus,
    /// Descriptor blocks.
    #[serde(default)]
    pub descriptor: AgentDescriptor,
    /// Free-form metadata; holds promotion bookkeeping.
    #[serde(default)]
    pub metadata: Value,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    /// Create a new draft agent.
    pub fn new(slug: impl Into<String>, agent_type: impl Into<String>) -> Self {
        let slug = slug.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: slug.clone(),
            slug,
            agent_type: agent_type.into(),
            organization_scopes: Vec::new(),
            status: AgentStatus::Draft,
            descriptor: AgentDescriptor::default(),
            metadata: Value::Object(serde_json::Map::new()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add an organization scope.
    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization_scopes.push(org.into());
        self
    }

    /// Set the lifecycle status.
    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    /// Replace the descriptor.
    pub fn with_descriptor(mut self, descriptor: AgentDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// Set the endpoint block.
    pub fn with_endpoint(mut self, endpoint: Value) -> Self {
        self.descriptor.endpoint = Some(endpoint);
        self
    }

    /// Add a capability.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.descriptor.capabilities.push(capability.into());
        self
    }

    /// Case-insensitive capability check.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.descriptor
            .capabilities
            .iter()
            .any(|c| c.eq_ignore_ascii_case(capability))
    }

    /// Whether the record is visible to an organization scope.
    /// Records without scopes are global and visible everywhere.
    pub fn visible_to(&self, org: Option<&str>) -> bool {
        match org {
            None => self.organization_scopes.is_empty(),
            Some(org) => {
                self.organization_scopes.is_empty()
                    || self.organization_scopes.iter().any(|s| s == org)
            }
        }
    }

    /// JSON view of the record handed to validation and policy services.
    pub fn validation_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Capabilities an agent exposes to the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionCapabilities {
    /// Capability names as declared.
    pub capabilities: Vec<String>,
}

impl ExecutionCapabilities {
    /// Case-insensitive capability check.
    pub fn has(&self, capability: &str) -> bool {
        self.capabilities
            .iter()
            .any(|c| c.eq_ignore_ascii_case(capability))
    }
}

/// Immutable snapshot of an agent used for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinition {
    /// Store identity.
    pub id: Uuid,
    /// Routing name.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Agent kind as declared.
    pub agent_type: String,
    /// Organizations allowed to call the agent.
    pub organization_scopes: Vec<String>,
    /// Resolved transport.
    pub transport: TransportConfig,
    /// Declared capabilities.
    pub capabilities: ExecutionCapabilities,
    /// Prompt templates.
    pub prompts: PromptTemplates,
    /// Redaction settings.
    pub redaction: RedactionSettings,
    /// Declared content types.
    pub io: IoContentTypes,
    /// Status at snapshot time.
    pub status: AgentStatus,
}

impl AgentDefinition {
    /// Shorthand for `transport.kind()`.
    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// First organization the agent belongs to, `None` for global agents.
    pub fn primary_organization(&self) -> Option<&str> {
        self.organization_scopes.first().map(String::as_str)
    }
}

impl TryFrom<&AgentRecord> for AgentDefinition {
    type Error = DomainError;

    fn try_from(record: &AgentRecord) -> DomainResult<Self> {
        let transport = resolve_transport(record)?;
        Ok(Self {
            id: record.id,
            slug: record.slug.clone(),
            name: record.name.clone(),
            agent_type: record.agent_type.clone(),
            organization_scopes: record.organization_scopes.clone(),
            transport,
            capabilities: ExecutionCapabilities {
                capabilities: record.descriptor.capabilities.clone(),
            },
            prompts: record.descriptor.prompts.clone(),
            redaction: record.descriptor.redaction.clone(),
            io: record.descriptor.io.clone(),
            status: record.status,
        })
    }
}

fn resolve_transport(record: &AgentRecord) -> DomainResult<TransportConfig> {
    let kind = TransportKind::for_agent_type(&record.agent_type);
    let endpoint = || {
        record.descriptor.endpoint.clone().ok_or_else(|| {
            DomainError::Configuration(format!(
                "agent '{}' of type '{}' has no endpoint configured",
                record.slug, record.agent_type
            ))
        })
    };
    let invalid = |e: serde_json::Error| {
        DomainError::Configuration(format!(
            "agent '{}' has an invalid endpoint: {e}",
            record.slug
        ))
    };

    let transport = match kind {
        TransportKind::Llm => {
            TransportConfig::Llm(record.descriptor.llm.clone().unwrap_or_default())
        }
        TransportKind::Api => {
            let config: ApiConfig = serde_json::from_value(endpoint()?).map_err(invalid)?;
            TransportConfig::Api(config)
        }
        TransportKind::External => {
            let config: ExternalConfig = serde_json::from_value(endpoint()?).map_err(invalid)?;
            TransportConfig::External(config)
        }
    };

    let url = match &transport {
        TransportConfig::Api(c) => Some(c.url.as_str()),
        TransportConfig::External(c) => Some(c.url.as_str()),
        TransportConfig::Llm(_) => None,
    };
    if url.is_some_and(|u| u.trim().is_empty()) {
        return Err(DomainError::Configuration(format!(
            "agent '{}' has an empty endpoint url",
            record.slug
        )));
    }

    Ok(transport)
}
