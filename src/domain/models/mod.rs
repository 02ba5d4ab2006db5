//! Domain models shared by services and adapters.

pub mod agent;
pub mod approval;
pub mod config;
pub mod content;
pub mod dispatch;
pub mod field_path;
pub mod redaction;
pub mod stream;

pub use agent::{
    AgentDefinition, AgentDescriptor, AgentRecord, AgentStatus, ApiConfig,
    ExecutionCapabilities, ExternalConfig, IoContentTypes, LlmConfig, PromptTemplates,
    RedactionSettings, RequestTransform, ResponseTransform, TaskMode, TransportConfig,
    TransportKind, ORCHESTRATE_CAPABILITY,
};
pub use approval::{
    ApprovalRecord, ApprovalStatus, NewApproval, PromotionOptions, PromotionResult,
    TransitionResult, AGENT_PROMOTION_MODE,
};
pub use config::{
    AnthropicConfig, Config, DatabaseConfig, DispatcherConfig, LoggingConfig, MetricsConfig,
    RegistryConfig, RetryConfig, StreamConfig,
};
pub use content::ContentType;
pub use dispatch::{
    DispatchRequest, DispatchResult, DispatchStatus, DispatchTiming, RoutingDecision, TokenUsage,
};
pub use field_path::{FieldPath, PathSegment};
pub use redaction::{RedactionContext, RedactionRule};
pub use stream::{ChunkKind, StreamChunk, StreamEvent};
