//! Agentry - agent dispatch, streaming and promotion runtime
//!
//! Agentry resolves registered agents, adapts requests to what each agent
//! accepts, scrubs sensitive content, and dispatches to managed generation,
//! HTTP APIs or remote JSON-RPC agents, aggregated or as an ordered event
//! stream. A promotion state machine gates agents from draft to active,
//! with an approval step for high-privilege agents.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Service Layer** (`services`): registry cache, normalizer, redaction,
//!   dispatcher, stream publisher, metrics and promotion
//! - **Adapters** (`adapters`): SQLite, in-memory, reqwest and Anthropic
//!   implementations of the ports
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use agentry::services::{AgentRuntime, Invocation};
//!
//! let result = runtime
//!     .invoke(Invocation::new("weather", "forecast for Oslo").with_organization("acme"))
//!     .await?;
//! println!("{}", result.content);
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult, StreamError, TransportError};
pub use domain::models::{
    AgentDefinition, AgentRecord, AgentStatus, Config, ContentType, DispatchRequest,
    DispatchResult, DispatchStatus, PromotionOptions, PromotionResult, StreamChunk, StreamEvent,
    TaskMode, TransitionResult, TransportKind,
};
pub use domain::ports::{
    AgentStore, ApprovalStore, GenerationService, HttpClient, PolicyService, RedactionRuleSource,
    ValidationService,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    AgentRuntime, ContentNormalizer, Invocation, MetricsRecorder, PromotionService,
    RedactionPipeline, RegistryCache, StreamPublisher, TransportDispatcher,
};
