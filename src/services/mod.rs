//! Application services: dispatch, streaming, redaction, promotion and metrics.

pub mod content_normalizer;
pub mod dispatcher;
pub mod metrics;
pub mod promotion;
pub mod redaction;
pub mod registry_cache;
pub mod runtime;
pub mod stream_publisher;

pub use content_normalizer::{ContentNormalizer, NormalizedRequest};
pub use dispatcher::TransportDispatcher;
pub use metrics::{MetricsRecorder, MetricsSnapshot};
pub use promotion::PromotionService;
pub use redaction::RedactionPipeline;
pub use registry_cache::{CacheStats, RegistryCache};
pub use runtime::{AgentRuntime, Invocation};
pub use stream_publisher::{open_stream, StreamPublisher, StreamReceiver, StreamSession};
