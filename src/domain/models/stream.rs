//! Streaming session events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dispatch::DispatchResult;

/// Kind of a streamed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Incremental output text.
    Partial,
    /// Status message, not part of the output.
    Progress,
    /// Last piece of output.
    Final,
}

/// A piece of streamed output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Chunk kind.
    pub kind: ChunkKind,
    /// Chunk text.
    pub content: String,
    /// Transport-specific extras.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl StreamChunk {
    /// Partial output chunk.
    pub fn partial(content: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::Partial,
            content: content.into(),
            metadata: None,
        }
    }

    /// Progress chunk.
    pub fn progress(content: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::Progress,
            content: content.into(),
            metadata: None,
        }
    }

    /// Final chunk.
    pub fn final_chunk(content: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::Final,
            content: content.into(),
            metadata: None,
        }
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Events observed by a stream consumer.
///
/// Every stream yields `Start` first and ends with exactly one of
/// `Complete` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Session opened.
    Start {
        /// Session identifier.
        stream_id: String,
    },
    /// Output chunk.
    Chunk(StreamChunk),
    /// Session finished normally or was cancelled.
    Complete {
        /// Final result; `None` when cancelled.
        result: Option<Box<DispatchResult>>,
        /// Whether the consumer cancelled.
        cancelled: bool,
    },
    /// Session failed.
    Error {
        /// Failure description.
        message: String,
    },
}

impl StreamEvent {
    /// Whether the event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// Event name as sent on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Chunk(_) => "chunk",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}
