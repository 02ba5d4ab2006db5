//! Domain errors for the agent dispatch runtime.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Failures raised at the transport call boundary.
///
/// Only network-level failures and server errors are worth another attempt;
/// a 4xx or an application-level JSON-RPC error will fail the same way again.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// No response within the configured timeout.
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The request never reached the server.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server answered with a non-success status.
    #[error("upstream returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The remote agent returned a JSON-RPC error object.
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },
}

impl TransportError {
    /// Whether the retry policy should attempt the call again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Rpc { .. } => false,
        }
    }

    /// HTTP status associated with the failure, if the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Failures that produce an error `DispatchResult` rather than an `Err`.
    ///
    /// The server answered (HTTP status or JSON-RPC envelope), so there is a
    /// response to normalize.
    pub fn is_upstream_response(&self) -> bool {
        matches!(self, Self::Status { .. } | Self::Rpc { .. })
    }
}

/// Failures a stream producer observes when publishing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The session already emitted its terminal event.
    #[error("stream is closed")]
    Closed,

    /// The consumer dropped its end of the channel.
    #[error("stream consumer has gone away")]
    ConsumerGone,
}

/// Domain-level errors that can occur in the runtime.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No agent with the given slug or id is visible.
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// No approval with the given id.
    #[error("Approval not found: {0}")]
    ApprovalNotFound(Uuid),

    /// The approval exists but is not approved.
    #[error("Approval {id} has status {status}; promotion requires an approved request")]
    ApprovalNotGranted {
        /// Approval id.
        id: Uuid,
        /// Its current status.
        status: String,
    },

    /// A lifecycle transition is not allowed from the current status.
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        /// Status found.
        from: String,
        /// Status requested.
        to: String,
        /// Why the transition was refused.
        reason: String,
    },

    /// Descriptor or policy validation reported issues.
    #[error("Validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    /// A strict agent cannot accept the request's content.
    #[error("Content type mismatch: agent expects {expected}, request provides {provided}")]
    ContentTypeMismatch {
        /// Type the agent declares.
        expected: String,
        /// Type the request carries.
        provided: String,
    },

    /// Invalid agent or runtime configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport failure without an upstream response.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Storage failure.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// JSON encoding or decoding failure.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DomainError {
    /// A compare-and-set transition found `current` instead of `expected`.
    pub fn stale_status(
        current: impl fmt::Display,
        expected: impl fmt::Display,
        to: impl fmt::Display,
    ) -> Self {
        DomainError::InvalidStateTransition {
            from: current.to_string(),
            to: to.to_string(),
            reason: format!("expected status {expected}, it was changed concurrently"),
        }
    }
}

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
