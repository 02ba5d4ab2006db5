//! Validation and policy ports consulted before promotion.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::DomainResult;

/// Result of descriptor validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// Whether the descriptor is valid.
    pub ok: bool,
    /// Problems found.
    pub issues: Vec<String>,
}

impl ValidationOutcome {
    /// Valid outcome with no issues.
    pub fn valid() -> Self {
        Self {
            ok: true,
            issues: Vec::new(),
        }
    }

    /// Invalid outcome.
    pub fn invalid(issues: Vec<String>) -> Self {
        Self { ok: false, issues }
    }
}

/// Validates an agent descriptor for its agent type.
#[async_trait]
pub trait ValidationService: Send + Sync {
    /// Validate `payload` for `agent_type`.
    async fn validate(&self, agent_type: &str, payload: &Value) -> DomainResult<ValidationOutcome>;
}

/// Organization policy checks. An empty list means the payload passes.
#[async_trait]
pub trait PolicyService: Send + Sync {
    /// Policy violations; empty when compliant.
    async fn check_policy(&self, payload: &Value) -> DomainResult<Vec<String>>;
}
