//! Promotion approval records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use super::agent::AgentStatus;

/// Approval mode recorded for promotion requests.
pub const AGENT_PROMOTION_MODE: &str = "agent_promotion";

/// Decision state of an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    /// Awaiting a decision.
    Pending,
    /// Approved; the agent was activated.
    Approved,
    /// Rejected; the agent stays where it was.
    Rejected,
}

impl ApprovalStatus {
    /// Lower-case name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parse a stored status, ignoring case.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted approval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    /// Approval identity.
    pub id: Uuid,
    /// Organization the agent belongs to.
    pub organization_scope: Option<String>,
    /// Agent awaiting promotion.
    pub agent_id: Uuid,
    /// Slug of that agent at request time.
    pub agent_slug: String,
    /// Request kind, e.g. `agent_promotion`.
    pub mode: String,
    /// Decision state.
    pub status: ApprovalStatus,
    /// Requesting user.
    pub requested_by: Option<String>,
    /// Deciding user.
    pub decided_by: Option<String>,
    /// Context captured at request time.
    pub metadata: Value,
    /// Request time.
    pub created_at: DateTime<Utc>,
    /// Decision time.
    pub decided_at: Option<DateTime<Utc>>,
}

/// Fields supplied when an approval is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApproval {
    /// Organization the agent belongs to.
    pub organization_scope: Option<String>,
    /// Agent awaiting promotion.
    pub agent_id: Uuid,
    /// Slug of that agent.
    pub agent_slug: String,
    /// Request kind.
    pub mode: String,
    /// Requesting user.
    pub requested_by: Option<String>,
    /// Context to store with the request.
    pub metadata: Value,
}

impl NewApproval {
    /// Pending record with a fresh id.
    pub fn into_record(self) -> ApprovalRecord {
        ApprovalRecord {
            id: Uuid::new_v4(),
            organization_scope: self.organization_scope,
            agent_id: self.agent_id,
            agent_slug: self.agent_slug,
            mode: self.mode,
            status: ApprovalStatus::Pending,
            requested_by: self.requested_by,
            decided_by: None,
            metadata: self.metadata,
            created_at: Utc::now(),
            decided_at: None,
        }
    }
}

/// Options for a promotion request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionOptions {
    /// Skip descriptor validation.
    pub skip_validation: bool,
    /// Overrides the computed approval requirement.
    pub require_approval: Option<bool>,
    /// User recorded on any approval opened.
    pub requested_by: Option<String>,
}

/// Outcome of a promotion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionResult {
    /// Whether the request was accepted.
    pub success: bool,
    /// Whether activation waits on an approval.
    pub requires_approval: bool,
    /// Approval opened for the request.
    pub approval_id: Option<Uuid>,
    /// Agent status after the request.
    pub status: AgentStatus,
    /// Validation or policy issues.
    pub issues: Vec<String>,
    /// Human-readable summary.
    pub message: Option<String>,
}

impl PromotionResult {
    /// Activated without approval.
    pub fn promoted() -> Self {
        Self {
            success: true,
            requires_approval: false,
            approval_id: None,
            status: AgentStatus::Active,
            issues: Vec::new(),
            message: None,
        }
    }

    /// Waiting on `approval_id`.
    pub fn pending_approval(approval_id: Uuid, status: AgentStatus) -> Self {
        Self {
            success: true,
            requires_approval: true,
            approval_id: Some(approval_id),
            status,
            issues: Vec::new(),
            message: Some("promotion awaits approval".to_string()),
        }
    }

    /// Refused with the given issues.
    pub fn rejected(status: AgentStatus, issues: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            requires_approval: false,
            approval_id: None,
            status,
            issues,
            message: Some(message.into()),
        }
    }
}

/// Outcome of a demote or archive transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResult {
    /// Whether the transition was applied.
    pub success: bool,
    /// Status before.
    pub previous_status: AgentStatus,
    /// Status after.
    pub new_status: AgentStatus,
    /// Reason supplied by the caller.
    pub reason: Option<String>,
}
