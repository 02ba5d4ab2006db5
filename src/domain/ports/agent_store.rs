//! Agent store port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentRecord, AgentStatus};

/// Persistence interface for agent records.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Find an agent visible to `org` by slug. `None` org means global agents only.
    async fn find_by_slug(&self, org: Option<&str>, slug: &str) -> DomainResult<Option<AgentRecord>>;

    /// Find an agent by ID.
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<AgentRecord>>;

    /// List agents scoped to exactly `org`, or the global agents when `None`.
    async fn list_by_organization(&self, org: Option<&str>) -> DomainResult<Vec<AgentRecord>>;

    /// Most recent modification time across all agents.
    async fn latest_modified_at(&self) -> DomainResult<Option<DateTime<Utc>>>;

    /// Move the agent from `from` to `to` in one step.
    ///
    /// Fails with `InvalidStateTransition` when the stored status is no
    /// longer `from`.
    async fn update_status(&self, id: Uuid, from: AgentStatus, to: AgentStatus) -> DomainResult<()>;

    /// Shallow-merge `patch` into the agent's metadata object.
    async fn update_metadata(&self, id: Uuid, patch: Value) -> DomainResult<()>;

    /// Insert a new agent record.
    async fn insert(&self, record: &AgentRecord) -> DomainResult<()>;
}

/// Shallow JSON merge used by store implementations for `update_metadata`.
pub fn merge_metadata(base: &mut Value, patch: Value) {
    match (base.as_object_mut(), patch) {
        (Some(target), Value::Object(patch)) => {
            for (k, v) in patch {
                target.insert(k, v);
            }
        }
        (_, Value::Object(patch)) => *base = Value::Object(patch),
        _ => {}
    }
}
