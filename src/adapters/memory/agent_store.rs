//! In-memory agent store for tests and ephemeral runs.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentRecord, AgentStatus};
use crate::domain::ports::{merge_metadata, AgentStore};

/// [`AgentStore`] kept in a map, for tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryAgentStore {
    records: RwLock<HashMap<Uuid, AgentRecord>>,
    find_calls: AtomicUsize,
}

impl InMemoryAgentStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `find_by_slug` calls served so far.
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::Relaxed)
    }

    /// Stored status of `id`.
    pub async fn status_of(&self, id: Uuid) -> Option<AgentStatus> {
        self.records.read().await.get(&id).map(|r| r.status)
    }

    /// Bump an agent's `updated_at` past every other record, simulating a
    /// write from another process.
    pub async fn touch(&self, slug: &str) {
        let mut records = self.records.write().await;
        let stamp = next_stamp(&records);
        if let Some(record) = records.values_mut().find(|r| r.slug == slug) {
            record.updated_at = stamp;
        }
    }

    async fn modify<F>(&self, id: Uuid, apply: F) -> DomainResult<()>
    where
        F: FnOnce(&mut AgentRecord) -> DomainResult<()>,
    {
        let mut records = self.records.write().await;
        let stamp = next_stamp(&records);
        let record = records
            .get_mut(&id)
            .ok_or_else(|| DomainError::AgentNotFound(id.to_string()))?;
        apply(record)?;
        record.updated_at = stamp;
        Ok(())
    }
}

/// A timestamp strictly after every stored `updated_at`.
fn next_stamp(records: &HashMap<Uuid, AgentRecord>) -> DateTime<Utc> {
    let now = Utc::now();
    match records.values().map(|r| r.updated_at).max() {
        Some(latest) if latest >= now => latest + Duration::milliseconds(1),
        _ => now,
    }
}

#[async_trait]
impl AgentStore for InMemoryAgentStore {
    async fn find_by_slug(&self, org: Option<&str>, slug: &str) -> DomainResult<Option<AgentRecord>> {
        self.find_calls.fetch_add(1, Ordering::Relaxed);
        let records = self.records.read().await;
        let mut visible: Vec<&AgentRecord> = records
            .values()
            .filter(|r| r.slug == slug && r.visible_to(org))
            .collect();
        // Scoped records shadow global ones.
        visible.sort_by_key(|r| r.organization_scopes.is_empty());
        Ok(visible.first().map(|r| (*r).clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<AgentRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list_by_organization(&self, org: Option<&str>) -> DomainResult<Vec<AgentRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<AgentRecord> = records
            .values()
            .filter(|r| match org {
                None => r.organization_scopes.is_empty(),
                Some(org) => r.organization_scopes.iter().any(|s| s == org),
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(matching)
    }

    async fn latest_modified_at(&self) -> DomainResult<Option<DateTime<Utc>>> {
        Ok(self.records.read().await.values().map(|r| r.updated_at).max())
    }

    async fn update_status(&self, id: Uuid, from: AgentStatus, to: AgentStatus) -> DomainResult<()> {
        self.modify(id, |record| {
            if record.status != from {
                return Err(DomainError::stale_status(record.status, from, to));
            }
            record.status = to;
            Ok(())
        })
        .await
    }

    async fn update_metadata(&self, id: Uuid, patch: Value) -> DomainResult<()> {
        self.modify(id, |record| {
            merge_metadata(&mut record.metadata, patch);
            Ok(())
        })
        .await
    }

    async fn insert(&self, record: &AgentRecord) -> DomainResult<()> {
        let mut records = self.records.write().await;
        if records.values().any(|r| r.slug == record.slug && r.organization_scopes == record.organization_scopes) {
            return Err(DomainError::ValidationFailed(vec![format!(
                "agent '{}' already exists in this scope",
                record.slug
            )]));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }
}
