//! In-memory approval store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ApprovalRecord, ApprovalStatus, NewApproval};
use crate::domain::ports::ApprovalStore;

/// [`ApprovalStore`] kept in a map.
#[derive(Default)]
pub struct InMemoryApprovalStore {
    approvals: RwLock<HashMap<Uuid, ApprovalRecord>>,
}

impl InMemoryApprovalStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn create(&self, approval: NewApproval) -> DomainResult<ApprovalRecord> {
        let record = approval.into_record();
        self.approvals.write().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ApprovalRecord>> {
        Ok(self.approvals.read().await.get(&id).cloned())
    }

    async fn set_status(
        &self,
        id: Uuid,
        from: ApprovalStatus,
        to: ApprovalStatus,
        decided_by: Option<&str>,
    ) -> DomainResult<ApprovalRecord> {
        let mut approvals = self.approvals.write().await;
        let record = approvals
            .get_mut(&id)
            .ok_or(DomainError::ApprovalNotFound(id))?;
        if record.status != from {
            return Err(DomainError::stale_status(record.status, from, to));
        }
        record.status = to;
        if to == ApprovalStatus::Pending {
            record.decided_by = None;
            record.decided_at = None;
        } else {
            record.decided_by = decided_by.map(str::to_string);
            record.decided_at = Some(Utc::now());
        }
        Ok(record.clone())
    }
}
