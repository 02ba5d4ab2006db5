//! Approval store port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ApprovalRecord, ApprovalStatus, NewApproval};

/// Persistence interface for approval requests.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Open a pending approval.
    async fn create(&self, approval: NewApproval) -> DomainResult<ApprovalRecord>;

    /// Fetch an approval by id.
    async fn get(&self, id: Uuid) -> DomainResult<Option<ApprovalRecord>>;

    /// Move the approval from `from` to `to`, setting `decided_at` when `to`
    /// is not pending. Fails with `InvalidStateTransition` when the stored
    /// status is no longer `from`.
    async fn set_status(
        &self,
        id: Uuid,
        from: ApprovalStatus,
        to: ApprovalStatus,
        decided_by: Option<&str>,
    ) -> DomainResult<ApprovalRecord>;
}
