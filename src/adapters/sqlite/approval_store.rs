//! SQLite-backed approval store.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ApprovalRecord, ApprovalStatus, NewApproval};
use crate::domain::ports::ApprovalStore;

use super::timestamp;

/// [`ApprovalStore`] over the `approvals` table.
#[derive(Clone)]
pub struct SqliteApprovalStore {
    pool: SqlitePool,
}

impl SqliteApprovalStore {
    /// Store on `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApprovalStore for SqliteApprovalStore {
    async fn create(&self, approval: NewApproval) -> DomainResult<ApprovalRecord> {
        let record = approval.into_record();
        sqlx::query(
            r#"INSERT INTO approvals (id, organization_scope, agent_id, agent_slug, mode, status,
               requested_by, decided_by, metadata, created_at, decided_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(&record.organization_scope)
        .bind(record.agent_id.to_string())
        .bind(&record.agent_slug)
        .bind(&record.mode)
        .bind(record.status.as_str())
        .bind(&record.requested_by)
        .bind(&record.decided_by)
        .bind(serde_json::to_string(&record.metadata)?)
        .bind(timestamp(record.created_at))
        .bind(record.decided_at.map(timestamp))
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<ApprovalRecord>> {
        let row: Option<ApprovalRow> = sqlx::query_as("SELECT * FROM approvals WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(ApprovalRecord::try_from).transpose()
    }

    async fn set_status(
        &self,
        id: Uuid,
        from: ApprovalStatus,
        to: ApprovalStatus,
        decided_by: Option<&str>,
    ) -> DomainResult<ApprovalRecord> {
        let (decided_by, decided_at) = if to == ApprovalStatus::Pending {
            (None, None)
        } else {
            (decided_by, Some(timestamp(Utc::now())))
        };

        let result = sqlx::query(
            "UPDATE approvals SET status = ?, decided_by = ?, decided_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(decided_by)
        .bind(decided_at)
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        let current = self.get(id).await?.ok_or(DomainError::ApprovalNotFound(id))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::stale_status(current.status, from, to));
        }
        Ok(current)
    }
}

#[derive(sqlx::FromRow)]
struct ApprovalRow {
    id: String,
    organization_scope: Option<String>,
    agent_id: String,
    agent_slug: String,
    mode: String,
    status: String,
    requested_by: Option<String>,
    decided_by: Option<String>,
    metadata: Option<String>,
    created_at: String,
    decided_at: Option<String>,
}

impl TryFrom<ApprovalRow> for ApprovalRecord {
    type Error = DomainError;

    fn try_from(row: ApprovalRow) -> Result<Self, Self::Error> {
        let status = ApprovalStatus::parse_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;
        let metadata: Value = super::parse_json_or_default(row.metadata)?;

        Ok(ApprovalRecord {
            id: super::parse_uuid(&row.id)?,
            organization_scope: row.organization_scope,
            agent_id: super::parse_uuid(&row.agent_id)?,
            agent_slug: row.agent_slug,
            mode: row.mode,
            status,
            requested_by: row.requested_by,
            decided_by: row.decided_by,
            metadata,
            created_at: super::parse_datetime(&row.created_at)?,
            decided_at: super::parse_optional_datetime(row.decided_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteAgentStore};
    use crate::domain::models::{AgentRecord, AGENT_PROMOTION_MODE};
    use crate::domain::ports::AgentStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_approval_round_trip() {
        let pool = create_migrated_test_pool().await.unwrap();
        let agents = SqliteAgentStore::new(pool.clone());
        let approvals = SqliteApprovalStore::new(pool);

        let agent = AgentRecord::new("weather", "api").with_organization("acme");
        agents.insert(&agent).await.unwrap();

        let created = approvals
            .create(NewApproval {
                organization_scope: Some("acme".into()),
                agent_id: agent.id,
                agent_slug: agent.slug.clone(),
                mode: AGENT_PROMOTION_MODE.into(),
                requested_by: Some("dev".into()),
                metadata: json!({"fromStatus": "draft"}),
            })
            .await
            .unwrap();
        assert_eq!(created.status, ApprovalStatus::Pending);

        let fetched = approvals.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.agent_id, agent.id);
        assert_eq!(fetched.metadata["fromStatus"], "draft");
        assert!(fetched.decided_at.is_none());

        let decided = approvals
            .set_status(created.id, ApprovalStatus::Pending, ApprovalStatus::Approved, Some("ops"))
            .await
            .unwrap();
        assert_eq!(decided.status, ApprovalStatus::Approved);
        assert_eq!(decided.decided_by.as_deref(), Some("ops"));
        assert!(decided.decided_at.is_some());

        let err = approvals
            .set_status(created.id, ApprovalStatus::Pending, ApprovalStatus::Rejected, Some("late"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidStateTransition { ref from, .. } if from == "approved"
        ));
        let unchanged = approvals.get(created.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, ApprovalStatus::Approved);
        assert_eq!(unchanged.decided_by.as_deref(), Some("ops"));

        let err = approvals
            .set_status(Uuid::new_v4(), ApprovalStatus::Pending, ApprovalStatus::Rejected, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ApprovalNotFound(_)));
    }
}
