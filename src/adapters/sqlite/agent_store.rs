//! SQLite implementation of the agent store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentDescriptor, AgentRecord, AgentStatus};
use crate::domain::ports::{merge_metadata, AgentStore};

use super::timestamp;

/// [`AgentStore`] over the `agents` table.
#[derive(Clone)]
pub struct SqliteAgentStore {
    pool: SqlitePool,
}

impl SqliteAgentStore {
    /// Store on `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Uniqueness key for a set of organization scopes.
fn scope_key(scopes: &[String]) -> String {
    let mut sorted: Vec<&str> = scopes.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.join(",")
}

#[async_trait]
impl AgentStore for SqliteAgentStore {
    async fn find_by_slug(&self, org: Option<&str>, slug: &str) -> DomainResult<Option<AgentRecord>> {
        let rows: Vec<AgentRow> = sqlx::query_as(
            "SELECT * FROM agents WHERE slug = ? ORDER BY json_array_length(organization_scopes) = 0, created_at",
        )
        .bind(slug)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let record = AgentRecord::try_from(row)?;
            if record.visible_to(org) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<AgentRecord>> {
        let row: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(AgentRecord::try_from).transpose()
    }

    async fn list_by_organization(&self, org: Option<&str>) -> DomainResult<Vec<AgentRecord>> {
        let rows: Vec<AgentRow> = match org {
            None => {
                sqlx::query_as(
                    "SELECT * FROM agents WHERE json_array_length(organization_scopes) = 0 ORDER BY slug",
                )
                .fetch_all(&self.pool)
                .await?
            }
            Some(org) => {
                sqlx::query_as(
                    "SELECT * FROM agents
                     WHERE EXISTS (SELECT 1 FROM json_each(agents.organization_scopes) WHERE json_each.value = ?)
                     ORDER BY slug",
                )
                .bind(org)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(AgentRecord::try_from).collect()
    }

    async fn latest_modified_at(&self) -> DomainResult<Option<DateTime<Utc>>> {
        let (latest,): (Option<String>,) = sqlx::query_as("SELECT MAX(updated_at) FROM agents")
            .fetch_one(&self.pool)
            .await?;
        super::parse_optional_datetime(latest)
    }

    async fn update_status(&self, id: Uuid, from: AgentStatus, to: AgentStatus) -> DomainResult<()> {
        let result =
            sqlx::query("UPDATE agents SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
                .bind(to.as_str())
                .bind(timestamp(Utc::now()))
                .bind(id.to_string())
                .bind(from.as_str())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() > 0 {
            return Ok(());
        }
        match self.find_by_id(id).await? {
            Some(current) => Err(DomainError::stale_status(current.status, from, to)),
            None => Err(DomainError::AgentNotFound(id.to_string())),
        }
    }

    async fn update_metadata(&self, id: Uuid, patch: Value) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        let current: Option<(String,)> = sqlx::query_as("SELECT metadata FROM agents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let Some((current,)) = current else {
            return Err(DomainError::AgentNotFound(id.to_string()));
        };

        let mut metadata: Value = serde_json::from_str(&current)?;
        merge_metadata(&mut metadata, patch);

        sqlx::query("UPDATE agents SET metadata = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&metadata)?)
            .bind(timestamp(Utc::now()))
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert(&self, record: &AgentRecord) -> DomainResult<()> {
        let result = sqlx::query(
            r#"INSERT INTO agents (id, slug, name, agent_type, organization_scopes, scope_key,
               status, descriptor, metadata, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(&record.slug)
        .bind(&record.name)
        .bind(&record.agent_type)
        .bind(serde_json::to_string(&record.organization_scopes)?)
        .bind(scope_key(&record.organization_scopes))
        .bind(record.status.as_str())
        .bind(serde_json::to_string(&record.descriptor)?)
        .bind(serde_json::to_string(&record.metadata)?)
        .bind(timestamp(record.created_at))
        .bind(timestamp(record.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DomainError::ValidationFailed(vec![format!(
                    "agent '{}' already exists in this scope",
                    record.slug
                )]))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    slug: String,
    name: String,
    agent_type: String,
    organization_scopes: Option<String>,
    status: String,
    descriptor: Option<String>,
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<AgentRow> for AgentRecord {
    type Error = DomainError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        let status = AgentStatus::parse_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;
        let descriptor: AgentDescriptor = super::parse_json_or_default(row.descriptor)?;
        let metadata: Value = super::parse_json_or_default(row.metadata)?;

        Ok(AgentRecord {
            id: super::parse_uuid(&row.id)?,
            slug: row.slug,
            name: row.name,
            agent_type: row.agent_type,
            organization_scopes: super::parse_json_or_default(row.organization_scopes)?,
            status,
            descriptor,
            metadata: if metadata.is_null() {
                Value::Object(serde_json::Map::new())
            } else {
                metadata
            },
            created_at: super::parse_datetime(&row.created_at)?,
            updated_at: super::parse_datetime(&row.updated_at)?,
        })
    }
}
