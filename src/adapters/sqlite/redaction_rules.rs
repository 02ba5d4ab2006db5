//! SQLite-backed redaction rule source.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::DomainResult;
use crate::domain::models::RedactionRule;
use crate::domain::ports::RedactionRuleSource;

/// Redaction rules read from the `redaction_rules` table.
#[derive(Clone)]
pub struct SqliteRedactionRuleSource {
    pool: SqlitePool,
}

impl SqliteRedactionRuleSource {
    /// Source on `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a rule after the organization's existing ones.
    pub async fn add(&self, rule: &RedactionRule) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO redaction_rules (organization_scope, pattern, flags, replacement) VALUES (?, ?, ?, ?)",
        )
        .bind(&rule.organization_scope)
        .bind(&rule.pattern)
        .bind(&rule.flags)
        .bind(&rule.replacement)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RedactionRuleSource for SqliteRedactionRuleSource {
    async fn rules_for(&self, org: &str) -> DomainResult<Vec<RedactionRule>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT organization_scope, pattern, flags, replacement FROM redaction_rules
             WHERE organization_scope = ? ORDER BY id",
        )
        .bind(org)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(organization_scope, pattern, flags, replacement)| RedactionRule {
                organization_scope,
                pattern,
                flags,
                replacement,
            })
            .collect())
    }
}
