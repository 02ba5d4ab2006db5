//! SQLite adapters for agents, approvals and redaction rules.

pub mod agent_store;
pub mod approval_store;
pub mod connection;
pub mod migrations;
pub mod redaction_rules;

pub use agent_store::SqliteAgentStore;
pub use approval_store::SqliteApprovalStore;
pub use connection::{database_url, open_memory_pool, open_pool, ping, ConnectionError};
pub use migrations::{Migration, MigrationError, Migrator, MIGRATIONS};
pub use redaction_rules::SqliteRedactionRuleSource;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::DatabaseConfig;

/// Fixed-width RFC 3339 so stored timestamps order lexically.
pub fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a UUID string from a SQLite row field.
pub fn parse_uuid(s: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an optional RFC3339 datetime string from a SQLite row field.
pub fn parse_optional_datetime(s: Option<String>) -> DomainResult<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_datetime).transpose()
}

/// Parse a JSON string from a SQLite row field, falling back to the type's default.
pub fn parse_json_or_default<T: serde::de::DeserializeOwned + Default>(
    s: Option<String>,
) -> DomainResult<T> {
    s.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(Option::unwrap_or_default)
}

/// Failures preparing the database at startup.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// The pool could not be opened.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    /// The schema could not be brought up to date.
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

/// Open the configured database and bring its schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> Result<SqlitePool, DatabaseError> {
    let pool = open_pool(config).await?;
    Migrator::new(pool.clone()).run(MIGRATIONS).await?;
    Ok(pool)
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = open_memory_pool().await?;
    Migrator::new(pool.clone()).run(MIGRATIONS).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_round_trip_and_ordering() {
        let early = parse_datetime("2026-01-01T00:00:00Z").unwrap();
        let late = early + chrono::Duration::microseconds(1);
        assert!(timestamp(early) < timestamp(late));
        assert_eq!(parse_datetime(&timestamp(late)).unwrap(), late);
    }
}
