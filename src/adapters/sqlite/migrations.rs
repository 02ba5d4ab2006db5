//! Embedded schema migrations, applied in version order inside one
//! transaction each.

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

/// Failures applying schema migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The version ledger table is unusable.
    #[error("Cannot read or create the migration ledger: {0}")]
    Ledger(#[source] sqlx::Error),
    /// A migration script failed and was rolled back.
    #[error("Migration {version} ({description}) failed: {source}")]
    Apply {
        /// Failing migration version.
        version: i64,
        /// Its description.
        description: &'static str,
        /// Underlying SQL error.
        #[source]
        source: sqlx::Error,
    },
}

/// One versioned schema script.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Monotonic version number.
    pub version: i64,
    /// Short description recorded in the ledger.
    pub description: &'static str,
    /// SQL applied in one transaction.
    pub sql: &'static str,
}

/// Every migration shipped with the binary, oldest first.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "agents, approvals and redaction rules",
    sql: include_str!("../../../migrations/001_initial_schema.sql"),
}];

/// Applies pending migrations to a pool.
pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    /// Migrator for `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply what is newer than the recorded version. Returns the number applied.
    pub async fn run(&self, migrations: &[Migration]) -> Result<usize, MigrationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(MigrationError::Ledger)?;

        let current = self.current_version().await?;
        let mut applied = 0;
        for migration in migrations.iter().filter(|m| m.version > current) {
            self.apply(migration).await?;
            info!(version = migration.version, description = migration.description, "Applied migration");
            applied += 1;
        }
        Ok(applied)
    }

    /// Highest applied version, 0 for a fresh database.
    pub async fn current_version(&self) -> Result<i64, MigrationError> {
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
            .fetch_one(&self.pool)
            .await
            .map_err(MigrationError::Ledger)
    }

    async fn apply(&self, migration: &Migration) -> Result<(), MigrationError> {
        let failed = |source| MigrationError::Apply {
            version: migration.version,
            description: migration.description,
            source,
        };

        let mut tx = self.pool.begin().await.map_err(failed)?;
        sqlx::raw_sql(migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        sqlx::query("INSERT INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.description)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        tx.commit().await.map_err(failed)
    }
}
