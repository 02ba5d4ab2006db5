//! Pools for the agent registry database.
//!
//! File databases run in WAL mode so the invalidation poller can read while
//! promotions write. The in-memory pool is pinned to one connection because
//! every `:memory:` connection is a separate database.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::DatabaseConfig;

const MEMORY_URL: &str = "sqlite::memory:";
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);

/// Failures opening the database.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The configured path is not a usable SQLite location.
    #[error("Invalid database location '{0}'")]
    InvalidLocation(String),
    /// The parent directory could not be created.
    #[error("Cannot create database directory {path}: {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// SQLite refused the connection.
    #[error("Cannot open database: {0}")]
    Open(#[source] sqlx::Error),
}

/// `sqlite:` URL for a configured path; URLs pass through.
pub fn database_url(path: &str) -> String {
    if path.starts_with("sqlite:") {
        path.to_string()
    } else {
        format!("sqlite:{path}")
    }
}

/// File behind a `sqlite:` URL, `None` for in-memory databases.
fn database_file(url: &str) -> Option<&Path> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let file = rest.split('?').next().unwrap_or(rest);
    (!file.is_empty() && file != ":memory:").then(|| Path::new(file))
}

/// Open the configured database, creating the file and its directory.
pub async fn open_pool(config: &DatabaseConfig) -> Result<SqlitePool, ConnectionError> {
    let url = database_url(&config.path);
    if let Some(dir) = database_file(&url).and_then(Path::parent) {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|source| ConnectionError::CreateDirectory {
                path: dir.to_path_buf(),
                source,
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(&url)
        .map_err(|_| ConnectionError::InvalidLocation(config.path.clone()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .min_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await
        .map_err(ConnectionError::Open)
}

/// Private in-memory database, alive as long as the pool.
pub async fn open_memory_pool() -> Result<SqlitePool, ConnectionError> {
    let options = SqliteConnectOptions::from_str(MEMORY_URL)
        .map_err(|_| ConnectionError::InvalidLocation(MEMORY_URL.to_string()))?
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(ConnectionError::Open)
}

/// Run a trivial query to confirm the pool is usable.
pub async fn ping(pool: &SqlitePool) -> Result<(), ConnectionError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(ConnectionError::Open)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_and_file() {
        assert_eq!(database_url(".agentry/agentry.db"), "sqlite:.agentry/agentry.db");
        assert_eq!(database_url(MEMORY_URL), MEMORY_URL);

        assert_eq!(
            database_file("sqlite://data/a.db?mode=rwc"),
            Some(Path::new("data/a.db"))
        );
        assert_eq!(database_file(MEMORY_URL), None);
    }

    #[tokio::test]
    async fn test_open_pool_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/agentry.db");
        let config = DatabaseConfig {
            path: path.to_string_lossy().into_owned(),
            max_connections: 2,
        };

        let pool = open_pool(&config).await.unwrap();
        ping(&pool).await.unwrap();
        assert!(path.exists());
    }
}
