//! File-backed SQLite store for multi-node tests
//!
//! `sqlite::memory:` gives every connection its own database, so tests that
//! simulate several nodes share one database file in a temporary directory.

use scheduler_core::DatabaseConfig;
use scheduler_errors::{SchedulerError, SchedulerResult};
use scheduler_infrastructure::SqliteTaskLockRepository;
use tempfile::TempDir;

pub struct SqliteTestStore {
    // Keeps the directory alive for as long as the store is in use
    _dir: TempDir,
    config: DatabaseConfig,
}

impl SqliteTestStore {
    pub fn new() -> SchedulerResult<Self> {
        let dir = tempfile::tempdir()
            .map_err(|e| SchedulerError::Internal(format!("创建临时目录失败: {e}")))?;
        let path = dir.path().join("scheduler_test.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", path.display()),
            max_connections: 2,
            connection_timeout_seconds: 5,
        };
        Ok(Self { _dir: dir, config })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Connects a repository acting as `node_id`; migrations run on connect
    pub async fn node(&self, node_id: &str) -> SchedulerResult<SqliteTaskLockRepository> {
        SqliteTaskLockRepository::connect(&self.config, node_id).await
    }
}
