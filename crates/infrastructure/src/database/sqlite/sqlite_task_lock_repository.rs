use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::DatabaseConfig;
use scheduler_domain::{TaskLockRepository, TriggerRow};
use scheduler_errors::SchedulerResult;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use crate::error_handling::{LockOperationContext, RepositoryErrorHelpers, RepositoryOperation};

/// 基于 SQLite 的任务锁仓储
///
/// 每个持久化任务对应 `scheduler_task` 表中的一行，锁状态和触发器调度字段共用该行。
/// 加锁是带条件的 upsert，只有 `is_lock = 0` 的行会被更新，
/// 因此并发加锁时最多一个节点的语句影响到行。
#[derive(Debug, Clone)]
pub struct SqliteTaskLockRepository {
    pool: SqlitePool,
    node_id: String,
}

impl SqliteTaskLockRepository {
    pub fn new(pool: SqlitePool, node_id: impl Into<String>) -> Self {
        Self {
            pool,
            node_id: node_id.into(),
        }
    }

    /// 按配置创建连接池并执行迁移
    pub async fn connect(config: &DatabaseConfig, node_id: &str) -> SchedulerResult<Self> {
        debug!("连接任务锁数据库: {}", config.url);

        let connect_options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect_with(connect_options)
            .await?;

        let repository = Self::new(pool, node_id);
        repository.run_migrations().await?;
        Ok(repository)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> SchedulerResult<()> {
        let context = LockOperationContext::new(RepositoryOperation::Migrate, &self.node_id);
        debug!("执行任务锁表迁移");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduler_task (
                task_id INTEGER PRIMARY KEY,
                is_lock INTEGER NOT NULL DEFAULT 0,
                lock_owner TEXT,
                lock_at INTEGER,
                cron_expression TEXT,
                cycle_ms INTEGER,
                repeat_times INTEGER,
                triggering_time INTEGER,
                last_triggering_time INTEGER,
                last_run_time_ms INTEGER NOT NULL DEFAULT 0,
                finished_times INTEGER NOT NULL DEFAULT 0,
                is_last_success INTEGER NOT NULL DEFAULT 1,
                is_pause INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_scheduler_task_lock_owner ON scheduler_task(lock_owner)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        Ok(())
    }

    /// 当前持有任务锁的节点
    pub async fn lock_owner(&self, task_id: i64) -> SchedulerResult<Option<String>> {
        let context =
            LockOperationContext::new(RepositoryOperation::Read, &self.node_id).with_task_id(task_id);

        let row = sqlx::query(
            "SELECT lock_owner FROM scheduler_task WHERE task_id = ?1 AND is_lock = 1",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        match row {
            Some(row) => Ok(row.try_get("lock_owner")?),
            None => Ok(None),
        }
    }

    fn row_to_trigger_row(row: &SqliteRow) -> SchedulerResult<TriggerRow> {
        Ok(TriggerRow {
            task_id: row.try_get("task_id")?,
            cron_expression: row.try_get("cron_expression")?,
            cycle_ms: row.try_get("cycle_ms")?,
            repeat_times: row.try_get("repeat_times")?,
            triggering_time: millis_to_time(row.try_get("triggering_time")?),
            last_triggering_time: millis_to_time(row.try_get("last_triggering_time")?),
            last_run_time_ms: row.try_get("last_run_time_ms")?,
            finished_times: row.try_get("finished_times")?,
            is_last_success: row.try_get("is_last_success")?,
            is_pause: row.try_get("is_pause")?,
        })
    }
}

fn millis_to_time(millis: Option<i64>) -> Option<DateTime<Utc>> {
    millis.and_then(DateTime::from_timestamp_millis)
}

#[async_trait]
impl TaskLockRepository for SqliteTaskLockRepository {
    #[instrument(skip(self), fields(node_id = %self.node_id))]
    async fn lock(&self, task_id: i64) -> SchedulerResult<bool> {
        let context =
            LockOperationContext::new(RepositoryOperation::Lock, &self.node_id).with_task_id(task_id);

        let result = sqlx::query(
            r#"
            INSERT INTO scheduler_task (task_id, is_lock, lock_owner, lock_at)
            VALUES (?1, 1, ?2, ?3)
            ON CONFLICT(task_id) DO UPDATE SET
                is_lock = 1,
                lock_owner = excluded.lock_owner,
                lock_at = excluded.lock_at
            WHERE scheduler_task.is_lock = 0
            "#,
        )
        .bind(task_id)
        .bind(&self.node_id)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        let acquired = result.rows_affected() == 1;
        debug!("任务 {} 加锁结果: {}", task_id, acquired);
        Ok(acquired)
    }

    #[instrument(skip(self), fields(node_id = %self.node_id))]
    async fn unlock(&self, task_id: i64) -> SchedulerResult<bool> {
        let context = LockOperationContext::new(RepositoryOperation::Unlock, &self.node_id)
            .with_task_id(task_id);

        let result = sqlx::query(
            r#"
            UPDATE scheduler_task
            SET is_lock = 0, lock_owner = NULL, lock_at = NULL
            WHERE task_id = ?1 AND is_lock = 1 AND lock_owner = ?2
            "#,
        )
        .bind(task_id)
        .bind(&self.node_id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // 未锁定视为解锁成功，被其他节点持有则失败
        let owner = self.lock_owner(task_id).await?;
        Ok(owner.is_none())
    }

    async fn load_trigger_row(&self, task_id: i64) -> SchedulerResult<Option<TriggerRow>> {
        let context =
            LockOperationContext::new(RepositoryOperation::Read, &self.node_id).with_task_id(task_id);

        let row = sqlx::query(
            r#"
            SELECT task_id, cron_expression, cycle_ms, repeat_times, triggering_time,
                   last_triggering_time, last_run_time_ms, finished_times, is_last_success, is_pause
            FROM scheduler_task
            WHERE task_id = ?1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        row.as_ref().map(Self::row_to_trigger_row).transpose()
    }

    #[instrument(skip(self, row), fields(task_id = row.task_id))]
    async fn save_trigger_row(&self, row: &TriggerRow) -> SchedulerResult<bool> {
        let context = LockOperationContext::new(RepositoryOperation::Save, &self.node_id)
            .with_task_id(row.task_id);

        let result = sqlx::query(
            r#"
            INSERT INTO scheduler_task (
                task_id, cron_expression, cycle_ms, repeat_times, triggering_time,
                last_triggering_time, last_run_time_ms, finished_times, is_last_success,
                is_pause, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(task_id) DO UPDATE SET
                cron_expression = excluded.cron_expression,
                cycle_ms = excluded.cycle_ms,
                repeat_times = excluded.repeat_times,
                triggering_time = excluded.triggering_time,
                last_triggering_time = excluded.last_triggering_time,
                last_run_time_ms = excluded.last_run_time_ms,
                finished_times = excluded.finished_times,
                is_last_success = excluded.is_last_success,
                is_pause = excluded.is_pause,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(row.task_id)
        .bind(&row.cron_expression)
        .bind(row.cycle_ms)
        .bind(row.repeat_times)
        .bind(row.triggering_time.map(|t| t.timestamp_millis()))
        .bind(row.last_triggering_time.map(|t| t.timestamp_millis()))
        .bind(row.last_run_time_ms)
        .bind(row.finished_times)
        .bind(row.is_last_success)
        .bind(row.is_pause)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use scheduler_domain::Trigger;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn repositories() -> (SqliteTaskLockRepository, SqliteTaskLockRepository) {
        let pool = memory_pool().await;
        let a = SqliteTaskLockRepository::new(pool.clone(), "node-a");
        a.run_migrations().await.unwrap();
        let b = SqliteTaskLockRepository::new(pool, "node-b");
        (a, b)
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_between_nodes() {
        let (a, b) = repositories().await;

        assert!(a.lock(1).await.unwrap());
        assert!(!b.lock(1).await.unwrap());
        assert!(!a.lock(1).await.unwrap());
        assert_eq!(a.lock_owner(1).await.unwrap().as_deref(), Some("node-a"));

        // 其他节点不能释放不属于自己的锁
        assert!(!b.unlock(1).await.unwrap());
        assert!(a.unlock(1).await.unwrap());
        assert!(b.lock(1).await.unwrap());
        assert_eq!(a.lock_owner(1).await.unwrap().as_deref(), Some("node-b"));
    }

    #[tokio::test]
    async fn test_unlock_unlocked_task_succeeds() {
        let (a, _) = repositories().await;
        assert!(a.unlock(42).await.unwrap());
        assert!(a.lock(42).await.unwrap());
        assert!(a.unlock(42).await.unwrap());
        assert!(a.unlock(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_trigger_row_round_trip_keeps_lock() {
        let (a, b) = repositories().await;
        assert!(a.load_trigger_row(5).await.unwrap().is_none());

        let mut trigger = Trigger::cycle(ChronoDuration::seconds(30), Some(4)).unwrap();
        trigger.task_id = 5;
        trigger.record_run(2_500, false);

        assert!(a.lock(5).await.unwrap());
        assert!(a.save_trigger_row(&TriggerRow::from(&trigger)).await.unwrap());

        let loaded = a.load_trigger_row(5).await.unwrap().unwrap();
        assert_eq!(loaded.cycle_ms, Some(30_000));
        assert_eq!(loaded.repeat_times, Some(4));
        assert_eq!(loaded.last_run_time_ms, 2_500);
        assert!(!loaded.is_last_success);
        assert_eq!(
            loaded.triggering_time.map(|t| t.timestamp_millis()),
            trigger.triggering_time.map(|t| t.timestamp_millis())
        );

        // 保存触发器行不影响锁状态
        assert!(!b.lock(5).await.unwrap());
    }
}
