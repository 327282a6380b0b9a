//! 进程内任务锁仓储
//!
//! 单节点部署和测试使用。多个仓储实例共享同一个 [`InMemoryLockStore`] 时，
//! 行为与多个节点连接同一个数据库一致。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use scheduler_domain::{TaskLockRepository, TriggerRow};
use scheduler_errors::SchedulerResult;
use tracing::debug;

/// 单个任务的锁与触发器行
#[derive(Debug, Clone, Default)]
pub struct LockEntry {
    pub lock_owner: Option<String>,
    pub trigger_row: Option<TriggerRow>,
}

pub type InMemoryLockStore = Arc<Mutex<HashMap<i64, LockEntry>>>;

#[derive(Debug, Clone)]
pub struct InMemoryTaskLockRepository {
    node_id: String,
    store: InMemoryLockStore,
}

impl InMemoryTaskLockRepository {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self::with_store(node_id, InMemoryLockStore::default())
    }

    pub fn with_store(node_id: impl Into<String>, store: InMemoryLockStore) -> Self {
        Self {
            node_id: node_id.into(),
            store,
        }
    }

    /// 以另一个节点身份共享同一份存储
    pub fn for_node(&self, node_id: impl Into<String>) -> Self {
        Self::with_store(node_id, Arc::clone(&self.store))
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn lock_owner(&self, task_id: i64) -> Option<String> {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task_id)
            .and_then(|entry| entry.lock_owner.clone())
    }
}

#[async_trait]
impl TaskLockRepository for InMemoryTaskLockRepository {
    async fn lock(&self, task_id: i64) -> SchedulerResult<bool> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = store.entry(task_id).or_default();
        if entry.lock_owner.is_some() {
            return Ok(false);
        }
        entry.lock_owner = Some(self.node_id.clone());
        debug!("节点 {} 获得任务 {} 的锁", self.node_id, task_id);
        Ok(true)
    }

    async fn unlock(&self, task_id: i64) -> SchedulerResult<bool> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = store.get_mut(&task_id) else {
            return Ok(true);
        };
        if matches!(entry.lock_owner.as_deref(), Some(owner) if owner != self.node_id) {
            return Ok(false);
        }
        entry.lock_owner = None;
        Ok(true)
    }

    async fn load_trigger_row(&self, task_id: i64) -> SchedulerResult<Option<TriggerRow>> {
        Ok(self
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task_id)
            .and_then(|entry| entry.trigger_row.clone()))
    }

    async fn save_trigger_row(&self, row: &TriggerRow) -> SchedulerResult<bool> {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(row.task_id)
            .or_default()
            .trigger_row = Some(row.clone());
        Ok(true)
    }
}
