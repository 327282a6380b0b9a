use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use scheduler_domain::TaskLockRepository;
use scheduler_errors::{SchedulerError, SchedulerResult};
use tracing::{debug, warn};

/// 分布式锁协调器
///
/// 通过 [`TaskLockRepository`] 的条件更新实现集群互斥，同时在本地记录
/// 每个任务的持锁状态，调度时已持有锁的任务不再重复申请。
/// 存储层的任何错误都视为加锁失败，只记录日志，不向上传播。
pub struct LockCoordinator {
    repository: Arc<dyn TaskLockRepository>,
    node_id: String,
    local: RwLock<HashMap<i64, bool>>,
}

impl LockCoordinator {
    pub fn new(repository: Arc<dyn TaskLockRepository>, node_id: impl Into<String>) -> Self {
        Self {
            repository,
            node_id: node_id.into(),
            local: RwLock::new(HashMap::new()),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// 申请任务锁，锁已被其他节点持有时返回 [`SchedulerError::LockFailed`]
    pub async fn try_lock(&self, task_id: i64) -> SchedulerResult<()> {
        if !self.repository.lock(task_id).await? {
            return Err(SchedulerError::LockFailed { task_id });
        }
        self.set_local(task_id, true);
        debug!("节点 {} 获取任务 {} 的锁成功", self.node_id, task_id);
        Ok(())
    }

    pub async fn lock(&self, task_id: i64) -> bool {
        match self.try_lock(task_id).await {
            Ok(()) => true,
            Err(e @ SchedulerError::LockFailed { .. }) => {
                debug!("{}, 锁已被其他节点持有", e);
                false
            }
            Err(e) => {
                warn!("获取任务 {} 的锁失败: {}", task_id, e);
                false
            }
        }
    }

    pub async fn unlock(&self, task_id: i64) -> bool {
        match self.repository.unlock(task_id).await {
            Ok(true) => {
                self.set_local(task_id, false);
                debug!("节点 {} 释放任务 {} 的锁", self.node_id, task_id);
                true
            }
            Ok(false) => {
                warn!("任务 {} 的锁不属于节点 {}, 释放失败", task_id, self.node_id);
                false
            }
            Err(e) => {
                warn!("释放任务 {} 的锁失败: {}", task_id, e);
                false
            }
        }
    }

    pub fn is_locally_locked(&self, task_id: i64) -> bool {
        self.local
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task_id)
            .copied()
            .unwrap_or(false)
    }

    /// 本节点当前持有锁的任务
    pub fn locally_held(&self) -> Vec<i64> {
        let mut held: Vec<i64> = self
            .local
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, locked)| **locked)
            .map(|(id, _)| *id)
            .collect();
        held.sort_unstable();
        held
    }

    fn set_local(&self, task_id: i64, locked: bool) {
        self.local
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id, locked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_infrastructure::InMemoryTaskLockRepository;
    use scheduler_testing_utils::MockTaskLockRepository;

    #[tokio::test]
    async fn test_two_coordinators_share_one_store() {
        let store = InMemoryTaskLockRepository::new("node-a");
        let a = LockCoordinator::new(Arc::new(store.clone()), "node-a");
        let b = LockCoordinator::new(Arc::new(store.for_node("node-b")), "node-b");

        assert!(a.lock(1).await);
        assert!(!b.lock(1).await);
        assert!(a.is_locally_locked(1));
        assert!(!b.is_locally_locked(1));
        assert_eq!(a.locally_held(), vec![1]);

        assert!(a.unlock(1).await);
        assert!(!a.is_locally_locked(1));
        assert!(b.lock(1).await);
    }

    #[tokio::test]
    async fn test_try_lock_reports_contention() {
        let store = InMemoryTaskLockRepository::new("node-a");
        let a = LockCoordinator::new(Arc::new(store.clone()), "node-a");
        let b = LockCoordinator::new(Arc::new(store.for_node("node-b")), "node-b");

        a.try_lock(5).await.unwrap();
        let err = b.try_lock(5).await.unwrap_err();
        assert!(matches!(err, SchedulerError::LockFailed { task_id: 5 }));
        assert!(err.is_contention());

        let unavailable = LockCoordinator::new(Arc::new(MockTaskLockRepository::unavailable()), "node-c");
        assert!(matches!(
            unavailable.try_lock(5).await,
            Err(SchedulerError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_store_failure_is_not_escalated() {
        let coordinator = LockCoordinator::new(Arc::new(MockTaskLockRepository::unavailable()), "node-a");
        assert!(!coordinator.lock(3).await);
        assert!(!coordinator.unlock(3).await);
        assert!(!coordinator.is_locally_locked(3));
    }

    #[tokio::test]
    async fn test_unlock_not_held_is_noop() {
        let coordinator =
            LockCoordinator::new(Arc::new(InMemoryTaskLockRepository::new("node-a")), "node-a");
        assert!(coordinator.unlock(9).await);
        assert!(coordinator.locally_held().is_empty());
    }
}
