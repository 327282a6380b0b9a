//! 任务容器
//!
//! 本节点已知任务的注册表。每个操作只持有一次读写锁，
//! 分页和列表返回的是调用时刻的快照。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use scheduler_domain::Task;
use scheduler_errors::{SchedulerError, SchedulerResult};
use tracing::debug;

#[derive(Default)]
struct ContainerInner {
    tasks: HashMap<i64, Arc<Task>>,
    order: Vec<i64>,
}

pub struct TaskContainer {
    inner: RwLock<ContainerInner>,
    max_capacity: usize,
}

impl TaskContainer {
    pub fn new(max_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(ContainerInner::default()),
            max_capacity,
        }
    }

    /// 插入任务，ID 重复或容量已满时返回错误
    pub fn insert(&self, task: Arc<Task>) -> SchedulerResult<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = task.id();
        if inner.tasks.contains_key(&id) {
            return Err(SchedulerError::DuplicateTask { id });
        }
        if inner.tasks.len() >= self.max_capacity {
            return Err(SchedulerError::ContainerFull {
                capacity: self.max_capacity,
            });
        }
        inner.tasks.insert(id, task);
        inner.order.push(id);
        debug!("任务 {} 已加入任务容器", id);
        Ok(())
    }

    pub fn get_by_id(&self, id: i64) -> Option<Arc<Task>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tasks
            .get(&id)
            .cloned()
    }

    pub fn remove_by_id(&self, id: i64) -> Option<Arc<Task>> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let removed = inner.tasks.remove(&id)?;
        inner.order.retain(|existing| *existing != id);
        debug!("任务 {} 已从任务容器移除", id);
        Some(removed)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tasks
            .contains_key(&id)
    }

    /// 按插入顺序列出全部任务
    pub fn list(&self) -> Vec<Arc<Task>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id).cloned())
            .collect()
    }

    /// 分页查询，页码从 1 开始，越界返回空列表
    pub fn page(&self, page_num: usize, size: usize) -> Vec<Arc<Task>> {
        if page_num == 0 || size == 0 {
            return Vec::new();
        }
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let skip = (page_num - 1).saturating_mul(size);
        if skip >= inner.order.len() {
            return Vec::new();
        }
        inner
            .order
            .iter()
            .skip(skip)
            .take(size)
            .filter_map(|id| inner.tasks.get(id).cloned())
            .collect()
    }

    pub fn size(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tasks
            .len()
    }

    pub fn count(&self) -> usize {
        self.size()
    }

    pub fn capacity(&self) -> usize {
        self.max_capacity
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.tasks.clear();
        inner.order.clear();
    }
}

impl Default for TaskContainer {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}
