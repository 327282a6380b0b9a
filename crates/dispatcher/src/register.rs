use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use scheduler_domain::Task;
use tracing::debug;

/// 任务注册器
///
/// 即将触发的任务集合，轮询驱动每个周期从这里取出已到期的任务。
#[derive(Default)]
pub struct TaskRegister {
    tasks: Mutex<BTreeMap<i64, Arc<Task>>>,
}

impl TaskRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入注册器，已存在时返回 `false`
    pub fn register_task(&self, task: Arc<Task>) -> bool {
        let id = task.id();
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if tasks.contains_key(&id) {
            return false;
        }
        tasks.insert(id, task);
        debug!("任务 {} 进入注册器", id);
        true
    }

    pub fn remove_task(&self, task_id: i64) -> Option<Arc<Task>> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&task_id)
    }

    pub fn contains(&self, task_id: i64) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&task_id)
    }

    pub fn size(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// 取出所有在 `now` 之前到期且未暂停的任务，按任务ID排序
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<Arc<Task>> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let due: Vec<i64> = tasks
            .iter()
            .filter(|(_, task)| task.with_trigger(|t| t.is_due(now)).unwrap_or(false))
            .map(|(id, _)| *id)
            .collect();
        due.into_iter().filter_map(|id| tasks.remove(&id)).collect()
    }

    pub fn clear(&self) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
