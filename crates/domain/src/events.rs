//! 任务生命周期事件
//!
//! 由调度器和后置处理器发布，经事件总线同步分发给监控、告警等订阅者。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 领域事件基础trait
pub trait DomainEvent: Send + Sync {
    fn event_id(&self) -> Uuid;
    fn event_type(&self) -> &str;
    fn occurred_at(&self) -> DateTime<Utc>;
    fn aggregate_id(&self) -> String;
}

/// 事件类型，事件总线按类型维护订阅者
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskEventType {
    MissFire,
    Start,
    Success,
    Error,
    Finished,
    LockFailed,
}

impl TaskEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskEventType::MissFire => "TaskMissFire",
            TaskEventType::Start => "TaskStart",
            TaskEventType::Success => "TaskSuccess",
            TaskEventType::Error => "TaskError",
            TaskEventType::Finished => "TaskFinished",
            TaskEventType::LockFailed => "TaskLockFailed",
        }
    }
}

/// 任务相关事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TaskEvent {
    /// 任务仍在运行时再次被触发
    TaskMissFire {
        id: Uuid,
        task_id: i64,
        occurred_at: DateTime<Utc>,
    },
    TaskStart {
        id: Uuid,
        task_id: i64,
        occurred_at: DateTime<Utc>,
    },
    TaskSuccess {
        id: Uuid,
        task_id: i64,
        result: serde_json::Value,
        elapsed_ms: i64,
        occurred_at: DateTime<Utc>,
    },
    TaskError {
        id: Uuid,
        task_id: i64,
        error_message: String,
        elapsed_ms: i64,
        occurred_at: DateTime<Utc>,
    },
    TaskFinished {
        id: Uuid,
        task_id: i64,
        success: bool,
        elapsed_ms: i64,
        occurred_at: DateTime<Utc>,
    },
    /// 持久化任务的分布式锁被其他节点持有
    TaskLockFailed {
        id: Uuid,
        task_id: i64,
        occurred_at: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn miss_fire(task_id: i64) -> Self {
        TaskEvent::TaskMissFire {
            id: Uuid::new_v4(),
            task_id,
            occurred_at: Utc::now(),
        }
    }

    pub fn start(task_id: i64) -> Self {
        TaskEvent::TaskStart {
            id: Uuid::new_v4(),
            task_id,
            occurred_at: Utc::now(),
        }
    }

    pub fn success(task_id: i64, result: serde_json::Value, elapsed_ms: i64) -> Self {
        TaskEvent::TaskSuccess {
            id: Uuid::new_v4(),
            task_id,
            result,
            elapsed_ms,
            occurred_at: Utc::now(),
        }
    }

    pub fn error(task_id: i64, error_message: String, elapsed_ms: i64) -> Self {
        TaskEvent::TaskError {
            id: Uuid::new_v4(),
            task_id,
            error_message,
            elapsed_ms,
            occurred_at: Utc::now(),
        }
    }

    pub fn finished(task_id: i64, success: bool, elapsed_ms: i64) -> Self {
        TaskEvent::TaskFinished {
            id: Uuid::new_v4(),
            task_id,
            success,
            elapsed_ms,
            occurred_at: Utc::now(),
        }
    }

    pub fn lock_failed(task_id: i64) -> Self {
        TaskEvent::TaskLockFailed {
            id: Uuid::new_v4(),
            task_id,
            occurred_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> TaskEventType {
        match self {
            TaskEvent::TaskMissFire { .. } => TaskEventType::MissFire,
            TaskEvent::TaskStart { .. } => TaskEventType::Start,
            TaskEvent::TaskSuccess { .. } => TaskEventType::Success,
            TaskEvent::TaskError { .. } => TaskEventType::Error,
            TaskEvent::TaskFinished { .. } => TaskEventType::Finished,
            TaskEvent::TaskLockFailed { .. } => TaskEventType::LockFailed,
        }
    }

    pub fn task_id(&self) -> i64 {
        match self {
            TaskEvent::TaskMissFire { task_id, .. }
            | TaskEvent::TaskStart { task_id, .. }
            | TaskEvent::TaskSuccess { task_id, .. }
            | TaskEvent::TaskError { task_id, .. }
            | TaskEvent::TaskFinished { task_id, .. }
            | TaskEvent::TaskLockFailed { task_id, .. } => *task_id,
        }
    }
}

impl DomainEvent for TaskEvent {
    fn event_id(&self) -> Uuid {
        match self {
            TaskEvent::TaskMissFire { id, .. }
            | TaskEvent::TaskStart { id, .. }
            | TaskEvent::TaskSuccess { id, .. }
            | TaskEvent::TaskError { id, .. }
            | TaskEvent::TaskFinished { id, .. }
            | TaskEvent::TaskLockFailed { id, .. } => *id,
        }
    }

    fn event_type(&self) -> &str {
        self.kind().as_str()
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TaskEvent::TaskMissFire { occurred_at, .. }
            | TaskEvent::TaskStart { occurred_at, .. }
            | TaskEvent::TaskSuccess { occurred_at, .. }
            | TaskEvent::TaskError { occurred_at, .. }
            | TaskEvent::TaskFinished { occurred_at, .. }
            | TaskEvent::TaskLockFailed { occurred_at, .. } => *occurred_at,
        }
    }

    fn aggregate_id(&self) -> String {
        self.task_id().to_string()
    }
}
