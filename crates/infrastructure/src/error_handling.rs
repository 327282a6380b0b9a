//! 仓储操作的错误上下文

use std::fmt;

use scheduler_errors::SchedulerError;
use sqlx::Error as SqlxError;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryOperation {
    Lock,
    Unlock,
    Read,
    Save,
    Migrate,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryOperation::Lock => write!(f, "加锁"),
            RepositoryOperation::Unlock => write!(f, "解锁"),
            RepositoryOperation::Read => write!(f, "查询"),
            RepositoryOperation::Save => write!(f, "保存"),
            RepositoryOperation::Migrate => write!(f, "迁移"),
        }
    }
}

/// 任务锁操作的上下文
#[derive(Debug, Clone)]
pub struct LockOperationContext {
    pub operation: RepositoryOperation,
    pub task_id: Option<i64>,
    pub node_id: String,
}

impl LockOperationContext {
    pub fn new(operation: RepositoryOperation, node_id: &str) -> Self {
        Self {
            operation,
            task_id: None,
            node_id: node_id.to_string(),
        }
    }

    pub fn with_task_id(mut self, task_id: i64) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn entity_description(&self) -> String {
        match self.task_id {
            Some(id) => format!("任务锁 (任务ID: {}, 节点: {})", id, self.node_id),
            None => format!("任务锁 (节点: {})", self.node_id),
        }
    }
}

pub struct RepositoryErrorHelpers;

impl RepositoryErrorHelpers {
    /// 记录数据库错误并转换为带上下文的调度错误
    pub fn database_error(context: &LockOperationContext, err: SqlxError) -> SchedulerError {
        error!(
            operation = %context.operation,
            task_id = context.task_id,
            node_id = %context.node_id,
            error = %err,
            "{}{}失败",
            context.entity_description(),
            context.operation
        );
        SchedulerError::database_error(format!(
            "{}{}失败: {}",
            context.entity_description(),
            context.operation,
            err
        ))
    }
}
