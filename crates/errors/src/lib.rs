use thiserror::Error;

/// 调度引擎统一错误类型
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("任务已存在: {id}")]
    DuplicateTask { id: i64 },
    #[error("任务容器已满，容量: {capacity}")]
    ContainerFull { capacity: usize },
    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },
    #[error("无效的触发器: {0}")]
    InvalidTrigger(String),
    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),
    #[error("任务执行错误: {0}")]
    TaskExecution(String),
    #[error("任务执行超时")]
    ExecutionTimeout,
    #[error("执行器池已关闭: {pool}")]
    PoolClosed { pool: String },
    #[error("获取任务锁失败: {task_id}")]
    LockFailed { task_id: i64 },
    #[error("事件投递失败: {event_type} - {message}")]
    EventDelivery { event_type: String, message: String },
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn invalid_params<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTaskParams(msg.into())
    }
    pub fn invalid_trigger<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTrigger(msg.into())
    }
    pub fn execution<S: Into<String>>(msg: S) -> Self {
        Self::TaskExecution(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Internal(_)
                | SchedulerError::Configuration(_)
                | SchedulerError::PoolClosed { .. }
        )
    }
    /// 锁竞争和存储抖动属于可恢复错误，调用方不应升级为异常
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            SchedulerError::LockFailed { .. }
                | SchedulerError::Database(_)
                | SchedulerError::DatabaseOperation(_)
        )
    }
    /// 调用方输入不合法，接口层返回 `false` 而不是错误
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            SchedulerError::InvalidCron { .. }
                | SchedulerError::InvalidTrigger(_)
                | SchedulerError::InvalidTaskParams(_)
        )
    }
    pub fn user_message(&self) -> &str {
        match self {
            SchedulerError::DuplicateTask { .. } => "任务ID已被占用",
            SchedulerError::ContainerFull { .. } => "任务容器已满，请稍后重试",
            SchedulerError::InvalidCron { .. } => "CRON表达式配置有误",
            SchedulerError::InvalidTaskParams(_) => "任务参数配置有误",
            SchedulerError::InvalidTrigger(_) => "触发器配置有误",
            SchedulerError::ExecutionTimeout => "任务执行超时",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}
