//! 调度引擎领域模型
//!
//! 任务、触发器、可执行能力、生命周期事件以及持久化端口的定义，
//! 不依赖其他 scheduler crates（错误类型除外）。

pub mod cron_utils;
pub mod edit;
pub mod events;
pub mod executable;
pub mod repositories;
pub mod task;
pub mod trigger;

pub use cron_utils::CronScheduler;
pub use edit::{TaskEditParams, TriggerEditParams};
pub use events::{DomainEvent, TaskEvent, TaskEventType};
pub use executable::Executable;
pub use repositories::{TaskLockRepository, TriggerRow};
pub use scheduler_errors::{SchedulerError, SchedulerResult};
pub use task::{
    RejectReason, RunState, SubmitClaim, Task, TaskAttributes, TaskDefinition, TaskKind,
    TaskType,
};
pub use trigger::Trigger;
