//! 调度核心
//!
//! 锁协调器、注册器、提交判定、调度器生命周期、轮询驱动、执行后置处理以及
//! 对外的任务管理接口。所有组件通过显式传入的 [`SchedulingContext`] 共享状态。

pub mod context;
pub mod lifecycle;
pub mod lock_coordinator;
pub mod polling;
pub mod post_processor;
pub mod register;
pub mod scheduler;
pub mod task_api;

pub use context::SchedulingContext;
pub use lifecycle::{destroy_scheduler, start_scheduler, Scheduler, SchedulerGroup};
pub use lock_coordinator::LockCoordinator;
pub use polling::PollingScheduler;
pub use post_processor::TaskRunPostProcessor;
pub use register::TaskRegister;
pub use scheduler::{SubmitOutcome, TaskScheduler, TickReport};
pub use task_api::{PauseGuard, TaskApi};
