//! 调度引擎核心组件
//!
//! 配置、日志初始化、任务容器和事件总线。调度器、执行器池等组件通过
//! 显式传入的上下文共享这些对象，不使用全局单例。

pub mod config;
pub mod container;
pub mod event_bus;
pub mod logging;

pub use config::{
    AppConfig, ContainerConfig, DatabaseConfig, ExecutorPoolConfig, LogFormat, LoggingConfig,
    SchedulerConfig,
};
pub use container::TaskContainer;
pub use event_bus::{EventBus, TaskEventListener};
pub use logging::{init_logging, StructuredLogger};
pub use scheduler_errors::{SchedulerError, SchedulerResult};
