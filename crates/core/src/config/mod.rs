//! 配置管理
//!
//! 加载顺序：默认值 → TOML 配置文件 → `SCHEDULER_` 前缀的环境变量。
//! 每个配置段提供 `validate()`，加载完成后统一校验。

pub mod models;

pub use models::app_config::AppConfig;
pub use models::database::DatabaseConfig;
pub use models::executor_pool::ExecutorPoolConfig;
pub use models::logging::{LogFormat, LoggingConfig};
pub use models::scheduler::{ContainerConfig, SchedulerConfig};
