use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    database::DatabaseConfig,
    executor_pool::ExecutorPoolConfig,
    logging::LoggingConfig,
    scheduler::{ContainerConfig, SchedulerConfig},
};

/// 系统配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub executor_pool: ExecutorPoolConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序:
    /// 1. 默认配置
    /// 2. 配置文件（TOML格式）
    /// 3. 环境变量覆盖（前缀: SCHEDULER_，层级分隔符: __）
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = AppConfig::default();
        let mut builder = ConfigBuilder::builder()
            .set_default("executor_pool.fast_pool_size", defaults.executor_pool.fast_pool_size as u64)?
            .set_default("executor_pool.slow_pool_size", defaults.executor_pool.slow_pool_size as u64)?
            .set_default(
                "executor_pool.relegation_threshold",
                defaults.executor_pool.relegation_threshold,
            )?
            .set_default("scheduler.node_id", defaults.scheduler.node_id.clone())?
            .set_default("scheduler.poll_interval_ms", defaults.scheduler.poll_interval_ms)?
            .set_default("scheduler.near_window_ms", defaults.scheduler.near_window_ms)?
            .set_default("container.max_capacity", defaults.container.max_capacity as u64)?
            .set_default("database.url", defaults.database.url.clone())?
            .set_default("database.max_connections", defaults.database.max_connections)?
            .set_default(
                "database.connection_timeout_seconds",
                defaults.database.connection_timeout_seconds,
            )?
            .set_default("logging.level", defaults.logging.level.clone())?
            .set_default("logging.format", "pretty")?;

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/scheduler.toml", "scheduler.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SCHEDULER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// 从TOML字符串加载配置
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// 序列化配置为TOML字符串
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        self.executor_pool
            .validate()
            .context("执行器池配置验证失败")?;

        self.scheduler.validate().context("调度器配置验证失败")?;

        self.container.validate().context("任务容器配置验证失败")?;

        self.database.validate().context("数据库配置验证失败")?;

        self.logging.validate().context("日志配置验证失败")?;

        Ok(())
    }
}
