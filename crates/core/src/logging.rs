//! 日志初始化与结构化日志

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// 初始化全局日志订阅者
///
/// `RUST_LOG` 环境变量优先于配置中的日志级别。重复初始化返回错误。
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        LogFormat::Pretty => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
    }

    Ok(())
}

/// 固定事件名的调度日志
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_task_registered(task_id: i64, alias: &str, triggering_time: Option<i64>) {
        info!(
            event = "task_registered",
            task.id = task_id,
            task.alias = alias,
            task.triggering_time = triggering_time,
            "任务已注册"
        );
    }

    pub fn log_task_scheduled(task_id: i64, alias: &str, pool: &str, last_run_time_ms: i64) {
        info!(
            event = "task_scheduled",
            task.id = task_id,
            task.alias = alias,
            task.pool = pool,
            task.last_run_time_ms = last_run_time_ms,
            "任务已提交到执行器池"
        );
    }

    pub fn log_task_miss_fire(task_id: i64, is_start: bool, is_waiting: bool) {
        warn!(
            event = "task_miss_fire",
            task.id = task_id,
            task.is_start = is_start,
            task.is_waiting = is_waiting,
            "任务上一次执行尚未结束，本次触发丢弃"
        );
    }

    pub fn log_lock_failed(task_id: i64, node_id: &str) {
        warn!(
            event = "task_lock_failed",
            task.id = task_id,
            node.id = node_id,
            "任务锁被其他节点持有"
        );
    }

    pub fn log_run_finished(task_id: i64, success: bool, elapsed_ms: i64, error_message: Option<&str>) {
        if success {
            info!(
                event = "task_run_finished",
                task.id = task_id,
                task.success = true,
                task.elapsed_ms = elapsed_ms,
                "任务执行完成"
            );
        } else {
            error!(
                event = "task_run_finished",
                task.id = task_id,
                task.success = false,
                task.elapsed_ms = elapsed_ms,
                error = error_message.unwrap_or_default(),
                "任务执行失败"
            );
        }
    }

    pub fn log_task_edited(task_id: i64, target: &str, version: u64) {
        info!(
            event = "task_edited",
            task.id = task_id,
            edit.target = target,
            task.version = version,
            "任务已修改"
        );
    }
}
