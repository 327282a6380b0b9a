//! 持久化端口
//!
//! 调度核心对持久化层的全部需求：按任务ID加锁、解锁以及触发器行读写。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trigger::Trigger;
use scheduler_errors::SchedulerResult;

/// 触发器持久化行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerRow {
    pub task_id: i64,
    pub cron_expression: Option<String>,
    pub cycle_ms: Option<i64>,
    pub repeat_times: Option<i32>,
    pub triggering_time: Option<DateTime<Utc>>,
    pub last_triggering_time: Option<DateTime<Utc>>,
    pub last_run_time_ms: i64,
    pub finished_times: i64,
    pub is_last_success: bool,
    pub is_pause: bool,
}

impl From<&Trigger> for TriggerRow {
    fn from(trigger: &Trigger) -> Self {
        Self {
            task_id: trigger.task_id,
            cron_expression: trigger.cron_expression.clone(),
            cycle_ms: trigger.cycle_ms,
            repeat_times: trigger.repeat_times,
            triggering_time: trigger.triggering_time,
            last_triggering_time: trigger.last_triggering_time,
            last_run_time_ms: trigger.last_run_time_ms,
            finished_times: trigger.finished_times,
            is_last_success: trigger.is_last_success,
            is_pause: trigger.is_pause,
        }
    }
}

impl TriggerRow {
    /// 用持久化行覆盖触发器的调度字段，子任务与最大执行时长不落库
    pub fn apply_to(&self, trigger: &mut Trigger) {
        trigger.cron_expression = self.cron_expression.clone();
        trigger.cycle_ms = self.cycle_ms;
        trigger.repeat_times = self.repeat_times;
        trigger.triggering_time = self.triggering_time;
        trigger.last_triggering_time = self.last_triggering_time;
        trigger.last_run_time_ms = self.last_run_time_ms;
        trigger.finished_times = self.finished_times;
        trigger.is_last_success = self.is_last_success;
        trigger.is_pause = self.is_pause;
    }
}

/// 任务锁仓储抽象
///
/// `lock` 必须是条件更新：同一时刻集群内最多一个节点返回 `true`。
#[async_trait]
pub trait TaskLockRepository: Send + Sync {
    /// 尝试获取任务锁，被其他节点持有时返回 `Ok(false)`
    async fn lock(&self, task_id: i64) -> SchedulerResult<bool>;

    /// 释放本节点持有的任务锁，任务未被锁定时同样返回 `Ok(true)`
    async fn unlock(&self, task_id: i64) -> SchedulerResult<bool>;

    async fn load_trigger_row(&self, task_id: i64) -> SchedulerResult<Option<TriggerRow>>;

    async fn save_trigger_row(&self, row: &TriggerRow) -> SchedulerResult<bool>;
}
