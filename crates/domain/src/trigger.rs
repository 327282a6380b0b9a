use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cron_utils::CronScheduler;
use scheduler_errors::{SchedulerError, SchedulerResult};

/// 任务触发器
///
/// 描述单个任务的触发策略，由任务独占持有，随任务一起销毁。
///
/// # 字段说明
///
/// - `task_id`: 所属任务ID，绑定后必须与任务ID一致
/// - `cron_expression`: cron-like 表达式，优先于 `cycle_ms`
/// - `cycle_ms`: 固定周期（毫秒）
/// - `repeat_times`: 剩余触发次数，`None` 表示无限次
/// - `triggering_time`: 下一次触发时间，`None` 表示不再触发
/// - `last_run_time_ms`: 上一次执行耗时（毫秒），决定快慢池路由
/// - `is_pause`: 暂停调度，暂停期间调度器不得提交该任务
/// - `maximum_execution_time_ms`: 最大执行时长（毫秒），仅作为看门狗参考
/// - `child_tasks`: 本任务成功完成后依次触发的子任务ID
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Trigger {
    pub task_id: i64,
    pub cron_expression: Option<String>,
    pub cycle_ms: Option<i64>,
    pub repeat_times: Option<i32>,
    pub triggering_time: Option<DateTime<Utc>>,
    pub last_triggering_time: Option<DateTime<Utc>>,
    pub last_run_time_ms: i64,
    pub is_pause: bool,
    pub maximum_execution_time_ms: Option<i64>,
    pub child_tasks: Vec<i64>,
    pub finished_times: i64,
    pub is_last_success: bool,
}

impl Trigger {
    /// 创建cron触发器，触发时间为表达式在当前时刻之后的第一个时间点
    pub fn cron(expr: &str) -> SchedulerResult<Self> {
        CronScheduler::validate_cron_expression(expr)?;
        let mut trigger = Self {
            cron_expression: Some(expr.to_string()),
            ..Self::default()
        };
        trigger.refresh();
        Ok(trigger)
    }

    /// 创建固定周期触发器
    pub fn cycle(cycle: Duration, repeat_times: Option<i32>) -> SchedulerResult<Self> {
        if cycle <= Duration::zero() {
            return Err(SchedulerError::invalid_trigger("周期必须大于0"));
        }
        let mut trigger = Self {
            cycle_ms: Some(cycle.num_milliseconds()),
            repeat_times,
            ..Self::default()
        };
        trigger.refresh();
        Ok(trigger)
    }

    /// 创建延迟触发器，只触发一次
    pub fn delay(delay: Duration) -> Self {
        Self::at(Utc::now() + delay)
    }

    /// 创建在指定时间点触发一次的触发器
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            repeat_times: Some(1),
            triggering_time: Some(time),
            ..Self::default()
        }
    }

    /// 重复次数已耗尽，触发器永久失效
    pub fn is_exhausted(&self) -> bool {
        matches!(self.repeat_times, Some(n) if n <= 0)
    }

    pub fn refresh(&mut self) -> Option<DateTime<Utc>> {
        self.refresh_at(Utc::now())
    }

    /// 以 `now` 为基准重新计算下一次触发时间
    pub fn refresh_at(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.triggering_time = if self.is_exhausted() {
            None
        } else if let Some(expr) = self.cron_expression.as_deref() {
            match CronScheduler::new(expr) {
                Ok(scheduler) => scheduler.next_execution_time(now),
                Err(e) => {
                    warn!("任务 {} 的CRON表达式无效，触发器失效: {}", self.task_id, e);
                    None
                }
            }
        } else {
            self.cycle_ms
                .filter(|cycle| *cycle > 0)
                .map(|cycle| now + Duration::milliseconds(cycle))
        };
        self.triggering_time
    }

    /// 记录一次触发，有限次数的触发器扣减一次
    pub fn fire(&mut self, now: DateTime<Utc>) {
        self.last_triggering_time = Some(now);
        if let Some(times) = self.repeat_times.as_mut() {
            *times = (*times - 1).max(0);
        }
    }

    /// 记录一次执行结果
    pub fn record_run(&mut self, elapsed_ms: i64, success: bool) {
        self.last_run_time_ms = elapsed_ms;
        self.finished_times += 1;
        self.is_last_success = success;
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_pause && matches!(self.triggering_time, Some(t) if t <= now)
    }

    /// 触发时间已经过去（或不存在），需要刷新
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.triggering_time {
            Some(t) => t < now,
            None => true,
        }
    }

    /// 是否将在 `window_ms` 毫秒内触发
    pub fn is_near_triggering_time(&self, window_ms: i64) -> bool {
        self.is_near_triggering_time_at(Utc::now(), window_ms)
    }

    pub fn is_near_triggering_time_at(&self, now: DateTime<Utc>, window_ms: i64) -> bool {
        match self.triggering_time {
            Some(t) => (t - now).num_milliseconds() <= window_ms,
            None => false,
        }
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if let Some(expr) = self.cron_expression.as_deref() {
            CronScheduler::validate_cron_expression(expr)?;
        }
        if matches!(self.cycle_ms, Some(c) if c <= 0) {
            return Err(SchedulerError::invalid_trigger("周期必须大于0"));
        }
        if matches!(self.repeat_times, Some(n) if n < 0) {
            return Err(SchedulerError::invalid_trigger("重复次数不能为负数"));
        }
        if self.cron_expression.is_none()
            && self.cycle_ms.is_none()
            && self.triggering_time.is_none()
        {
            return Err(SchedulerError::invalid_trigger(
                "触发器至少需要cron表达式、周期或触发时间之一",
            ));
        }
        Ok(())
    }
}
