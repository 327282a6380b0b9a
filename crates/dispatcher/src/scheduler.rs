//! 提交判定与调度周期
//!
//! [`TaskScheduler`] 负责单个任务的提交（miss fire 检测、快慢池选择）、
//! 持久化任务的加解锁，以及轮询驱动每个周期调用的扫描与分发。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use scheduler_core::StructuredLogger;
use scheduler_domain::{RejectReason, SubmitClaim, Task, TaskEvent, TaskEventType};
use scheduler_errors::SchedulerResult;
use scheduler_worker::{PoolJob, PoolKind};
use tracing::{debug, error, warn};

use crate::context::SchedulingContext;
use crate::post_processor::TaskRunPostProcessor;

/// 一次提交的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Rejected(RejectReason),
    /// 任务仍在运行或排队，已发布 miss fire 事件
    MissFire,
    Submitted(PoolKind),
}

impl SubmitOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmitOutcome::Submitted(_))
    }
}

/// 一个调度周期的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub registered: usize,
    pub submitted: usize,
    pub miss_fired: usize,
    pub rejected: usize,
    pub lock_failed: usize,
}

pub struct TaskScheduler {
    context: Arc<SchedulingContext>,
}

impl TaskScheduler {
    pub fn new(context: Arc<SchedulingContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<SchedulingContext> {
        &self.context
    }

    /// 提交任务
    ///
    /// 上一次触发仍在运行或排队时不会重复提交，而是同步发布 miss fire 事件。
    /// 上一次执行耗时超过 `relegation_threshold` 分钟的任务进入慢池。
    pub fn submit_task(
        &self,
        task: &Arc<Task>,
        relegation_threshold: f64,
    ) -> SchedulerResult<SubmitOutcome> {
        let task_id = task.id();
        let (last_run_time_ms, maximum_execution_time_ms, params) =
            match task.claim_for_submit(Utc::now()) {
                SubmitClaim::Rejected(reason) => {
                    debug!("任务 {} 不满足提交条件: {:?}", task_id, reason);
                    return Ok(SubmitOutcome::Rejected(reason));
                }
                SubmitClaim::Overlap(state) => {
                    StructuredLogger::log_task_miss_fire(task_id, state.is_start, state.is_waiting);
                    self.context.event_bus.publish_sync(
                        &TaskEvent::miss_fire(task_id),
                        TaskEventType::MissFire,
                        true,
                    )?;
                    return Ok(SubmitOutcome::MissFire);
                }
                SubmitClaim::Claimed {
                    last_run_time_ms,
                    maximum_execution_time_ms,
                    params,
                } => (last_run_time_ms, maximum_execution_time_ms, params),
            };

        let threshold_ms = relegation_threshold * 60.0 * 1000.0;
        let pool = if last_run_time_ms as f64 > threshold_ms {
            PoolKind::Slow
        } else {
            PoolKind::Fast
        };

        let job = PoolJob {
            task_id,
            executable: task.executable(),
            params,
            post_processor: Arc::new(TaskRunPostProcessor::new(
                Arc::clone(task),
                Arc::clone(&self.context),
            )),
            max_execution_time: maximum_execution_time_ms
                .filter(|max| *max > 0)
                .map(|max| Duration::from_millis(max as u64)),
        };

        if let Err(e) = self.context.executor_pool.submit(pool, job) {
            task.release_claim();
            error!("任务 {} 提交到 {} 执行器池失败: {}", task_id, pool, e);
            return Err(e);
        }

        StructuredLogger::log_task_scheduled(task_id, &task.alias(), pool.as_str(), last_run_time_ms);
        Ok(SubmitOutcome::Submitted(pool))
    }

    /// 使用配置中的降级阈值提交
    pub fn submit_task_default(&self, task: &Arc<Task>) -> SchedulerResult<SubmitOutcome> {
        self.submit_task(task, self.context.relegation_threshold())
    }

    /// 为持久化任务加锁，内存任务直接返回 `true`
    ///
    /// 加锁失败的任务从注册器移除并禁止再次注册，直到重新调用注册接口。
    pub async fn lock(&self, task_id: i64) -> bool {
        let Some(task) = self.context.container.get_by_id(task_id) else {
            return false;
        };
        if !task.is_db_task() {
            return true;
        }
        if self.context.lock_coordinator.lock(task_id).await {
            return true;
        }

        self.context.register.remove_task(task_id);
        task.set_allow_register(false);
        StructuredLogger::log_lock_failed(task_id, self.context.node_id());
        if let Err(e) = self.context.event_bus.publish_sync(
            &TaskEvent::lock_failed(task_id),
            TaskEventType::LockFailed,
            false,
        ) {
            warn!("发布任务 {} 的加锁失败事件出错: {}", task_id, e);
        }
        false
    }

    pub async fn unlock(&self, task_id: i64) -> bool {
        match self.context.container.get_by_id(task_id) {
            Some(task) if task.is_db_task() => self.context.lock_coordinator.unlock(task_id).await,
            Some(_) => true,
            None => false,
        }
    }

    /// 把即将触发的任务放入注册器，返回新注册的数量
    pub fn scan_and_register(&self, now: DateTime<Utc>) -> usize {
        let window = self.context.near_window_ms();
        let mut registered = 0;
        for task in self.context.container.list() {
            if !task.is_allow_register() || self.context.register.contains(task.id()) {
                continue;
            }
            let near = task
                .with_trigger(|t| !t.is_pause && t.is_near_triggering_time_at(now, window))
                .unwrap_or(false);
            if near && self.context.register.register_task(task) {
                registered += 1;
            }
        }
        registered
    }

    /// 取出到期任务并逐个提交
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        for task in self.context.register.take_due(now) {
            let task_id = task.id();
            let mut locked_here = false;
            if task.is_db_task() && !self.context.lock_coordinator.is_locally_locked(task_id) {
                if !self.lock(task_id).await {
                    report.lock_failed += 1;
                    continue;
                }
                locked_here = true;
            }

            let submitted = match self.submit_task_default(&task) {
                Ok(SubmitOutcome::Submitted(_)) => {
                    report.submitted += 1;
                    true
                }
                Ok(SubmitOutcome::MissFire) => {
                    report.miss_fired += 1;
                    task.with_trigger_mut(|t| t.refresh_at(now));
                    false
                }
                Ok(SubmitOutcome::Rejected(_)) => {
                    report.rejected += 1;
                    false
                }
                Err(e) => {
                    error!("任务 {} 调度失败: {}", task_id, e);
                    false
                }
            };

            if locked_here && !submitted {
                self.unlock(task_id).await;
            }
        }

        report
    }

    /// 一个完整的调度周期：扫描注册，然后分发到期任务
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let registered = self.scan_and_register(now);
        let mut report = self.dispatch_due(now).await;
        report.registered = registered;
        if report != TickReport::default() {
            debug!("调度周期完成: {:?}", report);
        }
        report
    }
}
