use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use scheduler_core::StructuredLogger;
use scheduler_domain::{Task, TaskEvent, TriggerRow};
use scheduler_worker::{RunReport, RunnablePostProcessor};
use tracing::{debug, warn};

use crate::context::SchedulingContext;

/// 任务执行的前后处理
///
/// 执行前清除等待标记并发布开始事件；执行后记录耗时、刷新下一次触发时间、
/// 回写持久化任务的触发器行并释放锁，最后发布结果事件并触发子任务。
pub struct TaskRunPostProcessor {
    task: Arc<Task>,
    context: Arc<SchedulingContext>,
}

impl TaskRunPostProcessor {
    pub fn new(task: Arc<Task>, context: Arc<SchedulingContext>) -> Self {
        Self { task, context }
    }

    fn publish(&self, event: TaskEvent) {
        let event_type = event.kind();
        if let Err(e) = self.context.event_bus.publish_sync(&event, event_type, false) {
            warn!(
                "发布任务 {} 的 {} 事件失败: {}",
                self.task.id(),
                event_type.as_str(),
                e
            );
        }
    }

    fn trigger_children(&self, children: &[i64]) {
        let now = Utc::now();
        for child_id in children {
            let Some(child) = self.context.container.get_by_id(*child_id) else {
                warn!("任务 {} 的子任务 {} 不存在", self.task.id(), child_id);
                continue;
            };
            let bound = child
                .with_trigger_mut(|t| t.triggering_time = Some(now))
                .is_some();
            if !bound {
                warn!("子任务 {} 没有触发器, 无法触发", child_id);
                continue;
            }
            self.context.register.register_task(child);
            debug!("任务 {} 触发子任务 {}", self.task.id(), child_id);
        }
    }
}

#[async_trait]
impl RunnablePostProcessor for TaskRunPostProcessor {
    async fn before_run(&self) {
        self.task.mark_started();
        self.publish(TaskEvent::start(self.task.id()));
    }

    async fn after_run(&self, report: RunReport) {
        let task_id = self.task.id();
        let success = report.is_success();
        let now = Utc::now();

        let updated = self.task.with_trigger_mut(|t| {
            t.record_run(report.elapsed_ms, success);
            t.refresh_at(now);
            (t.child_tasks.clone(), TriggerRow::from(&*t))
        });

        if self.task.is_db_task() {
            if let Some((_, row)) = &updated {
                if let Err(e) = self.context.lock_repository.save_trigger_row(row).await {
                    warn!("回写任务 {} 的触发器失败: {}", task_id, e);
                }
            }
        }

        // 集群锁释放完成之后才清除运行状态
        if self.task.is_db_task() {
            self.context.lock_coordinator.unlock(task_id).await;
        }

        self.task.mark_finished();

        match &report.result {
            Ok(value) => {
                StructuredLogger::log_run_finished(task_id, true, report.elapsed_ms, None);
                self.publish(TaskEvent::success(task_id, value.clone(), report.elapsed_ms));
            }
            Err(e) => {
                let message = e.to_string();
                StructuredLogger::log_run_finished(
                    task_id,
                    false,
                    report.elapsed_ms,
                    Some(&message),
                );
                self.publish(TaskEvent::error(task_id, message, report.elapsed_ms));
            }
        }
        self.publish(TaskEvent::finished(task_id, success, report.elapsed_ms));

        if success {
            if let Some((children, _)) = updated {
                self.trigger_children(&children);
            }
        }
    }
}
