use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use scheduler_errors::{SchedulerError, SchedulerResult};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::lifecycle::Scheduler;
use crate::scheduler::TaskScheduler;

/// 轮询驱动
///
/// 按 `poll_interval_ms` 周期调用 [`TaskScheduler::tick`]。销毁时停止轮询，
/// 并等待执行器池中已提交的任务全部结束。
pub struct PollingScheduler {
    scheduler: Arc<TaskScheduler>,
    shutdown_tx: broadcast::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PollingScheduler {
    pub fn new(scheduler: Arc<TaskScheduler>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            scheduler,
            shutdown_tx,
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

#[async_trait]
impl Scheduler for PollingScheduler {
    fn name(&self) -> &str {
        "polling-scheduler"
    }

    async fn execute(&self) -> SchedulerResult<()> {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if handle.is_some() {
            return Err(SchedulerError::Internal("轮询调度器已经在运行".to_string()));
        }

        let interval_ms = self.scheduler.context().config.scheduler.poll_interval_ms;
        let scheduler = Arc::clone(&self.scheduler);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!("轮询调度开始, 周期: {}ms", interval_ms);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        scheduler.tick(Utc::now()).await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("收到关闭信号, 轮询调度退出");
                        break;
                    }
                }
            }
        }));
        Ok(())
    }

    async fn destroy(&self) -> SchedulerResult<()> {
        let _ = self.shutdown_tx.send(());
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("轮询任务异常退出: {}", e);
            }
        }

        self.scheduler.context().executor_pool.shutdown().await;
        Ok(())
    }
}
