//! 调度器生命周期
//!
//! 启动顺序: `before_execute` → `execute` → `after_execute`，任何一步失败都会
//! 交给 `execute_error`，之后的步骤不再执行。销毁流程与之对称。

use std::sync::Arc;

use async_trait::async_trait;
use scheduler_errors::{SchedulerError, SchedulerResult};
use tracing::{error, info};

#[async_trait]
pub trait Scheduler: Send + Sync {
    fn name(&self) -> &str;

    /// 启动优先级，数值大的先启动、后销毁
    fn scheduler_level(&self) -> i32 {
        0
    }

    async fn before_execute(&self) -> SchedulerResult<()> {
        Ok(())
    }

    async fn execute(&self) -> SchedulerResult<()>;

    async fn after_execute(&self) -> SchedulerResult<()> {
        Ok(())
    }

    async fn execute_error(&self, error: &SchedulerError) {
        error!("调度器 {} 启动失败: {}", self.name(), error);
    }

    async fn before_destroy(&self) -> SchedulerResult<()> {
        Ok(())
    }

    async fn destroy(&self) -> SchedulerResult<()> {
        Ok(())
    }

    async fn after_destroy(&self) -> SchedulerResult<()> {
        Ok(())
    }

    async fn destroy_error(&self, error: &SchedulerError) {
        error!("调度器 {} 销毁失败: {}", self.name(), error);
    }
}

/// 按生命周期顺序启动调度器，成功返回 `true`
pub async fn start_scheduler(scheduler: &dyn Scheduler) -> bool {
    let result = async {
        scheduler.before_execute().await?;
        scheduler.execute().await?;
        scheduler.after_execute().await
    }
    .await;

    match result {
        Ok(()) => {
            info!("调度器 {} 已启动", scheduler.name());
            true
        }
        Err(e) => {
            scheduler.execute_error(&e).await;
            false
        }
    }
}

pub async fn destroy_scheduler(scheduler: &dyn Scheduler) -> bool {
    let result = async {
        scheduler.before_destroy().await?;
        scheduler.destroy().await?;
        scheduler.after_destroy().await
    }
    .await;

    match result {
        Ok(()) => {
            info!("调度器 {} 已销毁", scheduler.name());
            true
        }
        Err(e) => {
            scheduler.destroy_error(&e).await;
            false
        }
    }
}

/// 一组按优先级启动的调度器
#[derive(Default)]
pub struct SchedulerGroup {
    schedulers: Vec<Arc<dyn Scheduler>>,
}

impl SchedulerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, scheduler: Arc<dyn Scheduler>) {
        self.schedulers.push(scheduler);
        // 稳定排序，同级调度器保持加入顺序
        self.schedulers
            .sort_by_key(|s| std::cmp::Reverse(s.scheduler_level()));
    }

    pub fn len(&self) -> usize {
        self.schedulers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedulers.is_empty()
    }

    /// 依次启动，返回启动成功的数量
    pub async fn start_all(&self) -> usize {
        let mut started = 0;
        for scheduler in &self.schedulers {
            if start_scheduler(scheduler.as_ref()).await {
                started += 1;
            }
        }
        started
    }

    /// 按启动的逆序销毁
    pub async fn destroy_all(&self) -> usize {
        let mut destroyed = 0;
        for scheduler in self.schedulers.iter().rev() {
            if destroy_scheduler(scheduler.as_ref()).await {
                destroyed += 1;
            }
        }
        destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Probe {
        name: String,
        level: i32,
        fail_execute: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Probe {
        fn new(name: &str, level: i32, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name: name.to_string(),
                level,
                fail_execute: false,
                log: Arc::clone(log),
            }
        }

        fn record(&self, step: &str) {
            self.log.lock().unwrap().push(format!("{}:{}", self.name, step));
        }
    }

    #[async_trait]
    impl Scheduler for Probe {
        fn name(&self) -> &str {
            &self.name
        }

        fn scheduler_level(&self) -> i32 {
            self.level
        }

        async fn before_execute(&self) -> SchedulerResult<()> {
            self.record("before");
            Ok(())
        }

        async fn execute(&self) -> SchedulerResult<()> {
            if self.fail_execute {
                return Err(SchedulerError::Internal("启动失败".to_string()));
            }
            self.record("execute");
            Ok(())
        }

        async fn after_execute(&self) -> SchedulerResult<()> {
            self.record("after");
            Ok(())
        }

        async fn execute_error(&self, _error: &SchedulerError) {
            self.record("error");
        }

        async fn destroy(&self) -> SchedulerResult<()> {
            self.record("destroy");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_step_stops_lifecycle() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut probe = Probe::new("p", 0, &log);
        probe.fail_execute = true;

        assert!(!start_scheduler(&probe).await);
        assert_eq!(*log.lock().unwrap(), vec!["p:before", "p:error"]);
    }

    #[tokio::test]
    async fn test_group_orders_by_level() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut group = SchedulerGroup::new();
        group.add(Arc::new(Probe::new("low", 0, &log)));
        group.add(Arc::new(Probe::new("high", 10, &log)));

        assert_eq!(group.start_all().await, 2);
        assert_eq!(group.destroy_all().await, 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "high:before",
                "high:execute",
                "high:after",
                "low:before",
                "low:execute",
                "low:after",
                "low:destroy",
                "high:destroy",
            ]
        );
    }
}
