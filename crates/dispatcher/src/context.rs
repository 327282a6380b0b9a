use std::sync::Arc;

use scheduler_core::{AppConfig, EventBus, TaskContainer};
use scheduler_domain::TaskLockRepository;
use scheduler_worker::{ExecutableFactory, ExecutorPool};

use crate::lock_coordinator::LockCoordinator;
use crate::register::TaskRegister;

/// 调度上下文
///
/// 组装调度所需的全部共享组件，调度器、后置处理器和任务接口都持有同一个上下文。
pub struct SchedulingContext {
    pub config: Arc<AppConfig>,
    pub container: Arc<TaskContainer>,
    pub register: Arc<TaskRegister>,
    pub event_bus: Arc<EventBus>,
    pub executor_pool: Arc<ExecutorPool>,
    pub lock_coordinator: Arc<LockCoordinator>,
    pub lock_repository: Arc<dyn TaskLockRepository>,
    pub executable_factory: Arc<dyn ExecutableFactory>,
}

impl SchedulingContext {
    /// 按配置创建上下文，执行器池的工作任务会立即启动，必须在 tokio 运行时内调用
    pub fn new(
        config: AppConfig,
        lock_repository: Arc<dyn TaskLockRepository>,
        executable_factory: Arc<dyn ExecutableFactory>,
    ) -> Arc<Self> {
        let executor_pool = Arc::new(ExecutorPool::new(&config.executor_pool));
        let container = Arc::new(TaskContainer::new(config.container.max_capacity));
        let lock_coordinator = Arc::new(LockCoordinator::new(
            Arc::clone(&lock_repository),
            config.scheduler.node_id.clone(),
        ));

        Arc::new(Self {
            config: Arc::new(config),
            container,
            register: Arc::new(TaskRegister::new()),
            event_bus: Arc::new(EventBus::new()),
            executor_pool,
            lock_coordinator,
            lock_repository,
            executable_factory,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.config.scheduler.node_id
    }

    /// 降级阈值（分钟）
    pub fn relegation_threshold(&self) -> f64 {
        self.config.executor_pool.relegation_threshold
    }

    pub fn near_window_ms(&self) -> i64 {
        self.config.scheduler.near_window_ms
    }
}
