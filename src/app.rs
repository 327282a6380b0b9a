use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use scheduler_core::{AppConfig, TaskEventListener};
use scheduler_dispatcher::{
    PollingScheduler, SchedulerGroup, SchedulingContext, TaskApi, TaskScheduler,
};
use scheduler_domain::{TaskDefinition, TaskEvent, TaskEventType, TaskLockRepository};
use scheduler_errors::SchedulerResult;
use scheduler_infrastructure::SqliteTaskLockRepository;
use scheduler_worker::{DefaultExecutableFactory, MethodRegistry};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

/// 任务清单文件
#[derive(Debug, Default, Deserialize)]
pub struct TaskManifest {
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
}

/// 记录 miss fire 的默认订阅者
struct MissFireLogListener;

impl TaskEventListener for MissFireLogListener {
    fn on_event(&self, event: &TaskEvent) -> SchedulerResult<()> {
        warn!(task_id = event.task_id(), "任务错过本次触发");
        Ok(())
    }

    fn name(&self) -> &str {
        "miss-fire-log"
    }
}

/// 主应用程序
pub struct Application {
    context: Arc<SchedulingContext>,
    api: Arc<TaskApi>,
    methods: Arc<MethodRegistry>,
    group: SchedulerGroup,
}

impl Application {
    /// 打开 SQLite 任务锁存储并组装调度组件
    pub async fn new(config: AppConfig) -> Result<Self> {
        let repository =
            SqliteTaskLockRepository::connect(&config.database, &config.scheduler.node_id)
                .await
                .with_context(|| format!("打开任务锁数据库失败: {}", config.database.url))?;
        Ok(Self::with_repository(config, Arc::new(repository)))
    }

    /// 使用指定的锁仓储组装调度组件，必须在 tokio 运行时内调用
    pub fn with_repository(config: AppConfig, repository: Arc<dyn TaskLockRepository>) -> Self {
        info!("初始化调度节点: {}", config.scheduler.node_id);

        let methods = Arc::new(MethodRegistry::new());
        register_builtin_methods(&methods);

        let factory = Arc::new(DefaultExecutableFactory::new(Arc::clone(&methods)));
        let context = SchedulingContext::new(config, repository, factory);
        context
            .event_bus
            .subscribe(TaskEventType::MissFire, Arc::new(MissFireLogListener));

        let scheduler = Arc::new(TaskScheduler::new(Arc::clone(&context)));
        let mut group = SchedulerGroup::new();
        group.add(Arc::new(PollingScheduler::new(scheduler)));

        Self {
            api: Arc::new(TaskApi::new(Arc::clone(&context))),
            context,
            methods,
            group,
        }
    }

    pub fn context(&self) -> &Arc<SchedulingContext> {
        &self.context
    }

    pub fn api(&self) -> &Arc<TaskApi> {
        &self.api
    }

    /// 方法注册表，方法型任务必须在注册任务前登记方法
    pub fn methods(&self) -> &Arc<MethodRegistry> {
        &self.methods
    }

    /// 从 TOML 清单注册任务，返回注册成功的数量
    pub async fn load_tasks(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("读取任务清单失败: {}", path.display()))?;
        let manifest: TaskManifest = toml::from_str(&content)
            .with_context(|| format!("解析任务清单失败: {}", path.display()))?;

        let mut registered = 0;
        for definition in manifest.tasks {
            let task_id = definition.id;
            match self.api.register_task(definition).await {
                Ok(true) => registered += 1,
                Ok(false) => warn!("任务 {} 未注册", task_id),
                Err(e) => error!("注册任务 {} 失败: {}", task_id, e),
            }
        }
        info!("从 {} 注册了 {} 个任务", path.display(), registered);
        Ok(registered)
    }

    pub async fn start(&self) -> usize {
        self.group.start_all().await
    }

    pub async fn stop(&self) -> usize {
        self.group.destroy_all().await
    }
}

fn register_builtin_methods(methods: &MethodRegistry) {
    methods.register_fn("noop", |_params: Vec<Value>| async { Ok(Value::Null) });
    methods.register_fn("log", |params: Vec<Value>| async move {
        info!(params = %serde_json::Value::Array(params.clone()), "执行日志任务");
        Ok(Value::Array(params))
    });
}
