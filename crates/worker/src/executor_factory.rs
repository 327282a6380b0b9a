use std::sync::Arc;

use scheduler_domain::{Executable, Task, TaskDefinition, TaskKind};
use scheduler_errors::{SchedulerError, SchedulerResult};
use tracing::debug;

use crate::executors::{MethodExecutable, MethodRegistry, ScriptExecutable, TaskExecutable};

/// 根据任务内容标签构建执行体
///
/// 执行体在任务构建时解析一次，之后随任务共享，调度路径上不再查找。
pub trait ExecutableFactory: Send + Sync {
    fn create(&self, kind: &TaskKind) -> SchedulerResult<Arc<dyn Executable>>;

    fn build_task(&self, definition: TaskDefinition) -> SchedulerResult<Task> {
        let executable = self.create(&definition.kind)?;
        Ok(Task::new(definition, executable))
    }
}

pub struct DefaultExecutableFactory {
    registry: Arc<MethodRegistry>,
}

impl DefaultExecutableFactory {
    pub fn new(registry: Arc<MethodRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }
}

impl ExecutableFactory for DefaultExecutableFactory {
    fn create(&self, kind: &TaskKind) -> SchedulerResult<Arc<dyn Executable>> {
        let executable = match kind {
            TaskKind::Method { method_name } => {
                let method = self.registry.get(method_name).ok_or_else(|| {
                    SchedulerError::invalid_params(format!("未注册的任务方法: {method_name}"))
                })?;
                TaskExecutable::Method(MethodExecutable::new(method_name.clone(), method))
            }
            TaskKind::Script {
                command,
                args,
                working_dir,
                env,
            } => {
                if command.trim().is_empty() {
                    return Err(SchedulerError::invalid_params("脚本命令不能为空"));
                }
                TaskExecutable::Script(ScriptExecutable::new(
                    command.clone(),
                    args.clone(),
                    working_dir.clone(),
                    env.clone(),
                ))
            }
        };
        debug!("构建执行体: {}", kind.name());
        Ok(Arc::new(executable))
    }
}
