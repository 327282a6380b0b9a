use async_trait::async_trait;
use serde_json::Value;

use scheduler_errors::SchedulerResult;

/// 任务可执行能力
///
/// 调度器只依赖这一能力，不关心任务内容是方法调用还是脚本。
/// 执行失败通过 `Err` 返回，由执行器池捕获后交给后置处理器。
#[async_trait]
pub trait Executable: Send + Sync {
    /// 执行任务
    async fn execute(&self, params: &[Value]) -> SchedulerResult<Value>;

    /// 可执行体名称，用于日志
    fn name(&self) -> &str;

    fn is_executable(&self) -> bool {
        true
    }
}
