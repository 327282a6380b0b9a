//! 执行器池与执行体
//!
//! 快池处理耗时短的任务，慢池处理上次执行超过降级阈值的任务，
//! 两个池互不影响。执行体由 [`ExecutableFactory`] 根据任务内容一次性构建。

pub mod executor_factory;
pub mod executors;
pub mod pool;

pub use executor_factory::{DefaultExecutableFactory, ExecutableFactory};
pub use executors::{
    FnMethod, MethodExecutable, MethodRegistry, ScriptExecutable, TaskExecutable, TaskMethod,
};
pub use pool::{ExecutorPool, PoolJob, PoolKind, RunReport, RunnablePostProcessor, WorkerPool};
