//! 执行体实现
//!
//! 方法型任务在构建时从 [`MethodRegistry`] 解析出具体方法，脚本型任务通过
//! `tokio::process` 启动子进程。两者统一包装为 [`TaskExecutable`]。

use std::collections::HashMap;
use std::future::Future;
use std::process::Stdio;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use scheduler_domain::Executable;
use scheduler_errors::{SchedulerError, SchedulerResult};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// 可注册的任务方法
#[async_trait]
pub trait TaskMethod: Send + Sync {
    async fn invoke(&self, params: &[Value]) -> SchedulerResult<Value>;
}

/// 闭包形式的任务方法
pub struct FnMethod<F> {
    f: F,
}

impl<F> FnMethod<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TaskMethod for FnMethod<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SchedulerResult<Value>> + Send + 'static,
{
    async fn invoke(&self, params: &[Value]) -> SchedulerResult<Value> {
        (self.f)(params.to_vec()).await
    }
}

/// 方法注册表，按名称查找任务方法
#[derive(Default)]
pub struct MethodRegistry {
    methods: RwLock<HashMap<String, Arc<dyn TaskMethod>>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, method: Arc<dyn TaskMethod>) {
        let name = name.into();
        let previous = self
            .methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), method);
        if previous.is_some() {
            warn!("任务方法 {} 被重复注册, 旧方法已被替换", name);
        } else {
            debug!("注册任务方法: {}", name);
        }
    }

    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SchedulerResult<Value>> + Send + 'static,
    {
        self.register(name, Arc::new(FnMethod::new(f)));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskMethod>> {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// 方法型执行体
pub struct MethodExecutable {
    name: String,
    method: Arc<dyn TaskMethod>,
}

impl MethodExecutable {
    pub fn new(name: impl Into<String>, method: Arc<dyn TaskMethod>) -> Self {
        Self {
            name: name.into(),
            method,
        }
    }
}

#[async_trait]
impl Executable for MethodExecutable {
    async fn execute(&self, params: &[Value]) -> SchedulerResult<Value> {
        self.method.invoke(params).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 脚本型执行体
///
/// 任务参数依次追加到命令参数之后；退出码非 0 视为失败，标准输出作为执行结果。
/// 子进程随执行 future 一同销毁，超时放弃结果时进程会被杀掉。
#[derive(Debug, Clone)]
pub struct ScriptExecutable {
    command: String,
    args: Vec<String>,
    working_dir: Option<String>,
    env: HashMap<String, String>,
}

impl ScriptExecutable {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        working_dir: Option<String>,
        env: HashMap<String, String>,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir,
            env,
        }
    }

    fn param_to_arg(param: &Value) -> String {
        match param {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
impl Executable for ScriptExecutable {
    async fn execute(&self, params: &[Value]) -> SchedulerResult<Value> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .args(params.iter().map(Self::param_to_arg))
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        info!("执行脚本任务: command={}, args={:?}", self.command, self.args);

        let output = cmd
            .output()
            .await
            .map_err(|e| SchedulerError::TaskExecution(format!("启动脚本命令失败: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
            return Err(SchedulerError::TaskExecution(format!(
                "脚本执行失败，退出码: {:?}, 错误输出: {}",
                output.status.code(),
                stderr
            )));
        }

        Ok(Value::String(stdout))
    }

    fn name(&self) -> &str {
        &self.command
    }
}

/// 任务执行体的两种形态
pub enum TaskExecutable {
    Method(MethodExecutable),
    Script(ScriptExecutable),
}

#[async_trait]
impl Executable for TaskExecutable {
    async fn execute(&self, params: &[Value]) -> SchedulerResult<Value> {
        match self {
            TaskExecutable::Method(method) => method.execute(params).await,
            TaskExecutable::Script(script) => script.execute(params).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            TaskExecutable::Method(method) => method.name(),
            TaskExecutable::Script(script) => script.name(),
        }
    }
}
