//! 快慢两级执行器池
//!
//! 每个池由固定数量的 tokio 工作任务组成，共同消费一个无界队列。
//! 提交从不阻塞；任务失败、panic 或超时都只体现在 [`RunReport`] 中，
//! 不会影响工作任务本身。

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use scheduler_core::ExecutorPoolConfig;
use scheduler_domain::Executable;
use scheduler_errors::{SchedulerError, SchedulerResult};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Fast,
    Slow,
}

impl PoolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Fast => "fast",
            PoolKind::Slow => "slow",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次执行的结果
#[derive(Debug)]
pub struct RunReport {
    pub task_id: i64,
    pub pool: PoolKind,
    pub result: SchedulerResult<Value>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: i64,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// 执行前后的钩子
///
/// 工作任务在开始执行前调用 `before_run`，执行结束（包括失败、panic 和超时）后
/// 恰好调用一次 `after_run`，之后才会取下一个作业。
#[async_trait]
pub trait RunnablePostProcessor: Send + Sync {
    async fn before_run(&self) {}

    async fn after_run(&self, report: RunReport);
}

pub struct PoolJob {
    pub task_id: i64,
    pub executable: Arc<dyn Executable>,
    pub params: Vec<Value>,
    pub post_processor: Arc<dyn RunnablePostProcessor>,
    pub max_execution_time: Option<Duration>,
}

impl fmt::Debug for PoolJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolJob")
            .field("task_id", &self.task_id)
            .field("executable", &self.executable.name())
            .field("params", &self.params)
            .field("max_execution_time", &self.max_execution_time)
            .finish()
    }
}

/// 单个工作池
pub struct WorkerPool {
    kind: PoolKind,
    size: usize,
    sender: Mutex<Option<UnboundedSender<PoolJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// 创建工作池并启动 `size` 个工作任务，必须在 tokio 运行时内调用
    pub fn new(kind: PoolKind, size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let pending = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));

        let workers = (0..size)
            .map(|index| {
                tokio::spawn(worker_loop(
                    kind,
                    index,
                    Arc::clone(&receiver),
                    Arc::clone(&pending),
                    Arc::clone(&active),
                ))
            })
            .collect();

        info!("{} 执行器池已启动, 工作任务数: {}", kind, size);

        Self {
            kind,
            size,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            pending,
            active,
        }
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// 排队中尚未开始的作业数
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// 正在执行的作业数
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn submit(&self, job: PoolJob) -> SchedulerResult<()> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or_else(|| self.closed_error())?;

        self.pending.fetch_add(1, Ordering::SeqCst);
        let task_id = job.task_id;
        if sender.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(self.closed_error());
        }
        debug!("任务 {} 已进入 {} 执行器池队列", task_id, self.kind);
        Ok(())
    }

    /// 停止接收新作业，等待已排队的作业执行完毕
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for worker in workers {
            if let Err(e) = worker.await {
                error!("{} 执行器池工作任务异常退出: {}", self.kind, e);
            }
        }
        info!("{} 执行器池已关闭", self.kind);
    }

    fn closed_error(&self) -> SchedulerError {
        SchedulerError::PoolClosed {
            pool: self.kind.as_str().to_string(),
        }
    }
}

async fn worker_loop(
    kind: PoolKind,
    index: usize,
    receiver: Arc<tokio::sync::Mutex<UnboundedReceiver<PoolJob>>>,
    pending: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
) {
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            debug!("{} 执行器池工作任务 {} 退出", kind, index);
            break;
        };

        pending.fetch_sub(1, Ordering::SeqCst);
        active.fetch_add(1, Ordering::SeqCst);
        run_job(kind, job).await;
        active.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn run_job(kind: PoolKind, job: PoolJob) {
    let PoolJob {
        task_id,
        executable,
        params,
        post_processor,
        max_execution_time,
    } = job;

    post_processor.before_run().await;

    let started_at = Utc::now();
    let start = Instant::now();
    let execution = AssertUnwindSafe(executable.execute(&params)).catch_unwind();

    let outcome = match max_execution_time {
        Some(limit) => match tokio::time::timeout(limit, execution).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    "任务 {} 执行超过最大时长 {}ms, 放弃执行结果",
                    task_id,
                    limit.as_millis()
                );
                Ok(Err(SchedulerError::ExecutionTimeout))
            }
        },
        None => execution.await,
    };

    let result = outcome.unwrap_or_else(|panic| {
        let message = panic_message(panic.as_ref());
        error!("任务 {} 执行发生panic: {}", task_id, message);
        Err(SchedulerError::TaskExecution(format!(
            "任务执行发生panic: {message}"
        )))
    });

    let report = RunReport {
        task_id,
        pool: kind,
        result,
        started_at,
        elapsed_ms: start.elapsed().as_millis() as i64,
    };
    post_processor.after_run(report).await;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知panic".to_string()
    }
}

/// 快池与慢池
pub struct ExecutorPool {
    fast: WorkerPool,
    slow: WorkerPool,
}

impl ExecutorPool {
    pub fn new(config: &ExecutorPoolConfig) -> Self {
        Self::with_sizes(config.fast_pool_size, config.slow_pool_size)
    }

    pub fn with_sizes(fast_pool_size: usize, slow_pool_size: usize) -> Self {
        Self {
            fast: WorkerPool::new(PoolKind::Fast, fast_pool_size),
            slow: WorkerPool::new(PoolKind::Slow, slow_pool_size),
        }
    }

    pub fn submit_to_fast_pool(&self, job: PoolJob) -> SchedulerResult<()> {
        self.fast.submit(job)
    }

    pub fn submit_to_slow_pool(&self, job: PoolJob) -> SchedulerResult<()> {
        self.slow.submit(job)
    }

    pub fn submit(&self, kind: PoolKind, job: PoolJob) -> SchedulerResult<()> {
        match kind {
            PoolKind::Fast => self.submit_to_fast_pool(job),
            PoolKind::Slow => self.submit_to_slow_pool(job),
        }
    }

    pub fn fast(&self) -> &WorkerPool {
        &self.fast
    }

    pub fn slow(&self) -> &WorkerPool {
        &self.slow
    }

    pub async fn shutdown(&self) {
        tokio::join!(self.fast.shutdown(), self.slow.shutdown());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedSender;

    struct SleepExecutable {
        sleep: Duration,
        outcome: Result<Value, String>,
    }

    #[async_trait]
    impl Executable for SleepExecutable {
        async fn execute(&self, params: &[Value]) -> SchedulerResult<Value> {
            tokio::time::sleep(self.sleep).await;
            match &self.outcome {
                Ok(value) if value.is_null() => Ok(Value::Array(params.to_vec())),
                Ok(value) => Ok(value.clone()),
                Err(message) => Err(SchedulerError::execution(message.clone())),
            }
        }

        fn name(&self) -> &str {
            "sleep"
        }
    }

    struct PanicExecutable;

    #[async_trait]
    impl Executable for PanicExecutable {
        async fn execute(&self, _params: &[Value]) -> SchedulerResult<Value> {
            panic!("执行体崩溃");
        }

        fn name(&self) -> &str {
            "panic"
        }
    }

    struct ChannelPostProcessor {
        sender: UnboundedSender<(String, Option<RunReport>)>,
    }

    #[async_trait]
    impl RunnablePostProcessor for ChannelPostProcessor {
        async fn before_run(&self) {
            let _ = self.sender.send(("before".to_string(), None));
        }

        async fn after_run(&self, report: RunReport) {
            let _ = self.sender.send(("after".to_string(), Some(report)));
        }
    }

    fn job(
        task_id: i64,
        executable: Arc<dyn Executable>,
        sender: &UnboundedSender<(String, Option<RunReport>)>,
        max_execution_time: Option<Duration>,
    ) -> PoolJob {
        PoolJob {
            task_id,
            executable,
            params: vec![Value::from(task_id)],
            post_processor: Arc::new(ChannelPostProcessor {
                sender: sender.clone(),
            }),
            max_execution_time,
        }
    }

    #[tokio::test]
    async fn test_hooks_wrap_execution() {
        let pool = ExecutorPool::with_sizes(2, 1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let executable = Arc::new(SleepExecutable {
            sleep: Duration::from_millis(5),
            outcome: Ok(Value::Null),
        });

        pool.submit_to_fast_pool(job(1, executable, &tx, None)).unwrap();

        let (stage, _) = rx.recv().await.unwrap();
        assert_eq!(stage, "before");
        let (stage, report) = rx.recv().await.unwrap();
        assert_eq!(stage, "after");
        let report = report.unwrap();
        assert_eq!(report.pool, PoolKind::Fast);
        assert_eq!(report.result.unwrap(), Value::Array(vec![Value::from(1)]));
        assert!(report.elapsed_ms >= 5);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_failures_are_reported_not_propagated() {
        let pool = ExecutorPool::with_sizes(1, 1);
        let (tx, mut rx) = mpsc::unbounded_channel();

        pool.submit_to_slow_pool(job(1, Arc::new(PanicExecutable), &tx, None))
            .unwrap();
        let failing = Arc::new(SleepExecutable {
            sleep: Duration::from_millis(1),
            outcome: Err("失败".to_string()),
        });
        pool.submit_to_slow_pool(job(2, failing, &tx, None)).unwrap();

        let mut reports = Vec::new();
        while reports.len() < 2 {
            if let (_, Some(report)) = rx.recv().await.unwrap() {
                reports.push(report);
            }
        }
        assert!(matches!(
            reports[0].result,
            Err(SchedulerError::TaskExecution(_))
        ));
        assert_eq!(reports[0].task_id, 1);
        assert!(reports[1].result.is_err());
        assert_eq!(reports[1].pool, PoolKind::Slow);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_watchdog_abandons_long_runs() {
        let pool = ExecutorPool::with_sizes(1, 1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let slow = Arc::new(SleepExecutable {
            sleep: Duration::from_secs(30),
            outcome: Ok(Value::Null),
        });

        pool.submit_to_fast_pool(job(9, slow, &tx, Some(Duration::from_millis(20))))
            .unwrap();

        loop {
            if let (_, Some(report)) = rx.recv().await.unwrap() {
                assert!(matches!(report.result, Err(SchedulerError::ExecutionTimeout)));
                break;
            }
        }
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let pool = ExecutorPool::with_sizes(1, 1);
        pool.shutdown().await;
        assert!(pool.fast().is_closed());

        let (tx, _rx) = mpsc::unbounded_channel();
        let executable = Arc::new(PanicExecutable);
        let err = pool
            .submit_to_fast_pool(job(1, executable, &tx, None))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::PoolClosed { ref pool } if pool == "fast"));
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let pool = ExecutorPool::with_sizes(1, 1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        for id in 0..3 {
            let executable = Arc::new(SleepExecutable {
                sleep: Duration::from_millis(5),
                outcome: Ok(Value::Bool(true)),
            });
            pool.submit_to_fast_pool(job(id, executable, &tx, None)).unwrap();
        }
        pool.shutdown().await;
        drop(tx);

        let mut finished = 0;
        while let Some((stage, _)) = rx.recv().await {
            if stage == "after" {
                finished += 1;
            }
        }
        assert_eq!(finished, 3);
        assert_eq!(pool.fast().pending(), 0);
        assert_eq!(pool.fast().active(), 0);
    }
}
