//! Test doubles for executables, event listeners and lock repositories

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use scheduler_core::TaskEventListener;
use scheduler_domain::{
    Executable, TaskEvent, TaskEventType, TaskKind, TaskLockRepository, TriggerRow,
};
use scheduler_errors::{SchedulerError, SchedulerResult};
use scheduler_worker::ExecutableFactory;
use serde_json::Value;

/// Executable that records every invocation
///
/// Clones share the same call log, so a test can keep one handle and give
/// another to the task under test.
#[derive(Debug, Clone)]
pub struct RecordingExecutable {
    name: String,
    delay: Option<Duration>,
    result: Value,
    calls: Arc<Mutex<Vec<Vec<Value>>>>,
    running: Arc<AtomicUsize>,
    max_concurrent: Arc<AtomicUsize>,
}

impl RecordingExecutable {
    pub fn new() -> Self {
        Self {
            name: "recording".to_string(),
            delay: None,
            result: Value::Null,
            calls: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicUsize::new(0)),
            max_concurrent: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn returning(mut self, result: Value) -> Self {
        self.result = result;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<Vec<Value>> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of overlapping invocations observed
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

impl Default for RecordingExecutable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executable for RecordingExecutable {
    async fn execute(&self, params: &[Value]) -> SchedulerResult<Value> {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(running, Ordering::SeqCst);
        self.calls.lock().unwrap().push(params.to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Executable that always fails
#[derive(Debug, Clone, Default)]
pub struct FailingExecutable {
    attempts: Arc<AtomicUsize>,
}

impl FailingExecutable {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executable for FailingExecutable {
    async fn execute(&self, _params: &[Value]) -> SchedulerResult<Value> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SchedulerError::TaskExecution("模拟执行失败".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Executable that panics on every call
#[derive(Debug, Clone, Default)]
pub struct PanickingExecutable;

#[async_trait]
impl Executable for PanickingExecutable {
    async fn execute(&self, _params: &[Value]) -> SchedulerResult<Value> {
        panic!("模拟执行体panic");
    }

    fn name(&self) -> &str {
        "panicking"
    }
}

/// Factory that resolves executables by `TaskKind::name()`
///
/// Unknown names resolve to a fresh `RecordingExecutable`.
#[derive(Default)]
pub struct TestExecutableFactory {
    executables: Mutex<HashMap<String, Arc<dyn Executable>>>,
}

impl TestExecutableFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executable(self, name: &str, executable: Arc<dyn Executable>) -> Self {
        self.executables
            .lock()
            .unwrap()
            .insert(name.to_string(), executable);
        self
    }
}

impl ExecutableFactory for TestExecutableFactory {
    fn create(&self, kind: &TaskKind) -> SchedulerResult<Arc<dyn Executable>> {
        Ok(self
            .executables
            .lock()
            .unwrap()
            .get(kind.name())
            .cloned()
            .unwrap_or_else(|| Arc::new(RecordingExecutable::new())))
    }
}

/// Listener that keeps every event it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<TaskEvent>>>,
    fail: bool,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// A listener that records and then reports a failure
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_of(&self, event_type: TaskEventType) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.kind() == event_type)
            .count()
    }

    pub fn count_for(&self, task_id: i64, event_type: TaskEventType) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.task_id() == task_id && event.kind() == event_type)
            .count()
    }
}

impl TaskEventListener for RecordingListener {
    fn on_event(&self, event: &TaskEvent) -> SchedulerResult<()> {
        self.events.lock().unwrap().push(event.clone());
        if self.fail {
            return Err(SchedulerError::Internal("模拟订阅者失败".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recording-listener"
    }
}

mock! {
    pub TaskLockRepository {}

    #[async_trait]
    impl TaskLockRepository for TaskLockRepository {
        async fn lock(&self, task_id: i64) -> SchedulerResult<bool>;
        async fn unlock(&self, task_id: i64) -> SchedulerResult<bool>;
        async fn load_trigger_row(&self, task_id: i64) -> SchedulerResult<Option<TriggerRow>>;
        async fn save_trigger_row(&self, row: &TriggerRow) -> SchedulerResult<bool>;
    }
}

impl MockTaskLockRepository {
    /// A repository whose every call fails, as if the store were unreachable
    pub fn unavailable() -> Self {
        let mut repository = Self::new();
        repository
            .expect_lock()
            .returning(|_| Err(SchedulerError::Internal("锁存储不可用".to_string())));
        repository
            .expect_unlock()
            .returning(|_| Err(SchedulerError::Internal("锁存储不可用".to_string())));
        repository
            .expect_load_trigger_row()
            .returning(|_| Err(SchedulerError::Internal("锁存储不可用".to_string())));
        repository
            .expect_save_trigger_row()
            .returning(|_| Err(SchedulerError::Internal("锁存储不可用".to_string())));
        repository
    }
}
