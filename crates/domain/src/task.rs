use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::executable::Executable;
use crate::trigger::Trigger;

/// 任务类型
///
/// - `Memory`: 内存任务，只在当前节点调度，不参与分布式锁
/// - `Db`: 持久化任务，集群内多个节点可见，执行前必须取得分布式锁
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskType {
    #[serde(rename = "MEMORY")]
    Memory,
    #[serde(rename = "DB")]
    Db,
}

/// 任务内容
///
/// 显式的类型标签，执行体在构建任务时由工厂根据标签一次性解析。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// 方法型任务，`method_name` 在方法注册表中解析
    Method { method_name: String },
    /// 脚本型任务
    Script {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        working_dir: Option<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
}

impl TaskKind {
    pub fn name(&self) -> &str {
        match self {
            TaskKind::Method { method_name } => method_name,
            TaskKind::Script { command, .. } => command,
        }
    }
}

/// 任务的可编辑属性
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskAttributes {
    pub alias: String,
    pub belong_to: Option<i64>,
    pub task_level: i32,
    pub params: Vec<Value>,
}

/// 任务定义
///
/// 注册接口接收的纯数据形式，也是查询接口返回的快照形式。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDefinition {
    pub id: i64,
    #[serde(default)]
    pub annotation_id: Option<i64>,
    pub task_type: TaskType,
    pub kind: TaskKind,
    #[serde(flatten)]
    pub attributes: TaskAttributes,
    #[serde(default)]
    pub trigger: Option<Trigger>,
    #[serde(default = "default_allow_register")]
    pub is_allow_register: bool,
}

fn default_allow_register() -> bool {
    true
}

/// 任务运行状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    /// 正在执行
    pub is_start: bool,
    /// 已提交到执行器池但尚未开始
    pub is_waiting: bool,
}

impl RunState {
    pub fn is_idle(&self) -> bool {
        !self.is_start && !self.is_waiting
    }
}

/// 提交被拒绝的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NoTrigger,
    Paused,
    NotAllowRegister,
}

/// 一次提交尝试的判定结果
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitClaim {
    Rejected(RejectReason),
    /// 任务仍在运行或排队，本次触发属于 miss fire
    Overlap(RunState),
    /// 已占用任务，调用方必须提交到执行器池或调用 `release_claim`
    Claimed {
        last_run_time_ms: i64,
        maximum_execution_time_ms: Option<i64>,
        params: Vec<Value>,
    },
}

/// 可调度任务
///
/// 任务在任务容器、注册器和执行器池之间以 `Arc<Task>` 共享。
/// 不可变字段（id、类型、注解ID、内容标签）在构建后不再变化；
/// 可变字段各自由独立的锁保护，锁顺序固定为 触发器 → 运行状态。
pub struct Task {
    id: i64,
    task_type: TaskType,
    annotation_id: Option<i64>,
    kind: TaskKind,
    attributes: RwLock<TaskAttributes>,
    trigger: Mutex<Option<Trigger>>,
    run_state: Mutex<RunState>,
    allow_register: AtomicBool,
    version: AtomicU64,
    edit_lock: Mutex<()>,
    executable: Arc<dyn Executable>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Task {
    pub fn new(definition: TaskDefinition, executable: Arc<dyn Executable>) -> Self {
        let TaskDefinition {
            id,
            annotation_id,
            task_type,
            kind,
            attributes,
            trigger,
            is_allow_register,
        } = definition;
        let trigger = trigger.map(|mut trigger| {
            trigger.task_id = id;
            trigger
        });

        Self {
            id,
            task_type,
            annotation_id,
            kind,
            attributes: RwLock::new(attributes),
            trigger: Mutex::new(trigger),
            run_state: Mutex::new(RunState::default()),
            allow_register: AtomicBool::new(is_allow_register),
            version: AtomicU64::new(0),
            edit_lock: Mutex::new(()),
            executable,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn is_db_task(&self) -> bool {
        self.task_type == TaskType::Db
    }

    pub fn annotation_id(&self) -> Option<i64> {
        self.annotation_id
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn executable(&self) -> Arc<dyn Executable> {
        Arc::clone(&self.executable)
    }

    /// 当前状态的完整快照
    pub fn definition(&self) -> TaskDefinition {
        TaskDefinition {
            id: self.id,
            annotation_id: self.annotation_id,
            task_type: self.task_type,
            kind: self.kind.clone(),
            attributes: self.attributes(),
            trigger: self.trigger(),
            is_allow_register: self.is_allow_register(),
        }
    }

    pub fn attributes(&self) -> TaskAttributes {
        self.attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn alias(&self) -> String {
        self.attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .alias
            .clone()
    }

    pub fn update_attributes<F>(&self, update: F)
    where
        F: FnOnce(&mut TaskAttributes),
    {
        let mut attributes = self
            .attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        update(&mut attributes);
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn has_trigger(&self) -> bool {
        lock(&self.trigger).is_some()
    }

    pub fn trigger(&self) -> Option<Trigger> {
        lock(&self.trigger).clone()
    }

    pub fn with_trigger<R>(&self, read: impl FnOnce(&Trigger) -> R) -> Option<R> {
        lock(&self.trigger).as_ref().map(read)
    }

    pub fn with_trigger_mut<R>(&self, update: impl FnOnce(&mut Trigger) -> R) -> Option<R> {
        lock(&self.trigger).as_mut().map(update)
    }

    /// 修改触发器并递增版本号，任务没有触发器时返回 `None`
    pub fn edit_trigger<R>(&self, edit: impl FnOnce(&mut Trigger) -> R) -> Option<R> {
        let result = lock(&self.trigger).as_mut().map(edit);
        if result.is_some() {
            self.version.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    /// 整体替换触发器，返回旧触发器
    pub fn bind_trigger(&self, mut trigger: Trigger) -> Option<Trigger> {
        trigger.task_id = self.id;
        let previous = lock(&self.trigger).replace(trigger);
        self.version.fetch_add(1, Ordering::SeqCst);
        previous
    }

    pub fn run_state(&self) -> RunState {
        *lock(&self.run_state)
    }

    pub fn is_start(&self) -> bool {
        lock(&self.run_state).is_start
    }

    pub fn is_waiting(&self) -> bool {
        lock(&self.run_state).is_waiting
    }

    /// 原子地判定本次触发能否提交
    ///
    /// 在同一临界区内检查暂停标记与运行状态，并置位 `is_waiting`、记录触发，
    /// 因此同一任务的两个并发调度周期不可能同时拿到 `Claimed`。
    pub fn claim_for_submit(&self, now: DateTime<Utc>) -> SubmitClaim {
        let mut trigger_guard = lock(&self.trigger);
        let trigger = match trigger_guard.as_mut() {
            Some(trigger) => trigger,
            None => return SubmitClaim::Rejected(RejectReason::NoTrigger),
        };
        if trigger.is_pause {
            return SubmitClaim::Rejected(RejectReason::Paused);
        }
        if !self.is_allow_register() {
            return SubmitClaim::Rejected(RejectReason::NotAllowRegister);
        }

        let mut state = lock(&self.run_state);
        if !state.is_idle() {
            return SubmitClaim::Overlap(*state);
        }
        state.is_waiting = true;
        trigger.fire(now);
        // 下一次触发时间立即前移，运行期间再次到期才会被判定为 miss fire
        trigger.refresh_at(now);

        SubmitClaim::Claimed {
            last_run_time_ms: trigger.last_run_time_ms,
            maximum_execution_time_ms: trigger.maximum_execution_time_ms,
            params: self.attributes().params,
        }
    }

    /// 提交失败时撤销 `claim_for_submit` 置位的等待状态
    pub fn release_claim(&self) {
        lock(&self.run_state).is_waiting = false;
    }

    /// 执行开始：清除等待标记
    pub fn mark_started(&self) {
        let mut state = lock(&self.run_state);
        state.is_waiting = false;
        state.is_start = true;
    }

    pub fn mark_finished(&self) {
        *lock(&self.run_state) = RunState::default();
    }

    pub fn is_allow_register(&self) -> bool {
        self.allow_register.load(Ordering::SeqCst)
    }

    pub fn set_allow_register(&self, allow: bool) {
        self.allow_register.store(allow, Ordering::SeqCst);
    }

    /// 编辑互斥锁，同一任务的并发编辑在此串行化
    pub fn lock_for_edit(&self) -> MutexGuard<'_, ()> {
        lock(&self.edit_lock)
    }

    /// 每次被接受的编辑都会递增版本号
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("task_type", &self.task_type)
            .field("kind", &self.kind)
            .field("executable", &self.executable.name())
            .field("run_state", &self.run_state())
            .finish()
    }
}
