//! 任务管理接口
//!
//! 对外暴露注册、查询、暂停、编辑与删除。所有修改都走
//! 暂停 → 修改 → 恢复 的流程：修改期间任务处于暂停状态，调度周期不会提交它，
//! 恢复由 [`PauseGuard`] 在任何退出路径上执行。

use std::sync::Arc;

use chrono::{Duration, Utc};
use scheduler_core::StructuredLogger;
use scheduler_domain::{Task, TaskDefinition, TaskEditParams, Trigger, TriggerEditParams, TriggerRow};
use scheduler_errors::SchedulerResult;
use tracing::{debug, warn};

use crate::context::SchedulingContext;

/// 立即执行的延迟（秒）
const RUN_NOW_DELAY_SECS: i64 = 5;

pub struct TaskApi {
    context: Arc<SchedulingContext>,
}

impl TaskApi {
    pub fn new(context: Arc<SchedulingContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<SchedulingContext> {
        &self.context
    }

    /// 注册任务
    ///
    /// 没有触发器、触发器或执行体无效时不注册，返回 `Ok(false)`。任务ID重复、
    /// 容器已满或触发器行写入失败时返回错误，此时存储中的触发器行保持不变。
    pub async fn register_task(&self, definition: TaskDefinition) -> SchedulerResult<bool> {
        let task_id = definition.id;
        let Some(trigger) = definition.trigger.as_ref() else {
            warn!("任务 {} 没有触发器, 忽略注册", task_id);
            return Ok(false);
        };
        if let Err(e) = trigger.validate() {
            warn!("任务 {} 的触发器无效, 忽略注册: {}", task_id, e);
            return Ok(false);
        }

        let task = match self.context.executable_factory.build_task(definition) {
            Ok(task) => Arc::new(task),
            Err(e) if e.is_invalid_input() => {
                warn!("任务 {} 的执行体无效, 忽略注册: {}", task_id, e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        let now = Utc::now();
        task.with_trigger_mut(|t| {
            if t.is_stale(now) {
                t.refresh_at(now);
            }
        });

        // 触发器行落库之前不参与调度
        task.set_allow_register(false);
        self.context.container.insert(Arc::clone(&task))?;
        if let Err(e) = self.persist_trigger(&task).await {
            self.context.container.remove_by_id(task_id);
            return Err(e);
        }
        task.set_allow_register(true);
        self.register_if_near(&task);

        let triggering_time = task
            .with_trigger(|t| t.triggering_time.map(|time| time.timestamp_millis()))
            .flatten();
        StructuredLogger::log_task_registered(task_id, &task.alias(), triggering_time);
        Ok(true)
    }

    /// 以 5 秒后触发一次的触发器注册任务
    pub async fn run_task_now(&self, mut definition: TaskDefinition) -> SchedulerResult<bool> {
        definition.trigger = Some(Trigger::delay(Duration::seconds(RUN_NOW_DELAY_SECS)));
        self.register_task(definition).await
    }

    /// 重新允许任务参与调度
    ///
    /// 加锁失败后任务不会再被注册，直到调用这里。持久化任务会先用存储中的
    /// 触发器行覆盖本地状态。
    pub async fn reregister(&self, task_id: i64) -> SchedulerResult<bool> {
        let Some(task) = self.context.container.get_by_id(task_id) else {
            return Ok(false);
        };
        if !task.has_trigger() {
            return Ok(false);
        }

        if task.is_db_task() {
            if let Some(row) = self.context.lock_repository.load_trigger_row(task_id).await? {
                task.with_trigger_mut(|t| row.apply_to(t));
            }
        }

        let now = Utc::now();
        task.with_trigger_mut(|t| {
            if t.is_stale(now) {
                t.refresh_at(now);
            }
        });
        task.set_allow_register(true);
        self.register_if_near(&task);
        debug!("任务 {} 重新允许注册", task_id);
        Ok(true)
    }

    pub fn get_task(&self, task_id: i64) -> Option<Arc<Task>> {
        self.context.container.get_by_id(task_id)
    }

    pub fn get_by_id(&self, task_id: i64) -> Option<TaskDefinition> {
        self.get_task(task_id).map(|task| task.definition())
    }

    pub fn find(&self, task_id: i64) -> Option<TaskDefinition> {
        self.get_by_id(task_id)
    }

    pub fn is_exist(&self, task_id: i64) -> bool {
        self.context.container.contains(task_id)
    }

    pub fn list(&self) -> Vec<TaskDefinition> {
        self.context
            .container
            .list()
            .iter()
            .map(|task| task.definition())
            .collect()
    }

    pub fn page(&self, page_num: usize, size: usize) -> Vec<TaskDefinition> {
        self.context
            .container
            .page(page_num, size)
            .iter()
            .map(|task| task.definition())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.context.container.count()
    }

    pub fn size(&self) -> usize {
        self.context.container.size()
    }

    /// 暂停任务，任务不存在时返回 `false`
    pub fn pause(&self, task_id: i64) -> bool {
        let Some(task) = self.context.container.get_by_id(task_id) else {
            return false;
        };
        if task.with_trigger_mut(|t| t.is_pause = true).is_none() {
            return true;
        }
        self.context.register.remove_task(task_id);
        debug!("任务 {} 已暂停", task_id);
        true
    }

    /// 恢复任务，任务不存在或没有触发器时返回 `false`
    pub fn unpause(&self, task_id: i64) -> bool {
        let Some(task) = self.context.container.get_by_id(task_id) else {
            return false;
        };
        let now = Utc::now();
        let resumed = task
            .with_trigger_mut(|t| {
                t.is_pause = false;
                if t.is_stale(now) {
                    t.refresh_at(now);
                }
            })
            .is_some();
        if resumed {
            debug!("任务 {} 已恢复", task_id);
        }
        resumed
    }

    /// 删除任务：先暂停，再从任务容器和注册器中移除
    pub fn delete(&self, task_id: i64) -> bool {
        if !self.pause(task_id) {
            return false;
        }
        self.context.register.remove_task(task_id);
        self.context.container.remove_by_id(task_id).is_some()
    }

    pub fn remove_task(&self, task_id: i64) -> bool {
        self.delete(task_id)
    }

    /// 编辑触发器
    ///
    /// 任务不存在、没有触发器、参数为空或参数无效时返回 `Ok(false)`，触发器保持原样。
    /// 持久化任务的新触发器行写入失败时返回错误。无论成功与否，返回前任务都已恢复。
    pub async fn edit_trigger(
        &self,
        task_id: i64,
        params: &TriggerEditParams,
    ) -> SchedulerResult<bool> {
        let Some(task) = self.merge_trigger_edit(task_id, params)? else {
            return Ok(false);
        };
        self.persist_trigger(&task).await?;
        StructuredLogger::log_task_edited(task_id, "trigger", task.version());
        Ok(true)
    }

    fn merge_trigger_edit(
        &self,
        task_id: i64,
        params: &TriggerEditParams,
    ) -> SchedulerResult<Option<Arc<Task>>> {
        if params.is_empty() {
            return Ok(None);
        }
        let Some(task) = self.context.container.get_by_id(task_id) else {
            return Ok(None);
        };
        if !task.has_trigger() {
            return Ok(None);
        }

        let _edit = task.lock_for_edit();
        let Some(_pause) = PauseGuard::new(self, task_id) else {
            return Ok(None);
        };
        let merged = task.edit_trigger(|t| params.merge_into(t));
        match merged {
            Some(Ok(())) => Ok(Some(Arc::clone(&task))),
            Some(Err(e)) if e.is_invalid_input() => {
                warn!("任务 {} 的触发器参数无效, 保持原样: {}", task_id, e);
                Ok(None)
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// 编辑任务属性（别名、归属、级别、参数），参数无法解析时返回 `Ok(false)`
    pub fn edit_task(&self, task_id: i64, params: &TaskEditParams) -> SchedulerResult<bool> {
        if params.is_empty() {
            return Ok(false);
        }
        let Some(task) = self.context.container.get_by_id(task_id) else {
            return Ok(false);
        };

        let _edit = task.lock_for_edit();
        let Some(_pause) = PauseGuard::new(self, task_id) else {
            return Ok(false);
        };
        let parsed = match params.parse_params() {
            Ok(parsed) => parsed,
            Err(e) if e.is_invalid_input() => {
                warn!("任务 {} 的参数无效, 保持原样: {}", task_id, e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        task.update_attributes(|attributes| params.apply(attributes, parsed));
        StructuredLogger::log_task_edited(task_id, "task", task.version());
        Ok(true)
    }

    /// 整体替换触发器，临近触发时立即注册
    pub async fn bind_trigger(&self, task_id: i64, trigger: Trigger) -> SchedulerResult<bool> {
        if let Err(e) = trigger.validate() {
            warn!("任务 {} 的新触发器无效, 忽略绑定: {}", task_id, e);
            return Ok(false);
        }
        let Some(task) = self.context.container.get_by_id(task_id) else {
            return Ok(false);
        };

        {
            let _edit = task.lock_for_edit();
            let Some(_pause) = PauseGuard::new(self, task_id) else {
                return Ok(false);
            };
            task.bind_trigger(trigger);
            // 新触发器处于暂停状态，恢复时由 PauseGuard 刷新触发时间
            task.with_trigger_mut(|t| t.is_pause = true);
        }
        self.persist_trigger(&task).await?;

        let near = task
            .with_trigger(|t| t.is_near_triggering_time(self.context.near_window_ms()))
            .unwrap_or(false);
        if near && task.is_allow_register() {
            self.context.register.register_task(Arc::clone(&task));
        }
        StructuredLogger::log_task_edited(task_id, "bind_trigger", task.version());
        Ok(true)
    }

    /// 持久化任务写回当前触发器行，内存任务不做任何事
    async fn persist_trigger(&self, task: &Task) -> SchedulerResult<()> {
        if !task.is_db_task() {
            return Ok(());
        }
        let Some(row) = task.with_trigger(|t| TriggerRow::from(t)) else {
            return Ok(());
        };
        if !self.context.lock_repository.save_trigger_row(&row).await? {
            warn!("任务 {} 的触发器行未写入", task.id());
        }
        Ok(())
    }

    fn register_if_near(&self, task: &Arc<Task>) {
        let near = task
            .with_trigger(|t| !t.is_pause && t.is_near_triggering_time(self.context.near_window_ms()))
            .unwrap_or(false);
        if near {
            self.context.register.register_task(Arc::clone(task));
        }
    }
}

/// 暂停期间的守卫，离开作用域时恢复任务
pub struct PauseGuard<'a> {
    api: &'a TaskApi,
    task_id: i64,
}

impl<'a> PauseGuard<'a> {
    /// 暂停任务，任务不存在时返回 `None`
    pub fn new(api: &'a TaskApi, task_id: i64) -> Option<Self> {
        api.pause(task_id).then_some(Self { api, task_id })
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        if !self.api.unpause(self.task_id) {
            warn!("任务 {} 恢复失败", self.task_id);
        }
    }
}
