//! 编辑参数
//!
//! 只有这里列出的字段允许被编辑；任务ID、任务类型与注解ID不可修改。
//! 所有字段为 `None` 时表示不修改。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cron_utils::CronScheduler;
use crate::task::TaskAttributes;
use crate::trigger::Trigger;
use scheduler_errors::{SchedulerError, SchedulerResult};

/// 触发器编辑参数
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TriggerEditParams {
    pub cron_expression: Option<String>,
    pub repeat_times: Option<i32>,
    pub cycle_ms: Option<i64>,
    pub triggering_time: Option<DateTime<Utc>>,
    /// 逗号分隔的子任务ID，例如 `"1,2,3"`
    pub child_tasks_id: Option<String>,
    pub maximum_execution_time_ms: Option<i64>,
}

impl TriggerEditParams {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// 解析子任务ID列表
    pub fn parse_child_tasks(&self) -> SchedulerResult<Option<Vec<i64>>> {
        let Some(raw) = self.child_tasks_id.as_deref() else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        raw.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| {
                id.parse::<i64>().map_err(|e| {
                    SchedulerError::invalid_params(format!("子任务ID无效: {id} - {e}"))
                })
            })
            .collect::<SchedulerResult<Vec<_>>>()
            .map(Some)
    }

    /// 先完整校验再写入，校验失败时触发器保持原样
    pub fn merge_into(&self, trigger: &mut Trigger) -> SchedulerResult<()> {
        if let Some(expr) = self.cron_expression.as_deref() {
            CronScheduler::validate_cron_expression(expr)?;
        }
        if matches!(self.cycle_ms, Some(cycle) if cycle <= 0) {
            return Err(SchedulerError::invalid_trigger("周期必须大于0"));
        }
        if matches!(self.repeat_times, Some(times) if times < 0) {
            return Err(SchedulerError::invalid_trigger("重复次数不能为负数"));
        }
        if matches!(self.maximum_execution_time_ms, Some(max) if max <= 0) {
            return Err(SchedulerError::invalid_trigger("最大执行时长必须大于0"));
        }
        let child_tasks = self.parse_child_tasks()?;

        let schedule_changed = self.cron_expression.is_some() || self.cycle_ms.is_some();
        if let Some(expr) = &self.cron_expression {
            trigger.cron_expression = Some(expr.clone());
        }
        if let Some(cycle) = self.cycle_ms {
            trigger.cycle_ms = Some(cycle);
        }
        if let Some(times) = self.repeat_times {
            trigger.repeat_times = Some(times);
        }
        if let Some(children) = child_tasks {
            trigger.child_tasks = children;
        }
        if let Some(max) = self.maximum_execution_time_ms {
            trigger.maximum_execution_time_ms = Some(max);
        }
        match self.triggering_time {
            Some(time) => trigger.triggering_time = Some(time),
            // 调度规则变化后旧的触发时间作废，恢复调度时重新计算
            None if schedule_changed => trigger.triggering_time = None,
            None => {}
        }
        Ok(())
    }
}

/// 任务编辑参数
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskEditParams {
    pub alias: Option<String>,
    pub belong_to: Option<i64>,
    pub task_level: Option<i32>,
    /// JSON 格式的参数，数组按位置传参，其余值视为单个参数
    pub params_string: Option<String>,
}

impl TaskEditParams {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn parse_params(&self) -> SchedulerResult<Option<Vec<Value>>> {
        let Some(raw) = self.params_string.as_deref() else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| SchedulerError::invalid_params(format!("任务参数解析失败: {e}")))?;
        Ok(Some(match value {
            Value::Array(items) => items,
            other => vec![other],
        }))
    }

    pub fn apply(&self, attributes: &mut TaskAttributes, params: Option<Vec<Value>>) {
        if let Some(alias) = &self.alias {
            attributes.alias = alias.clone();
        }
        if let Some(belong_to) = self.belong_to {
            attributes.belong_to = Some(belong_to);
        }
        if let Some(level) = self.task_level {
            attributes.task_level = level;
        }
        if let Some(params) = params {
            attributes.params = params;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_merge_only_given_fields() {
        let mut trigger = Trigger::cycle(Duration::seconds(30), Some(5)).unwrap();
        trigger.child_tasks = vec![1];
        let original_time = trigger.triggering_time;

        let params = TriggerEditParams {
            maximum_execution_time_ms: Some(60_000),
            ..TriggerEditParams::default()
        };
        params.merge_into(&mut trigger).unwrap();
        assert_eq!(trigger.maximum_execution_time_ms, Some(60_000));
        assert_eq!(trigger.repeat_times, Some(5));
        assert_eq!(trigger.child_tasks, vec![1]);
        assert_eq!(trigger.triggering_time, original_time);
    }

    #[test]
    fn test_schedule_change_clears_triggering_time() {
        let mut trigger = Trigger::cycle(Duration::seconds(30), None).unwrap();
        let params = TriggerEditParams {
            cron_expression: Some("0 0 * * * *".to_string()),
            child_tasks_id: Some("3, 4,5".to_string()),
            ..TriggerEditParams::default()
        };
        params.merge_into(&mut trigger).unwrap();
        assert_eq!(trigger.cron_expression.as_deref(), Some("0 0 * * * *"));
        assert_eq!(trigger.child_tasks, vec![3, 4, 5]);
        assert!(trigger.triggering_time.is_none());
    }

    #[test]
    fn test_invalid_edit_leaves_trigger_untouched() {
        let mut trigger = Trigger::cycle(Duration::seconds(30), None).unwrap();
        let before = trigger.clone();

        let params = TriggerEditParams {
            repeat_times: Some(3),
            child_tasks_id: Some("1,x".to_string()),
            ..TriggerEditParams::default()
        };
        assert!(params.merge_into(&mut trigger).is_err());
        assert_eq!(trigger, before);

        let params = TriggerEditParams {
            cron_expression: Some("every day".to_string()),
            ..TriggerEditParams::default()
        };
        assert!(matches!(
            params.merge_into(&mut trigger),
            Err(SchedulerError::InvalidCron { .. })
        ));
        assert_eq!(trigger, before);
    }

    #[test]
    fn test_task_edit_params() {
        let params = TaskEditParams {
            alias: Some("报表任务".to_string()),
            task_level: Some(3),
            params_string: Some(r#"["a", 1]"#.to_string()),
            ..TaskEditParams::default()
        };
        let parsed = params.parse_params().unwrap();
        assert_eq!(parsed, Some(vec![json!("a"), json!(1)]));

        let mut attributes = TaskAttributes::default();
        params.apply(&mut attributes, parsed);
        assert_eq!(attributes.alias, "报表任务");
        assert_eq!(attributes.task_level, 3);
        assert_eq!(attributes.params.len(), 2);

        let scalar = TaskEditParams {
            params_string: Some("42".to_string()),
            ..TaskEditParams::default()
        };
        assert_eq!(scalar.parse_params().unwrap(), Some(vec![json!(42)]));

        let broken = TaskEditParams {
            params_string: Some("[1,".to_string()),
            ..TaskEditParams::default()
        };
        assert!(broken.parse_params().is_err());
        assert!(TaskEditParams::default().is_empty());
    }
}
