//! Test data builders with sensible defaults

use std::sync::Arc;

use scheduler_domain::{
    Executable, Task, TaskAttributes, TaskDefinition, TaskKind, TaskType, Trigger,
};
use serde_json::Value;

use crate::mocks::RecordingExecutable;

/// Builder for tasks and task definitions
///
/// Defaults to a memory task running the method `recording`, without a
/// trigger. `build` attaches a fresh `RecordingExecutable` unless one was
/// given with `with_executable`.
pub struct TaskBuilder {
    definition: TaskDefinition,
    executable: Option<Arc<dyn Executable>>,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            definition: TaskDefinition {
                id: 1,
                annotation_id: None,
                task_type: TaskType::Memory,
                kind: TaskKind::Method {
                    method_name: "recording".to_string(),
                },
                attributes: TaskAttributes {
                    alias: "test_task".to_string(),
                    ..TaskAttributes::default()
                },
                trigger: None,
                is_allow_register: true,
            },
            executable: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.definition.id = id;
        self
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.definition.task_type = task_type;
        self
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.definition.attributes.alias = alias.to_string();
        self
    }

    pub fn with_method(mut self, method_name: &str) -> Self {
        self.definition.kind = TaskKind::Method {
            method_name: method_name.to_string(),
        };
        self
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.definition.kind = kind;
        self
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.definition.attributes.params = params;
        self
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.definition.trigger = Some(trigger);
        self
    }

    pub fn with_annotation_id(mut self, annotation_id: i64) -> Self {
        self.definition.annotation_id = Some(annotation_id);
        self
    }

    pub fn not_allow_register(mut self) -> Self {
        self.definition.is_allow_register = false;
        self
    }

    pub fn with_executable<E>(mut self, executable: E) -> Self
    where
        E: Executable + 'static,
    {
        self.executable = Some(Arc::new(executable));
        self
    }

    pub fn build_definition(self) -> TaskDefinition {
        self.definition
    }

    pub fn build(self) -> Task {
        let executable = self
            .executable
            .unwrap_or_else(|| Arc::new(RecordingExecutable::new()));
        Task::new(self.definition, executable)
    }

    pub fn build_arc(self) -> Arc<Task> {
        Arc::new(self.build())
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}
