//! 同步事件总线
//!
//! 订阅者按事件类型登记，发布时在调用线程上按登记顺序依次回调，
//! 发布者阻塞直到所有订阅者返回。

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use scheduler_domain::{TaskEvent, TaskEventType};
use scheduler_errors::{SchedulerError, SchedulerResult};
use tracing::{debug, error, warn};

/// 事件订阅者
pub trait TaskEventListener: Send + Sync {
    fn on_event(&self, event: &TaskEvent) -> SchedulerResult<()>;

    fn name(&self) -> &str {
        "anonymous"
    }
}

#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<TaskEventType, Vec<Arc<dyn TaskEventListener>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, event_type: TaskEventType, listener: Arc<dyn TaskEventListener>) {
        debug!(
            "订阅者 {} 订阅事件 {}",
            listener.name(),
            event_type.as_str()
        );
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type)
            .or_default()
            .push(listener);
    }

    pub fn subscriber_count(&self, event_type: TaskEventType) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event_type)
            .map_or(0, Vec::len)
    }

    /// 同步发布事件，返回成功投递的订阅者数量
    ///
    /// `must_deliver` 为 `true` 时，缺少订阅者或订阅者出错（包括 panic）只记录日志，
    /// 其余订阅者照常投递；为 `false` 时第一个失败立即中止投递并返回错误。
    pub fn publish_sync(
        &self,
        event: &TaskEvent,
        event_type: TaskEventType,
        must_deliver: bool,
    ) -> SchedulerResult<usize> {
        // 回调期间不持有锁，订阅者可以在回调里继续订阅或发布
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event_type)
            .cloned()
            .unwrap_or_default();

        if listeners.is_empty() {
            if must_deliver {
                warn!(
                    "事件 {} 没有订阅者, 任务ID: {}",
                    event_type.as_str(),
                    event.task_id()
                );
            }
            return Ok(0);
        }

        let mut delivered = 0;
        for listener in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)))
                .unwrap_or_else(|_| {
                    Err(SchedulerError::EventDelivery {
                        event_type: event_type.as_str().to_string(),
                        message: format!("订阅者 {} 发生panic", listener.name()),
                    })
                });

            match outcome {
                Ok(()) => delivered += 1,
                Err(e) if must_deliver => {
                    error!(
                        "订阅者 {} 处理事件 {} 失败: {}",
                        listener.name(),
                        event_type.as_str(),
                        e
                    );
                }
                Err(e) => {
                    return Err(match e {
                        SchedulerError::EventDelivery { .. } => e,
                        other => SchedulerError::EventDelivery {
                            event_type: event_type.as_str().to_string(),
                            message: other.to_string(),
                        },
                    });
                }
            }
        }

        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl TaskEventListener for Recorder {
        fn on_event(&self, event: &TaskEvent) -> SchedulerResult<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, event.task_id()));
            Ok(())
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    struct Failing;

    impl TaskEventListener for Failing {
        fn on_event(&self, _event: &TaskEvent) -> SchedulerResult<()> {
            Err(SchedulerError::Internal("订阅者故障".to_string()))
        }
    }

    struct Panicking;

    impl TaskEventListener for Panicking {
        fn on_event(&self, _event: &TaskEvent) -> SchedulerResult<()> {
            panic!("订阅者崩溃");
        }
    }

    fn recorder(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn TaskEventListener> {
        Arc::new(Recorder {
            name: name.to_string(),
            log: Arc::clone(log),
        })
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(TaskEventType::MissFire, recorder("a", &log));
        bus.subscribe(TaskEventType::MissFire, recorder("b", &log));
        bus.subscribe(TaskEventType::Start, recorder("c", &log));

        let delivered = bus
            .publish_sync(&TaskEvent::miss_fire(7), TaskEventType::MissFire, true)
            .unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(*log.lock().unwrap(), vec!["a:7", "b:7"]);
    }

    #[test]
    fn test_must_deliver_skips_failures() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(TaskEventType::MissFire, Arc::new(Failing));
        bus.subscribe(TaskEventType::MissFire, Arc::new(Panicking));
        bus.subscribe(TaskEventType::MissFire, recorder("last", &log));

        let delivered = bus
            .publish_sync(&TaskEvent::miss_fire(1), TaskEventType::MissFire, true)
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(*log.lock().unwrap(), vec!["last:1"]);
    }

    #[test]
    fn test_best_effort_stops_at_first_failure() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(TaskEventType::Finished, recorder("first", &log));
        bus.subscribe(TaskEventType::Finished, Arc::new(Failing));
        bus.subscribe(TaskEventType::Finished, recorder("never", &log));

        let err = bus
            .publish_sync(
                &TaskEvent::finished(3, true, 5),
                TaskEventType::Finished,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, SchedulerError::EventDelivery { .. }));
        assert_eq!(*log.lock().unwrap(), vec!["first:3"]);
    }

    #[test]
    fn test_missing_subscribers() {
        let bus = EventBus::new();
        assert_eq!(
            bus.publish_sync(&TaskEvent::miss_fire(1), TaskEventType::MissFire, true)
                .unwrap(),
            0
        );
        assert_eq!(bus.subscriber_count(TaskEventType::MissFire), 0);
    }
}
