use std::sync::Arc;

use chrono::{Duration, Utc};
use scheduler_core::AppConfig;
use scheduler_dispatcher::{PauseGuard, SchedulingContext, TaskApi};
use scheduler_domain::{
    TaskEditParams, TaskKind, TaskLockRepository, TaskType, Trigger, TriggerEditParams,
};
use scheduler_errors::SchedulerError;
use scheduler_infrastructure::InMemoryTaskLockRepository;
use scheduler_testing_utils::{MockTaskLockRepository, TaskBuilder, TestExecutableFactory};
use scheduler_worker::{DefaultExecutableFactory, MethodRegistry};
use serde_json::json;

fn api() -> TaskApi {
    TaskApi::new(SchedulingContext::new(
        AppConfig::default(),
        Arc::new(InMemoryTaskLockRepository::new("node-001")),
        Arc::new(TestExecutableFactory::new()),
    ))
}

fn cron_task(id: i64) -> scheduler_domain::TaskDefinition {
    TaskBuilder::new()
        .with_id(id)
        .with_trigger(Trigger::cron("0 0 * * * *").unwrap())
        .build_definition()
}

#[tokio::test]
async fn test_register_requires_trigger_and_unique_id() {
    let api = api();
    assert!(!api
        .register_task(TaskBuilder::new().with_id(1).build_definition())
        .await
        .unwrap());
    assert!(!api.is_exist(1));

    assert!(api.register_task(cron_task(1)).await.unwrap());
    assert!(matches!(
        api.register_task(cron_task(1)).await,
        Err(SchedulerError::DuplicateTask { id: 1 })
    ));
    assert_eq!(api.count(), 1);
}

fn api_with_store() -> (TaskApi, InMemoryTaskLockRepository) {
    let store = InMemoryTaskLockRepository::new("node-001");
    let api = TaskApi::new(SchedulingContext::new(
        AppConfig::default(),
        Arc::new(store.clone()),
        Arc::new(TestExecutableFactory::new()),
    ));
    (api, store)
}

fn db_cycle_task(id: i64, cycle: Duration) -> scheduler_domain::TaskDefinition {
    TaskBuilder::new()
        .with_id(id)
        .with_type(TaskType::Db)
        .with_trigger(Trigger::cycle(cycle, None).unwrap())
        .build_definition()
}

#[tokio::test]
async fn test_invalid_registration_returns_false() {
    let api = api();
    let bad_cron = TaskBuilder::new()
        .with_id(1)
        .with_trigger(Trigger {
            cron_expression: Some("bad cron".to_string()),
            ..Trigger::default()
        })
        .build_definition();
    assert!(!api.register_task(bad_cron).await.unwrap());

    let empty_trigger = TaskBuilder::new()
        .with_id(2)
        .with_trigger(Trigger::default())
        .build_definition();
    assert!(!api.register_task(empty_trigger).await.unwrap());

    assert_eq!(api.count(), 0);
}

#[tokio::test]
async fn test_unresolvable_executable_returns_false() {
    let api = TaskApi::new(SchedulingContext::new(
        AppConfig::default(),
        Arc::new(InMemoryTaskLockRepository::new("node-001")),
        Arc::new(DefaultExecutableFactory::new(Arc::new(MethodRegistry::new()))),
    ));

    let unknown_method = TaskBuilder::new()
        .with_id(1)
        .with_method("not_registered")
        .with_trigger(Trigger::cron("0 0 * * * *").unwrap())
        .build_definition();
    assert!(!api.register_task(unknown_method).await.unwrap());

    let blank_script = TaskBuilder::new()
        .with_id(2)
        .with_kind(TaskKind::Script {
            command: " ".to_string(),
            args: Vec::new(),
            working_dir: None,
            env: Default::default(),
        })
        .with_trigger(Trigger::cron("0 0 * * * *").unwrap())
        .build_definition();
    assert!(!api.register_task(blank_script).await.unwrap());

    assert_eq!(api.count(), 0);
}

#[tokio::test]
async fn test_duplicate_db_registration_keeps_stored_row() {
    let (api, store) = api_with_store();
    assert!(api
        .register_task(db_cycle_task(3, Duration::seconds(60)))
        .await
        .unwrap());

    assert!(matches!(
        api.register_task(db_cycle_task(3, Duration::seconds(5))).await,
        Err(SchedulerError::DuplicateTask { id: 3 })
    ));

    let stored = store.load_trigger_row(3).await.unwrap().unwrap();
    assert_eq!(stored.cycle_ms, Some(60_000));
    assert_eq!(api.get_task(3).unwrap().trigger().unwrap().cycle_ms, Some(60_000));
}

#[tokio::test]
async fn test_failed_row_write_rolls_back_registration() {
    let api = TaskApi::new(SchedulingContext::new(
        AppConfig::default(),
        Arc::new(MockTaskLockRepository::unavailable()),
        Arc::new(TestExecutableFactory::new()),
    ));

    assert!(api
        .register_task(db_cycle_task(4, Duration::seconds(60)))
        .await
        .is_err());
    assert!(!api.is_exist(4));
    assert!(!api.context().register.contains(4));
}

#[tokio::test]
async fn test_db_trigger_edits_survive_reregister() {
    let (api, store) = api_with_store();
    assert!(api
        .register_task(db_cycle_task(12, Duration::seconds(60)))
        .await
        .unwrap());

    let edit = TriggerEditParams {
        cycle_ms: Some(5_000),
        ..TriggerEditParams::default()
    };
    assert!(api.edit_trigger(12, &edit).await.unwrap());
    let stored = store.load_trigger_row(12).await.unwrap().unwrap();
    assert_eq!(stored.cycle_ms, Some(5_000));
    assert!(!stored.is_pause);

    assert!(api.reregister(12).await.unwrap());
    assert_eq!(api.get_task(12).unwrap().trigger().unwrap().cycle_ms, Some(5_000));

    let cron = Trigger::cron("0 0 * * * *").unwrap();
    assert!(api.bind_trigger(12, cron).await.unwrap());
    let stored = store.load_trigger_row(12).await.unwrap().unwrap();
    assert_eq!(stored.cron_expression.as_deref(), Some("0 0 * * * *"));
    assert!(stored.triggering_time.is_some());

    assert!(api.reregister(12).await.unwrap());
    let trigger = api.get_task(12).unwrap().trigger().unwrap();
    assert_eq!(trigger.cron_expression.as_deref(), Some("0 0 * * * *"));
}

#[tokio::test]
async fn test_pagination_bounds() {
    let api = api();
    for id in 1..=25 {
        assert!(api.register_task(cron_task(id)).await.unwrap());
    }

    assert_eq!(api.page(3, 10).len(), 5);
    assert_eq!(api.page(3, 10)[0].id, 21);
    assert!(api.page(10, 10).is_empty());
    assert_eq!(api.list().len(), 25);
    assert_eq!(api.size(), 25);
}

#[tokio::test]
async fn test_failed_edit_still_unpauses() {
    let api = api();
    assert!(api.register_task(cron_task(5)).await.unwrap());
    let before = api.get_by_id(5).unwrap().trigger.unwrap();

    let bad = TriggerEditParams {
        cron_expression: Some("not a cron".to_string()),
        repeat_times: Some(4),
        ..TriggerEditParams::default()
    };
    assert!(!api.edit_trigger(5, &bad).await.unwrap());

    let after = api.get_by_id(5).unwrap().trigger.unwrap();
    assert!(!after.is_pause);
    assert_eq!(after.cron_expression, before.cron_expression);
    assert_eq!(after.repeat_times, before.repeat_times);
}

#[tokio::test]
async fn test_trigger_edit_recomputes_triggering_time() {
    let api = api();
    assert!(api.register_task(cron_task(6)).await.unwrap());
    let version = api.get_task(6).unwrap().version();

    let edit = TriggerEditParams {
        cycle_ms: Some(2_000),
        maximum_execution_time_ms: Some(500),
        ..TriggerEditParams::default()
    };
    assert!(api.edit_trigger(6, &edit).await.unwrap());

    let task = api.get_task(6).unwrap();
    assert!(task.version() > version);
    let trigger = task.trigger().unwrap();
    assert_eq!(trigger.cycle_ms, Some(2_000));
    assert_eq!(trigger.maximum_execution_time_ms, Some(500));
    assert!(!trigger.is_pause);
    assert!(trigger.triggering_time.is_some_and(|t| t > Utc::now()));

    assert!(!api.edit_trigger(6, &TriggerEditParams::default()).await.unwrap());
    assert!(!api.edit_trigger(404, &edit).await.unwrap());

    let negative_cycle = TriggerEditParams {
        cycle_ms: Some(-1),
        ..TriggerEditParams::default()
    };
    assert!(!api.edit_trigger(6, &negative_cycle).await.unwrap());
    assert_eq!(api.get_task(6).unwrap().trigger().unwrap().cycle_ms, Some(2_000));
}

#[tokio::test]
async fn test_edit_task_attributes() {
    let api = api();
    assert!(api.register_task(cron_task(8)).await.unwrap());

    let edit = TaskEditParams {
        alias: Some("nightly-report".to_string()),
        task_level: Some(3),
        params_string: Some(r#"[1, "two"]"#.to_string()),
        ..TaskEditParams::default()
    };
    assert!(api.edit_task(8, &edit).unwrap());

    let definition = api.find(8).unwrap();
    assert_eq!(definition.attributes.alias, "nightly-report");
    assert_eq!(definition.attributes.task_level, 3);
    assert_eq!(definition.attributes.params, vec![json!(1), json!("two")]);
    assert_eq!(definition.task_type, TaskType::Memory);

    let invalid = TaskEditParams {
        params_string: Some("{broken".to_string()),
        ..TaskEditParams::default()
    };
    assert!(!api.edit_task(8, &invalid).unwrap());
    assert_eq!(api.find(8).unwrap().attributes.params, vec![json!(1), json!("two")]);
    assert!(!api.get_task(8).unwrap().trigger().unwrap().is_pause);
}

#[tokio::test]
async fn test_pause_and_delete() {
    let api = api();
    assert!(!api.pause(1));
    assert!(!api.unpause(1));

    assert!(api.register_task(cron_task(1)).await.unwrap());
    assert!(api.pause(1));
    assert!(api.pause(1));
    assert!(api.get_task(1).unwrap().trigger().unwrap().is_pause);
    assert!(!api.context().register.contains(1));

    assert!(api.delete(1));
    assert!(!api.is_exist(1));
    assert!(!api.delete(1));
}

#[tokio::test]
async fn test_pause_guard_releases_on_drop() {
    let api = api();
    assert!(api.register_task(cron_task(2)).await.unwrap());
    {
        let _guard = PauseGuard::new(&api, 2).unwrap();
        assert!(api.get_task(2).unwrap().trigger().unwrap().is_pause);
    }
    assert!(!api.get_task(2).unwrap().trigger().unwrap().is_pause);
    assert!(PauseGuard::new(&api, 99).is_none());
}

#[tokio::test]
async fn test_bind_trigger_registers_when_near() {
    let api = api();
    let definition = TaskBuilder::new()
        .with_id(4)
        .with_trigger(Trigger::at(Utc::now() + Duration::hours(2)))
        .build_definition();
    assert!(api.register_task(definition).await.unwrap());
    assert!(!api.context().register.contains(4));

    assert!(api
        .bind_trigger(4, Trigger::at(Utc::now() + Duration::seconds(1)))
        .await
        .unwrap());
    assert!(api.context().register.contains(4));
    assert_eq!(api.get_task(4).unwrap().trigger().unwrap().task_id, 4);

    let bound = api.get_task(4).unwrap().trigger().unwrap();
    assert!(!api.bind_trigger(4, Trigger::default()).await.unwrap());
    assert_eq!(
        api.get_task(4).unwrap().trigger().unwrap().triggering_time,
        bound.triggering_time
    );
}

#[tokio::test]
async fn test_run_task_now_fires_within_five_seconds() {
    let api = api();
    let now = Utc::now();
    assert!(api
        .run_task_now(TaskBuilder::new().with_id(9).build_definition())
        .await
        .unwrap());

    let trigger = api.get_task(9).unwrap().trigger().unwrap();
    let triggering_time = trigger.triggering_time.unwrap();
    assert!(triggering_time > now);
    assert!(triggering_time <= Utc::now() + Duration::seconds(5));
    assert_eq!(trigger.repeat_times, Some(1));
}

#[tokio::test]
async fn test_reregister_after_lock_contention() {
    let api = api();
    let definition = TaskBuilder::new()
        .with_id(11)
        .with_type(TaskType::Db)
        .with_trigger(Trigger::at(Utc::now() + Duration::seconds(2)))
        .build_definition();
    assert!(api.register_task(definition).await.unwrap());

    let task = api.get_task(11).unwrap();
    task.set_allow_register(false);
    api.context().register.remove_task(11);

    assert!(api.reregister(11).await.unwrap());
    assert!(task.is_allow_register());
    assert!(api.context().register.contains(11));
    assert!(!api.reregister(404).await.unwrap());
}
