use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scheduler_infrastructure::InMemoryTaskLockRepository;
use scheduler_testing_utils::TestEnv;
use serde_json::Value;
use trigger_scheduler::Application;

const MANIFEST: &str = r#"
[[tasks]]
id = 1
task_type = "MEMORY"
alias = "counter"
params = [1, 2]
kind = { kind = "method", method_name = "count" }

[tasks.trigger]
cycle_ms = 50
repeat_times = 2

[[tasks]]
id = 2
task_type = "MEMORY"
alias = "untriggered"
kind = { kind = "method", method_name = "noop" }

[[tasks]]
id = 3
task_type = "MEMORY"
alias = "unknown-method"
kind = { kind = "method", method_name = "missing" }

[tasks.trigger]
cycle_ms = 50
"#;

#[tokio::test]
async fn test_manifest_tasks_run_through_the_application() {
    let app = Application::with_repository(
        TestEnv::fast_config("node-001"),
        Arc::new(InMemoryTaskLockRepository::new("node-001")),
    );

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    app.methods().register_fn("count", move |params: Vec<Value>| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::from(params.len()))
        }
    });

    let mut manifest = tempfile::NamedTempFile::new().unwrap();
    manifest.write_all(MANIFEST.as_bytes()).unwrap();

    assert_eq!(app.load_tasks(manifest.path()).await.unwrap(), 1);
    assert!(app.api().is_exist(1));
    assert!(!app.api().is_exist(2));
    assert!(!app.api().is_exist(3));

    assert_eq!(app.start().await, 1);
    let probe = Arc::clone(&runs);
    assert!(
        TestEnv::wait_for(
            || {
                let probe = Arc::clone(&probe);
                async move { probe.load(Ordering::SeqCst) == 2 }
            },
            Duration::from_secs(3),
        )
        .await
    );
    assert_eq!(app.stop().await, 1);

    let trigger = app.api().get_by_id(1).unwrap().trigger.unwrap();
    assert_eq!(trigger.finished_times, 2);
    assert!(trigger.is_last_success);
}

#[tokio::test]
async fn test_missing_manifest_is_an_error() {
    let app = Application::with_repository(
        TestEnv::fast_config("node-001"),
        Arc::new(InMemoryTaskLockRepository::new("node-001")),
    );
    assert!(app.load_tasks("/definitely/not/here.toml").await.is_err());
}
