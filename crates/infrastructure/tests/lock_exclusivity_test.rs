use std::sync::Arc;

use futures::future::join_all;
use scheduler_domain::TaskLockRepository;
use scheduler_infrastructure::{InMemoryTaskLockRepository, SqliteTaskLockRepository};
use sqlx::sqlite::SqlitePoolOptions;

async fn count_acquired(repositories: Vec<Arc<dyn TaskLockRepository>>, task_id: i64) -> usize {
    let attempts = repositories.iter().map(|repo| repo.lock(task_id));
    join_all(attempts)
        .await
        .into_iter()
        .filter(|result| matches!(result, Ok(true)))
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_in_memory_lock_has_single_winner() {
    let base = InMemoryTaskLockRepository::new("node-0");
    let repositories: Vec<Arc<dyn TaskLockRepository>> = (0..8)
        .map(|i| Arc::new(base.for_node(format!("node-{i}"))) as Arc<dyn TaskLockRepository>)
        .collect();

    assert_eq!(count_acquired(repositories.clone(), 100).await, 1);
    assert_eq!(count_acquired(repositories, 101).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sqlite_lock_has_single_winner() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let first = SqliteTaskLockRepository::new(pool.clone(), "node-0");
    first.run_migrations().await.unwrap();

    let mut repositories: Vec<Arc<dyn TaskLockRepository>> = vec![Arc::new(first)];
    for i in 1..6 {
        repositories.push(Arc::new(SqliteTaskLockRepository::new(
            pool.clone(),
            format!("node-{i}"),
        )));
    }

    assert_eq!(count_acquired(repositories.clone(), 7).await, 1);

    // 释放后下一轮仍然只有一个节点成功
    for repo in &repositories {
        repo.unlock(7).await.unwrap();
    }
    assert_eq!(count_acquired(repositories, 7).await, 1);
}
