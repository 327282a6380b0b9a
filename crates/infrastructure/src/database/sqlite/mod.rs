mod sqlite_task_lock_repository;

pub use sqlite_task_lock_repository::SqliteTaskLockRepository;
