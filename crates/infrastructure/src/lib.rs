//! 持久化协作方实现
//!
//! - [`SqliteTaskLockRepository`]: 基于 sqlx/SQLite 的任务锁与触发器行存储
//! - [`InMemoryTaskLockRepository`]: 进程内存储，多个实例可共享同一份数据模拟集群节点

pub mod database;
pub mod error_handling;
pub mod in_memory_lock_store;

pub use database::sqlite::SqliteTaskLockRepository;
pub use in_memory_lock_store::{InMemoryLockStore, InMemoryTaskLockRepository, LockEntry};
