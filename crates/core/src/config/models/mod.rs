pub mod app_config;
pub mod database;
pub mod executor_pool;
pub mod logging;
pub mod scheduler;
