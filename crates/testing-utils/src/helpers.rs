//! Test helper utilities and common testing patterns

use std::future::Future;
use std::time::Duration;

use scheduler_core::AppConfig;
use tokio::time::sleep;

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        Self::wait_for_with_interval(condition, timeout, Duration::from_millis(20)).await
    }

    /// Wait for a condition with a custom poll interval
    pub async fn wait_for_with_interval<F, Fut>(
        mut condition: F,
        timeout: Duration,
        poll_interval: Duration,
    ) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(poll_interval).await;
        }
        condition().await
    }

    /// Configuration with a short poll interval and small pools
    pub fn fast_config(node_id: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config.scheduler.node_id = node_id.to_string();
        config.scheduler.poll_interval_ms = 20;
        config.executor_pool.fast_pool_size = 4;
        config.executor_pool.slow_pool_size = 2;
        config
    }
}
