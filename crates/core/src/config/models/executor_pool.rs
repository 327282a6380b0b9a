use serde::{Deserialize, Serialize};

/// 执行器池配置
///
/// 上次执行耗时超过 `relegation_threshold`（分钟）的任务会被降级到慢池，
/// 避免拖慢快池中对延迟敏感的任务。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorPoolConfig {
    pub fast_pool_size: usize,
    pub slow_pool_size: usize,
    pub relegation_threshold: f64,
}

impl Default for ExecutorPoolConfig {
    fn default() -> Self {
        Self {
            fast_pool_size: 10,
            slow_pool_size: 4,
            relegation_threshold: 3.0,
        }
    }
}

impl ExecutorPoolConfig {
    /// 降级阈值换算为毫秒
    pub fn relegation_threshold_ms(&self) -> i64 {
        (self.relegation_threshold * 60_000.0) as i64
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fast_pool_size == 0 {
            return Err(anyhow::anyhow!("快池大小必须大于0"));
        }

        if self.slow_pool_size == 0 {
            return Err(anyhow::anyhow!("慢池大小必须大于0"));
        }

        if !self.relegation_threshold.is_finite() || self.relegation_threshold <= 0.0 {
            return Err(anyhow::anyhow!(
                "降级阈值必须是大于0的分钟数: {}",
                self.relegation_threshold
            ));
        }

        Ok(())
    }
}
