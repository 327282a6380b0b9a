use serde::{Deserialize, Serialize};

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// 集群内唯一的节点ID，作为分布式锁的持有者标识
    pub node_id: String,
    /// 轮询周期（毫秒）
    pub poll_interval_ms: u64,
    /// 触发时间落在该窗口（毫秒）内的任务会被放入注册器
    pub near_window_ms: i64,
}

/// 默认以主机名作为节点ID，取不到主机名时退回 `node-001`
fn default_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "node-001".to_string())
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            poll_interval_ms: 1000,
            near_window_ms: 5000,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node_id.trim().is_empty() {
            return Err(anyhow::anyhow!("节点ID不能为空"));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("轮询周期必须大于0"));
        }

        if self.near_window_ms < 0 {
            return Err(anyhow::anyhow!("注册窗口不能为负数"));
        }

        Ok(())
    }
}

/// 任务容器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerConfig {
    pub max_capacity: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
        }
    }
}

impl ContainerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_capacity == 0 {
            return Err(anyhow::anyhow!("任务容器容量必须大于0"));
        }
        Ok(())
    }
}
