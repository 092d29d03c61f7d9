//! 持久化层：Run 记录、执行事件日志、检查点
//!
//! 键设计：
//! - Run：主键 (tenant_id, run_id)；二级访问路径 (channel, created_at 降序)
//! - 事件：主键 (run_id, sort_key)，sort_key = "{毫秒时间戳:013}#{序号:010}"，字典序即时间序
//! - 检查点：按 thread_id（= run_id）
//!
//! 默认使用内存实现；启用 `async-sqlite` feature 后可用 sqlx SQLite 实现。

pub mod memory;
#[cfg(feature = "async-sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{AgentError, Run};
use crate::react::Checkpoint;

pub use memory::{InMemoryCheckpointStore, InMemoryEventStore, InMemoryRunStore};
#[cfg(feature = "async-sqlite")]
pub use sqlite::SqliteStore;

/// 事件粗分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Planning,
    Execution,
    ToolCall,
    ToolResult,
    Reflection,
    Revision,
    Final,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Planning => "planning",
            EventType::Execution => "execution",
            EventType::ToolCall => "tool_call",
            EventType::ToolResult => "tool_result",
            EventType::Reflection => "reflection",
            EventType::Revision => "revision",
            EventType::Final => "final",
            EventType::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "planning" => Some(EventType::Planning),
            "execution" => Some(EventType::Execution),
            "tool_call" => Some(EventType::ToolCall),
            "tool_result" => Some(EventType::ToolResult),
            "reflection" => Some(EventType::Reflection),
            "revision" => Some(EventType::Revision),
            "final" => Some(EventType::Final),
            "error" => Some(EventType::Error),
            _ => None,
        }
    }
}

/// 事件排序键
pub fn sort_key(timestamp_ms: i64, seq: u64) -> String {
    format!("{:013}#{:010}", timestamp_ms.max(0), seq)
}

/// 拆出排序键中的 (时间戳, 序号)
pub fn parse_sort_key(key: &str) -> Option<(i64, u64)> {
    let (ts, seq) = key.split_once('#')?;
    Some((ts.parse().ok()?, seq.parse().ok()?))
}

/// 执行事件（只追加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub run_id: String,
    pub sort_key: String,
    /// 毫秒时间戳
    pub timestamp: i64,
    pub event_type: EventType,
    pub node: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// 存储 TTL（unix 秒）
    pub expire_at: i64,
}

/// Run 记录存储
#[async_trait]
pub trait RunStore: Send + Sync {
    /// 插入或整体覆盖
    async fn put(&self, run: &Run) -> Result<(), AgentError>;

    async fn get(&self, tenant_id: &str, run_id: &str) -> Result<Option<Run>, AgentError>;

    /// 按渠道列出，创建时间降序
    async fn list_by_channel(&self, channel: &str, limit: usize) -> Result<Vec<Run>, AgentError>;
}

/// 事件日志存储
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: &ExecutionEvent) -> Result<(), AgentError>;

    /// 按 sort_key 升序回放
    async fn list(&self, run_id: &str) -> Result<Vec<ExecutionEvent>, AgentError>;
}

/// 检查点存储
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), AgentError>;

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, AgentError>;

    async fn delete(&self, thread_id: &str) -> Result<(), AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_orders_lexicographically() {
        let a = sort_key(1_700_000_000_000, 9);
        let b = sort_key(1_700_000_000_000, 10);
        let c = sort_key(1_700_000_000_001, 0);
        assert!(a < b && b < c);
        assert_eq!(a, "1700000000000#0000000009");
    }

    #[test]
    fn test_event_type_round_trip() {
        for t in [
            EventType::Planning,
            EventType::Execution,
            EventType::ToolCall,
            EventType::ToolResult,
            EventType::Reflection,
            EventType::Revision,
            EventType::Final,
            EventType::Error,
        ] {
            assert_eq!(EventType::parse(t.as_str()), Some(t));
        }
    }
}
