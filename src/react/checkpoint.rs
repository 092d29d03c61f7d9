//! 检查点：挂起前把状态与下一个节点整体序列化，恢复时原样读回，不重跑任何节点

use serde::{Deserialize, Serialize};

use crate::react::{ApprovalRequest, Node, OrchestrationState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// 与 run_id 一一对应
    pub thread_id: String,
    /// 恢复后第一个要执行的节点
    pub next_node: Node,
    pub state: OrchestrationState,
    pub pending_approval: Option<ApprovalRequest>,
    /// 毫秒时间戳
    pub created_at: i64,
}

impl Checkpoint {
    pub fn new(
        thread_id: impl Into<String>,
        next_node: Node,
        state: OrchestrationState,
        pending_approval: Option<ApprovalRequest>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            next_node,
            state,
            pending_approval,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
