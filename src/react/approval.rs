//! 工具审批中断：关闭自动审批时，驱动循环在进入 TOOLS 前挂起并给出待审批的调用列表
//!
//! 恢复时必须对每个待审批调用给出且仅给出一个决定（按顺序对应）。

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::memory::ToolCall;

/// 单个调用允许的决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Approve,
    Edit,
    Reject,
}

/// 待审批的工具调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingToolCall {
    pub call_id: String,
    pub tool: String,
    pub args: serde_json::Value,
    pub allowed_decisions: Vec<DecisionKind>,
}

/// 审批请求：有序的待审批调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub calls: Vec<PendingToolCall>,
}

impl ApprovalRequest {
    pub fn from_calls(calls: &[ToolCall]) -> Self {
        Self {
            calls: calls
                .iter()
                .map(|c| PendingToolCall {
                    call_id: c.id.clone(),
                    tool: c.name.clone(),
                    args: c.args.clone(),
                    allowed_decisions: vec![
                        DecisionKind::Approve,
                        DecisionKind::Edit,
                        DecisionKind::Reject,
                    ],
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// 展示给人看的一段描述（用作 clarification question）
    pub fn describe(&self) -> String {
        let lines: Vec<String> = self
            .calls
            .iter()
            .map(|c| format!("- {} {}", c.tool, c.args))
            .collect();
        format!("Approve the following tool calls?\n{}", lines.join("\n"))
    }

    /// 校验决定数量与类型
    pub fn validate(&self, decisions: &[Decision]) -> Result<(), AgentError> {
        if decisions.len() != self.calls.len() {
            return Err(AgentError::InvalidResume(format!(
                "expected {} decisions, got {}",
                self.calls.len(),
                decisions.len()
            )));
        }
        for (call, d) in self.calls.iter().zip(decisions) {
            if !call.allowed_decisions.contains(&d.kind()) {
                return Err(AgentError::InvalidResume(format!(
                    "decision {:?} not allowed for {}",
                    d.kind(),
                    call.tool
                )));
            }
        }
        Ok(())
    }
}

/// 审批决定；edit 携带替换参数的原始文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Edit { args: String },
    Reject,
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::Approve => DecisionKind::Approve,
            Decision::Edit { .. } => DecisionKind::Edit,
            Decision::Reject => DecisionKind::Reject,
        }
    }

    /// 解析 edit 参数；不是合法 JSON 对象时为空对象
    pub fn edited_args(args: &str) -> serde_json::Value {
        match serde_json::from_str::<serde_json::Value>(args) {
            Ok(v @ serde_json::Value::Object(_)) => v,
            _ => serde_json::json!({}),
        }
    }
}
