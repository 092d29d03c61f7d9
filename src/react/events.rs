//! 图执行过程事件：节点开始/结束、模型调用开始/结束、工具开始/结束
//!
//! 节点通过无界通道发送，RunExecutor 的记录任务逐条翻译成事件日志；发送失败直接忽略。

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::memory::ToolCall;
use crate::react::Node;

/// 单条过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    NodeStart {
        node: Node,
    },
    NodeEnd {
        node: Node,
        /// 节点产出的简述（计划、反思、最终答案等）
        summary: String,
    },
    ModelStart {
        node: Node,
        model: String,
    },
    ModelEnd {
        node: Node,
        model: String,
        text: String,
        tool_calls: Vec<ToolCall>,
        prompt_tokens: u64,
        completion_tokens: u64,
    },
    ToolStart {
        node: Node,
        call_id: String,
        tool: String,
        args: serde_json::Value,
    },
    ToolEnd {
        node: Node,
        call_id: String,
        tool: String,
        output: String,
        ok: bool,
    },
}

impl GraphEvent {
    pub fn node(&self) -> Node {
        match self {
            GraphEvent::NodeStart { node }
            | GraphEvent::NodeEnd { node, .. }
            | GraphEvent::ModelStart { node, .. }
            | GraphEvent::ModelEnd { node, .. }
            | GraphEvent::ToolStart { node, .. }
            | GraphEvent::ToolEnd { node, .. } => *node,
        }
    }
}

/// 事件出口；None 表示不记录
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<GraphEvent>>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<GraphEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, ev: GraphEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ev);
        }
    }
}
