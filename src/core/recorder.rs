//! 事件记录：把图执行过程事件（GraphEvent）逐条翻译成执行事件并追加到 EventStore
//!
//! 每个 run 一个记录器，运行在独立任务里顺序消费通道，因此事件日志顺序与发生顺序一致。
//! 写入失败只记 warn，不影响主流程。
//! 排序键 = (毫秒时间戳, 序号)：时间戳被钳制为单调不减，序号在整个 run 内递增，恢复时接着已有事件继续编号。

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::react::tool_node::truncate_chars;
use crate::react::{GraphEvent, Node};
use crate::store::{parse_sort_key, sort_key, EventStore, EventType, ExecutionEvent};

const SECS_PER_DAY: i64 = 86_400;

pub struct EventRecorder {
    run_id: String,
    store: Arc<dyn EventStore>,
    content_max_chars: usize,
    retention_days: u32,
    seq: u64,
    last_ts: i64,
    tools_used: BTreeSet<String>,
}

impl EventRecorder {
    pub fn new(
        run_id: impl Into<String>,
        store: Arc<dyn EventStore>,
        content_max_chars: usize,
        retention_days: u32,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            store,
            content_max_chars,
            retention_days,
            seq: 0,
            last_ts: 0,
            tools_used: BTreeSet::new(),
        }
    }

    /// 接着该 run 已有的事件继续记录（恢复执行时使用）：序号、时间戳下限与已用工具都从日志重建
    pub async fn continue_from(mut self) -> Self {
        match self.store.list(&self.run_id).await {
            Ok(existing) => {
                // 以已用过的最大序号为准：此前的追加可能失败过，条数会少于序号
                self.seq = existing
                    .iter()
                    .filter_map(|e| parse_sort_key(&e.sort_key))
                    .map(|(_, seq)| seq + 1)
                    .max()
                    .unwrap_or(existing.len() as u64);
                self.last_ts = existing.iter().map(|e| e.timestamp).max().unwrap_or(0);
                self.tools_used.extend(
                    existing
                        .iter()
                        .filter(|e| e.event_type == EventType::ToolCall)
                        .filter_map(|e| e.tool_name.clone()),
                );
            }
            Err(e) => {
                tracing::warn!(run_id = %self.run_id, "failed to read prior events: {}", e);
            }
        }
        self
    }

    /// 在独立任务中消费通道；发送端全部关闭后返回记录器本身
    pub fn spawn(mut self, mut rx: UnboundedReceiver<GraphEvent>) -> JoinHandle<Self> {
        tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                self.record(ev).await;
            }
            self
        })
    }

    /// 出现过 tool_start 的工具名（集合，只增不减）
    pub fn tools_used(&self) -> &BTreeSet<String> {
        &self.tools_used
    }

    pub async fn record(&mut self, ev: GraphEvent) {
        if let GraphEvent::ToolStart { tool, .. } = &ev {
            self.tools_used.insert(tool.clone());
        }
        let entry = self.translate(ev);
        self.append(entry).await;
    }

    /// 执行器边界捕获的错误，记一条 error 事件
    pub async fn record_error(&mut self, node: &str, message: &str) {
        let entry = Entry {
            event_type: EventType::Error,
            node: node.to_string(),
            content: message.to_string(),
            tool_name: None,
            tool_args: None,
            tool_output: None,
            metadata: Map::new(),
        };
        self.append(entry).await;
    }

    fn translate(&self, ev: GraphEvent) -> Entry {
        let node = ev.node();
        let mut metadata = Map::new();
        match ev {
            GraphEvent::NodeStart { node } => Entry::plain(
                node_event_type(node, false),
                node,
                format!("{} started", node),
                metadata,
            ),
            GraphEvent::NodeEnd { node, summary } => {
                let content = if summary.is_empty() {
                    format!("{} finished", node)
                } else {
                    summary
                };
                Entry::plain(node_event_type(node, true), node, content, metadata)
            }
            GraphEvent::ModelStart { model, .. } => {
                metadata.insert("model".to_string(), json!(model));
                Entry::plain(
                    node_event_type(node, false),
                    node,
                    format!("model call: {}", model),
                    metadata,
                )
            }
            GraphEvent::ModelEnd {
                model,
                text,
                tool_calls,
                prompt_tokens,
                completion_tokens,
                ..
            } => {
                metadata.insert("model".to_string(), json!(model));
                metadata.insert("prompt_tokens".to_string(), json!(prompt_tokens));
                metadata.insert("completion_tokens".to_string(), json!(completion_tokens));
                let content = if tool_calls.is_empty() {
                    text
                } else {
                    metadata.insert("tool_calls".to_string(), json!(tool_calls.len()));
                    let names: Vec<&str> = tool_calls.iter().map(|c| c.name.as_str()).collect();
                    format!("tool calls: {}", names.join(", "))
                };
                Entry::plain(node_event_type(node, true), node, content, metadata)
            }
            GraphEvent::ToolStart {
                call_id, tool, args, ..
            } => {
                metadata.insert("call_id".to_string(), json!(call_id));
                Entry {
                    event_type: EventType::ToolCall,
                    node: node.as_str().to_string(),
                    content: format!("calling {}", tool),
                    tool_name: Some(tool),
                    tool_args: Some(args),
                    tool_output: None,
                    metadata,
                }
            }
            GraphEvent::ToolEnd {
                call_id,
                tool,
                output,
                ok,
                ..
            } => {
                metadata.insert("call_id".to_string(), json!(call_id));
                metadata.insert("ok".to_string(), json!(ok));
                Entry {
                    event_type: EventType::ToolResult,
                    node: node.as_str().to_string(),
                    content: format!("{} finished", tool),
                    tool_name: Some(tool),
                    tool_args: None,
                    tool_output: Some(output),
                    metadata,
                }
            }
        }
    }

    async fn append(&mut self, entry: Entry) {
        let now = chrono::Utc::now();
        let ts = now.timestamp_millis().max(self.last_ts);
        self.last_ts = ts;
        let seq = self.seq;
        self.seq += 1;

        let max = self.content_max_chars;
        let event = ExecutionEvent {
            run_id: self.run_id.clone(),
            sort_key: sort_key(ts, seq),
            timestamp: ts,
            event_type: entry.event_type,
            node: entry.node,
            content: truncate_chars(&entry.content, max),
            tool_name: entry.tool_name,
            tool_args: entry.tool_args.map(|v| cap_value(v, max)),
            tool_output: entry.tool_output.map(|o| truncate_chars(&o, max)),
            metadata: entry.metadata,
            expire_at: now.timestamp() + i64::from(self.retention_days) * SECS_PER_DAY,
        };
        if let Err(e) = self.store.append(&event).await {
            tracing::warn!(run_id = %self.run_id, sort_key = %event.sort_key, "event not recorded: {}", e);
        }
    }
}

struct Entry {
    event_type: EventType,
    node: String,
    content: String,
    tool_name: Option<String>,
    tool_args: Option<Value>,
    tool_output: Option<String>,
    metadata: Map<String, Value>,
}

impl Entry {
    fn plain(event_type: EventType, node: Node, content: String, metadata: Map<String, Value>) -> Self {
        Self {
            event_type,
            node: node.as_str().to_string(),
            content,
            tool_name: None,
            tool_args: None,
            tool_output: None,
            metadata,
        }
    }
}

/// 节点到事件类型；TOOLS 节点的开始记为 tool_call，结束记为 tool_result
fn node_event_type(node: Node, end: bool) -> EventType {
    match node {
        Node::Evaluator | Node::Planner => EventType::Planning,
        Node::Tools if end => EventType::ToolResult,
        Node::Tools => EventType::ToolCall,
        Node::Reflect => EventType::Reflection,
        Node::Revise => EventType::Revision,
        Node::Final => EventType::Final,
        Node::Start | Node::Generate | Node::Clarify | Node::End => EventType::Execution,
    }
}

/// 序列化后超长的参数替换为截断后的字符串
fn cap_value(v: Value, max: usize) -> Value {
    let text = v.to_string();
    if text.chars().count() <= max {
        v
    } else {
        Value::String(truncate_chars(&text, max))
    }
}
