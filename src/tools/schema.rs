//! 工具调用 JSON Schema 生成（schemars）
//!
//! 注入 Generator 的 system prompt，约束模型按 `{"tool": ..., "args": {...}}` 或
//! `{"tool_calls": [...]}` 回复工具调用。

use schemars::{schema_for, JsonSchema};

/// 单个工具调用
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，必须是 Available tools 中列出的名称
    tool: String,
    /// 工具参数对象，结构见对应工具的 parameters
    args: serde_json::Map<String, serde_json::Value>,
}

/// 一次回复中请求多个工具
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallBatch {
    tool_calls: Vec<ToolCallFormat>,
}

/// 两种合法格式任选其一
#[allow(dead_code)]
#[derive(JsonSchema)]
#[serde(untagged)]
enum ToolCallReply {
    Single(ToolCallFormat),
    Batch(ToolCallBatch),
}

/// 返回工具调用的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallReply);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
