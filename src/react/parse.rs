//! 模型输出解析：从文本中提取 JSON（```json 围栏或裸 JSON），并识别工具调用
//!
//! 解析失败一律降级：工具调用解析不出来就当普通文本回复。

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::core::AgentError;
use crate::memory::ToolCall;

/// 提取文本中的 JSON 片段：优先围栏代码块，其次第一个 `{`/`[` 到最后一个匹配的闭合符
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```") {
        let rest = &trimmed[start + 3..];
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let body = match rest.find("```") {
            Some(end) => &rest[..end],
            None => rest,
        };
        let body = body.trim();
        if body.starts_with('{') || body.starts_with('[') {
            return Some(body);
        }
    }

    let start = trimmed.find(|c| c == '{' || c == '[')?;
    let close = if trimmed[start..].starts_with('{') { '}' } else { ']' };
    let end = trimmed.rfind(close)?;
    if end < start {
        return None;
    }
    Some(&trimmed[start..=end])
}

/// 提取并反序列化
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, AgentError> {
    let json = extract_json(text)
        .ok_or_else(|| AgentError::JsonParseError(format!("no JSON found in: {}", preview(text))))?;
    serde_json::from_str(json)
        .map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, preview(json))))
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}

#[derive(Debug, Deserialize)]
struct RawCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(alias = "name")]
    tool: String,
    #[serde(default, alias = "arguments")]
    args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawReply {
    Batch { tool_calls: Vec<RawCall> },
    Single(RawCall),
}

/// Generator / Reviser 的模型输出
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Text(String),
    ToolCalls(Vec<ToolCall>),
}

/// 识别工具调用；没有 id 的调用分配 `call_{iteration}_{index}`
pub fn parse_model_output(output: &str, iteration: u32) -> ModelOutput {
    let text = output.trim().to_string();
    let Some(json) = extract_json(output) else {
        return ModelOutput::Text(text);
    };
    if !json.starts_with('{') {
        return ModelOutput::Text(text);
    }
    let raw: Vec<RawCall> = match serde_json::from_str::<RawReply>(json) {
        Ok(RawReply::Batch { tool_calls }) => tool_calls,
        Ok(RawReply::Single(call)) => vec![call],
        Err(_) => return ModelOutput::Text(text),
    };
    let calls: Vec<ToolCall> = raw
        .into_iter()
        .filter(|c| !c.tool.trim().is_empty())
        .enumerate()
        .map(|(i, c)| ToolCall {
            id: c
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}_{}", iteration, i)),
            name: c.tool.trim().to_string(),
            args: if c.args.is_null() {
                serde_json::json!({})
            } else {
                c.args
            },
        })
        .collect();
    if calls.is_empty() {
        ModelOutput::Text(text)
    } else {
        ModelOutput::ToolCalls(calls)
    }
}
