//! Tool Invoker：执行最近一条 assistant 消息中的工具调用
//!
//! 不会返回工具错误：失败、超时、越权都变成结果文本。每条结果截断后写入对话与累计结果。
//! 审批恢复时按顺序应用决定：reject 写入固定的取消结果，edit 用替换参数执行。

use crate::core::AgentError;
use crate::memory::{Message, ToolCall};
use crate::react::{Decision, GraphContext, GraphEvent, Node, OrchestrationState, StateUpdate};

pub const CANCELLED_BY_USER: &str = "Tool call cancelled by user";

/// 按字符截断到 max 个字符
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}

pub async fn run_tools(
    ctx: &GraphContext,
    state: &OrchestrationState,
    decisions: Option<&[Decision]>,
) -> Result<StateUpdate, AgentError> {
    let calls: Vec<ToolCall> = state.pending_tool_calls().to_vec();
    let skill = ctx
        .active_skill(state.evaluation.as_ref().and_then(|v| v.skill_id.as_deref()))
        .await;
    let allowed: Vec<String> = skill
        .as_ref()
        .map(|s| s.allowed_tools().to_vec())
        .unwrap_or_default();

    let mut update = StateUpdate::new();
    for (i, call) in calls.into_iter().enumerate() {
        let decision = decisions.and_then(|d| d.get(i));

        let (output, invoked_ok) = match decision {
            Some(Decision::Reject) => {
                tracing::info!(run_id = %ctx.run_id, tool = %call.name, "tool call rejected");
                (CANCELLED_BY_USER.to_string(), false)
            }
            _ if !allowed.is_empty() && !allowed.contains(&call.name) => {
                tracing::warn!(run_id = %ctx.run_id, tool = %call.name, "tool outside skill toolset");
                (
                    format!("Error: tool '{}' is not available for this skill", call.name),
                    false,
                )
            }
            _ => {
                let args = match decision {
                    Some(Decision::Edit { args }) => Decision::edited_args(args),
                    _ => call.args.clone(),
                };
                ctx.events.send(GraphEvent::ToolStart {
                    node: Node::Tools,
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    args: args.clone(),
                });
                let result = tokio::select! {
                    _ = ctx.cancel.cancelled() => return Err(AgentError::Cancelled),
                    r = ctx.tools.execute(&call.name, args) => r,
                };
                match result {
                    Ok(out) => (out, true),
                    Err(e) => (format!("Error: {}", e), false),
                }
            }
        };

        let output = truncate_chars(&output, ctx.tool_result_max_chars);
        ctx.events.send(GraphEvent::ToolEnd {
            node: Node::Tools,
            call_id: call.id.clone(),
            tool: call.name.clone(),
            output: output.clone(),
            ok: invoked_ok,
        });
        update = update
            .tool_result(format!("[{}] {}", call.name, output))
            .message(Message::tool(&call, output));
    }
    Ok(update)
}
