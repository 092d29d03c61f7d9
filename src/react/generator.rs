//! Generator：绑定工具集的模型调用节点，每次执行迭代计数加一
//!
//! system 上下文由以下几段拼成：
//! - 按模式的权限说明（fast 只读；plan 且需要审批或已有计划时允许变更）
//! - 当前计划步骤（第一个未完成的步骤，并标为 in_progress）
//! - 多账号目标（逗号分隔的账号，每个一行）
//! - 技能能力描述
//! - 可用工具说明与工具调用 JSON Schema

use crate::core::{AgentError, Mode};
use crate::memory::Message;
use crate::react::parse::ModelOutput;
use crate::react::{GraphContext, Node, OrchestrationState, StateUpdate, StepStatus};
use crate::tools::tool_call_schema_json;

const DEFAULT_PROMPT: &str = "You are an operations agent that completes tasks by calling tools.\n\
To call a tool, reply with ONLY a JSON object {\"tool\": \"<name>\", \"args\": {...}} \
or {\"tool_calls\": [{\"tool\": \"<name>\", \"args\": {...}}, ...]}.\n\
When you have enough information, reply with the final answer as plain text (no JSON).";

const READ_ONLY: &str = "Permissions: READ-ONLY. Only inspect and report; never create, modify or delete resources.";
const MUTATION_AUTHORIZED: &str = "Permissions: changes are authorized for this task. \
Mutating tool calls may be reviewed by a human before they run.";

/// 拼装 system 上下文，同时返回需要写回的计划（当前步骤标为 in_progress）
pub(crate) async fn build_system(
    ctx: &GraphContext,
    state: &OrchestrationState,
    base_prompt: &str,
) -> (String, Option<crate::react::Plan>) {
    let mut sections = vec![base_prompt.to_string()];
    let verdict = state.evaluation.as_ref();

    let mutation_authorized = state.mode() == Mode::Plan
        && (verdict.map(|v| v.requires_approval).unwrap_or(false) || state.plan.is_some());
    sections.push(if mutation_authorized {
        MUTATION_AUTHORIZED.to_string()
    } else {
        READ_ONLY.to_string()
    });

    let mut updated_plan = None;
    if let Some(plan) = &state.plan {
        if let Some(i) = plan.active_index() {
            let marked = plan.with_status(i, StepStatus::InProgress);
            sections.push(format!(
                "Current step ({}/{}): {}",
                i + 1,
                plan.len(),
                plan.steps[i].step
            ));
            if marked != *plan {
                updated_plan = Some(marked);
            }
        }
    }

    if let Some(accounts) = verdict.and_then(|v| v.account_id.as_deref()) {
        let targets: Vec<String> = accounts
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("- account {}", s))
            .collect();
        if targets.len() > 1 {
            sections.push(format!(
                "Targets (repeat the work for each):\n{}",
                targets.join("\n")
            ));
        } else if let Some(t) = targets.first() {
            sections.push(format!("Target:\n{}", t));
        }
    }

    let skill = ctx
        .active_skill(verdict.and_then(|v| v.skill_id.as_deref()))
        .await;
    let allowed: Vec<String> = skill
        .as_ref()
        .map(|s| s.allowed_tools().to_vec())
        .unwrap_or_default();
    if let Some(skill) = &skill {
        sections.push(format!("Skill:\n{}", skill.full_capability()));
    }

    sections.push(format!(
        "Available tools:\n{}",
        ctx.tools.registry().to_schema_json(&allowed)
    ));
    sections.push(format!("Tool call format (JSON Schema):\n{}", tool_call_schema_json()));

    (sections.join("\n\n"), updated_plan)
}

/// 把模型输出转成对话消息
pub(crate) fn output_message(output: ModelOutput) -> Message {
    match output {
        ModelOutput::ToolCalls(calls) => Message::assistant_with_tools("", calls),
        ModelOutput::Text(text) => Message::assistant(text),
    }
}

pub struct Generator {
    system_prompt: String,
}

impl Default for Generator {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT)
    }
}

impl Generator {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    pub async fn run(
        &self,
        ctx: &GraphContext,
        state: &OrchestrationState,
    ) -> Result<StateUpdate, AgentError> {
        let iteration = state.iteration + 1;
        let (system, plan) = build_system(ctx, state, &self.system_prompt).await;

        let mut messages = Vec::with_capacity(state.messages.len() + 1);
        messages.push(Message::system(system));
        messages.extend(state.messages.iter().cloned());

        let output = ctx
            .call_model_with_tools(Node::Generate, &messages, iteration)
            .await?;
        if let ModelOutput::ToolCalls(calls) = &output {
            tracing::info!(run_id = %ctx.run_id, iteration, calls = calls.len(), "tool calls requested");
        }

        let mut update = StateUpdate::new()
            .iteration(iteration)
            .message(output_message(output));
        if let Some(plan) = plan {
            update = update.plan(plan);
        }
        Ok(update)
    }
}
