//! Reviser：revise 循环风格下，针对上一轮反思的问题做一次修正性的模型调用
//!
//! 与 Generator 共用上下文构建与迭代计数；产出工具调用则进入 TOOLS，否则回到 REFLECT。

use crate::core::AgentError;
use crate::memory::Message;
use crate::react::generator::{build_system, output_message};
use crate::react::{GraphContext, Node, OrchestrationState, StateUpdate};

const DEFAULT_PROMPT: &str = "You fix problems a reviewer found in your previous answer.\n\
Address every open issue. Call tools with ONLY a JSON object {\"tool\": \"<name>\", \"args\": {...}} \
if you need more information; otherwise reply with the corrected final answer as plain text.";

pub struct Reviser {
    system_prompt: String,
}

impl Default for Reviser {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT)
    }
}

impl Reviser {
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

        let mut messages = Vec::with_capacity(state.messages.len() + 2);
        messages.push(Message::system(system));
        messages.extend(state.messages.iter().cloned());
        if let Some(r) = &state.last_reflection {
            let mut brief = format!("Previous review: {}", r.analysis);
            for issue in &r.issues {
                brief.push_str(&format!("\nOpen issue: {}", issue));
            }
            for s in &r.suggestions {
                brief.push_str(&format!("\nSuggestion: {}", s));
            }
            messages.push(Message::user(brief));
        }

        let output = ctx
            .call_model_with_tools(Node::Revise, &messages, iteration)
            .await?;

        let mut update = StateUpdate::new()
            .iteration(iteration)
            .message(output_message(output));
        if let Some(plan) = plan {
            update = update.plan(plan);
        }
        Ok(update)
    }
}
