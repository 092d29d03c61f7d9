//! Evaluator：入口节点，判定执行策略（plan / fast / end）并提取技能、账号、审批等路由线索
//!
//! 任何解析或模型失败都降级为 fast（reasoning = "fallback"），不会让 run 失败。

use serde::Deserialize;

use crate::core::AgentError;
use crate::memory::Message;
use crate::react::parse::parse_json;
use crate::react::{
    EvaluationMode, EvaluationVerdict, GraphContext, Node, OrchestrationState, StateUpdate,
};

const DEFAULT_PROMPT: &str = "You classify infrastructure and operations tasks before they are executed.\n\
Decide the execution mode:\n\
- \"fast\": a single lookup or read-only question that one or two tool calls can answer.\n\
- \"plan\": multi-step work, or anything that changes resources.\n\
- \"end\": the task is too ambiguous to act on; ask one clarification question.\n\
Reply with ONLY a JSON object:\n\
{\"mode\": \"fast|plan|end\", \"skill_id\": \"<id or null>\", \"account_id\": \"<id or null>\", \
\"requires_approval\": true|false, \"reasoning\": \"...\", \"clarification_question\": \"<only for end>\", \
\"missing_info\": \"<only for end>\"}";

#[derive(Debug, Deserialize)]
struct RawVerdict {
    mode: String,
    #[serde(default)]
    skill_id: Option<String>,
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    requires_approval: bool,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    clarification_question: Option<String>,
    #[serde(default)]
    missing_info: Option<String>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}

/// 把模型文本解析为判定；不可解析时返回 None
pub fn parse_verdict(text: &str) -> Option<EvaluationVerdict> {
    let raw: RawVerdict = parse_json(text).ok()?;
    let mode = EvaluationMode::parse(&raw.mode)?;
    Some(EvaluationVerdict {
        mode,
        skill_id: non_empty(raw.skill_id),
        account_id: non_empty(raw.account_id),
        requires_approval: raw.requires_approval,
        reasoning: raw.reasoning,
        clarification_question: non_empty(raw.clarification_question),
        missing_info: non_empty(raw.missing_info),
    })
}

pub struct Evaluator {
    system_prompt: String,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT)
    }
}

impl Evaluator {
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
        let catalog = ctx.skills.list_summaries().await;
        let system = if catalog.is_empty() {
            self.system_prompt.clone()
        } else {
            format!(
                "{}\n\nAvailable skills:\n{}",
                self.system_prompt,
                catalog.join("\n")
            )
        };
        let messages = vec![
            Message::system(system),
            Message::user(format!("Task: {}", state.task)),
        ];

        let mut verdict = match ctx.call_model(Node::Evaluator, &messages).await {
            Ok(text) => parse_verdict(&text).unwrap_or_else(|| {
                tracing::warn!(run_id = %ctx.run_id, "unparseable verdict, falling back to fast");
                EvaluationVerdict::fallback()
            }),
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(e) => {
                tracing::warn!(run_id = %ctx.run_id, error = %e, "evaluator model call failed, falling back to fast");
                EvaluationVerdict::fallback()
            }
        };

        if let Some(mode) = ctx.overrides.mode {
            verdict.mode = mode.into();
        }
        if let Some(skill) = &ctx.overrides.skill_id {
            verdict.skill_id = Some(skill.clone());
        }
        if let Some(account) = &ctx.overrides.account_id {
            verdict.account_id = Some(account.clone());
        }
        if let Some(id) = verdict.skill_id.clone() {
            if !ctx.skills.contains(&id).await {
                tracing::warn!(run_id = %ctx.run_id, skill = %id, "unknown skill dropped");
                verdict.skill_id = None;
            }
        }
        tracing::info!(
            run_id = %ctx.run_id,
            mode = ?verdict.mode,
            skill = ?verdict.skill_id,
            "task evaluated"
        );
        Ok(StateUpdate::new().evaluation(verdict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verdict() {
        let v = parse_verdict(
            "```json\n{\"mode\": \"PLAN\", \"skill_id\": \"null\", \"account_id\": \"123\", \"requires_approval\": true, \"reasoning\": \"mutates\"}\n```",
        )
        .unwrap();
        assert_eq!(v.mode, EvaluationMode::Plan);
        assert_eq!(v.skill_id, None);
        assert_eq!(v.account_id.as_deref(), Some("123"));
        assert!(v.requires_approval);
    }

    #[test]
    fn test_parse_verdict_rejects_garbage() {
        assert!(parse_verdict("I think fast").is_none());
        assert!(parse_verdict("{\"mode\": \"sometimes\"}").is_none());
    }
}
