//! Reflector：审视当前进展，决定是否完成，必要时整体改写计划
//!
//! - plan 模式：要求结构化 JSON {analysis, issues, suggestions, is_complete, plan?}；解析失败视为未完成
//! - fast 模式：回复 COMPLETE 表示完成，否则整段文本作为批评，追加为新的指令消息
//! - 迭代达到上限时无论模型如何判断都视为完成

use serde::Deserialize;

use crate::core::{AgentError, Mode};
use crate::memory::Message;
use crate::react::parse::parse_json;
use crate::react::{
    GraphContext, Node, OrchestrationState, Plan, Reflection, StateUpdate, StepStatus,
};

/// fast 模式的完成标记
pub const COMPLETE_SENTINEL: &str = "COMPLETE";

const PLAN_PROMPT: &str = "You review an agent's progress on a planned task.\n\
Reply with ONLY a JSON object: {\"analysis\": \"...\", \"issues\": [\"...\"], \"suggestions\": [\"...\"], \
\"is_complete\": true|false, \"plan\": [\"optional full replacement plan\"]}.\n\
Set is_complete to true only when every step is done and the answer is ready. \
Include \"plan\" only if the remaining work needs a different plan.";

const FAST_PROMPT: &str = "You review an agent's answer to a task.\n\
If the task is fully answered, reply with exactly COMPLETE.\n\
Otherwise reply with a short critique telling the agent what is missing or wrong.";

/// 工具结果在反思上下文中最多带几条
const RECENT_RESULTS: usize = 5;

#[derive(Debug, Deserialize)]
struct RawReflection {
    #[serde(default)]
    analysis: String,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    is_complete: bool,
    #[serde(default)]
    plan: Option<Vec<String>>,
}

/// fast 模式判断是否为完成标记
pub fn is_complete_sentinel(text: &str) -> bool {
    text.trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .eq_ignore_ascii_case(COMPLETE_SENTINEL)
}

fn progress_context(state: &OrchestrationState) -> String {
    let mut out = format!("Task: {}\n", state.task);
    if let Some(plan) = &state.plan {
        out.push_str("Plan:\n");
        for (i, s) in plan.steps.iter().enumerate() {
            out.push_str(&format!("{}. [{:?}] {}\n", i + 1, s.status, s.step));
        }
    }
    let skip = state.tool_results.len().saturating_sub(RECENT_RESULTS);
    if skip < state.tool_results.len() {
        out.push_str("Recent tool results:\n");
        for r in &state.tool_results[skip..] {
            out.push_str(r);
            out.push('\n');
        }
    }
    if let Some(answer) = state.last_assistant_text() {
        out.push_str(&format!("Latest answer:\n{}\n", answer));
    }
    out.push_str(&format!("Iteration: {}", state.iteration));
    out
}

pub struct Reflector {
    plan_prompt: String,
    fast_prompt: String,
}

impl Default for Reflector {
    fn default() -> Self {
        Self {
            plan_prompt: PLAN_PROMPT.to_string(),
            fast_prompt: FAST_PROMPT.to_string(),
        }
    }
}

impl Reflector {
    pub fn new(plan_prompt: impl Into<String>, fast_prompt: impl Into<String>) -> Self {
        Self {
            plan_prompt: plan_prompt.into(),
            fast_prompt: fast_prompt.into(),
        }
    }

    pub async fn run(
        &self,
        ctx: &GraphContext,
        state: &OrchestrationState,
    ) -> Result<StateUpdate, AgentError> {
        let at_ceiling = state.iteration >= ctx.router.max_iterations;
        let mode = state.mode();
        let prompt = match mode {
            Mode::Plan => &self.plan_prompt,
            Mode::Fast => &self.fast_prompt,
        };
        let messages = vec![
            Message::system(prompt.clone()),
            Message::user(progress_context(state)),
        ];
        let text = ctx.call_model(Node::Reflect, &messages).await?;

        let mut update = match mode {
            Mode::Plan => reflect_plan(state, &text),
            Mode::Fast => reflect_fast(&text),
        };
        if at_ceiling {
            tracing::info!(run_id = %ctx.run_id, iteration = state.iteration, "iteration ceiling reached, forcing completion");
            update = update.complete(true);
        }
        Ok(update)
    }
}

fn reflect_plan(state: &OrchestrationState, text: &str) -> StateUpdate {
    let raw = match parse_json::<RawReflection>(text) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "reflection parse failed, treating as incomplete");
            return StateUpdate::new()
                .complete(false)
                .reflection(Reflection {
                    analysis: text.trim().to_string(),
                    ..Default::default()
                });
        }
    };

    let reflection = Reflection {
        analysis: raw.analysis,
        issues: raw.issues,
        suggestions: raw.suggestions,
        is_complete: raw.is_complete,
    };
    let mut update = StateUpdate::new().complete(reflection.is_complete);

    if let Some(steps) = raw.plan.filter(|s| !s.is_empty()) {
        update = update.plan(Plan::from_steps(steps));
    } else if !reflection.is_complete && reflection.issues.is_empty() {
        // 没有问题则当前步骤视为完成，推进到下一步
        if let Some(plan) = &state.plan {
            if let Some(i) = plan.active_index() {
                update = update.plan(plan.with_status(i, StepStatus::Completed));
            }
        }
    }

    if !reflection.is_complete {
        let mut feedback = String::from("Reflection feedback:");
        for issue in &reflection.issues {
            feedback.push_str(&format!("\n- issue: {}", issue));
        }
        for s in &reflection.suggestions {
            feedback.push_str(&format!("\n- suggestion: {}", s));
        }
        if reflection.issues.is_empty() && reflection.suggestions.is_empty() {
            feedback.push_str("\n- continue with the next step");
        }
        update = update.message(Message::user(feedback));
    }
    update.reflection(reflection)
}

fn reflect_fast(text: &str) -> StateUpdate {
    if is_complete_sentinel(text) {
        return StateUpdate::new().complete(true).reflection(Reflection {
            analysis: COMPLETE_SENTINEL.to_string(),
            is_complete: true,
            ..Default::default()
        });
    }
    let critique = text.trim().to_string();
    StateUpdate::new()
        .complete(false)
        .message(Message::user(format!("Reviewer feedback: {}", critique)))
        .reflection(Reflection {
            analysis: critique.clone(),
            issues: vec![critique],
            ..Default::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel() {
        assert!(is_complete_sentinel("COMPLETE"));
        assert!(is_complete_sentinel("  complete. "));
        assert!(!is_complete_sentinel("Not complete: missing region"));
    }

    #[test]
    fn test_fast_critique_appends_instruction() {
        let u = reflect_fast("You forgot the eu-west-1 buckets");
        assert_eq!(u.is_complete, Some(false));
        assert_eq!(u.messages.len(), 1);
        assert!(u.messages[0].content.contains("eu-west-1"));
    }

    #[test]
    fn test_plan_parse_failure_is_incomplete() {
        let s = OrchestrationState::new("t");
        let u = reflect_plan(&s, "looks fine to me");
        assert_eq!(u.is_complete, Some(false));
        assert!(u.plan.is_none());
    }

    #[test]
    fn test_plan_replacement_and_progress() {
        let mut s = OrchestrationState::new("t");
        s.apply(StateUpdate::new().plan(Plan::from_steps(["a", "b"])));

        let u = reflect_plan(&s, r#"{"analysis": "ok", "is_complete": false, "plan": ["x", "y", "z"]}"#);
        assert_eq!(u.plan.as_ref().unwrap().len(), 3);

        let u = reflect_plan(&s, r#"{"analysis": "step a done", "issues": [], "is_complete": false}"#);
        assert_eq!(u.plan.as_ref().unwrap().steps[0].status, StepStatus::Completed);

        let u = reflect_plan(&s, r#"{"analysis": "done", "is_complete": true}"#);
        assert_eq!(u.is_complete, Some(true));
        assert!(u.messages.is_empty());
    }
}
