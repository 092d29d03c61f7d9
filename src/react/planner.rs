//! Planner：把复杂任务拆成有序步骤
//!
//! 接受 JSON 数组或 {"steps": [...]}（围栏或裸 JSON）；解析失败或为空时退化为单个兜底步骤，计划永不为空。

use serde::Deserialize;

use crate::core::AgentError;
use crate::memory::Message;
use crate::react::parse::parse_json;
use crate::react::{GraphContext, Node, OrchestrationState, Plan, StateUpdate};

const DEFAULT_PROMPT: &str = "You break a task into a short ordered list of concrete steps \
(at most 8). Each step should be achievable with the available tools. \
Reply with ONLY a JSON array of step strings, e.g. [\"step one\", \"step two\"].";

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPlan {
    List(Vec<RawStep>),
    Wrapped { steps: Vec<RawStep> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStep {
    Text(String),
    Object { step: String },
}

impl RawStep {
    fn into_text(self) -> String {
        match self {
            RawStep::Text(s) | RawStep::Object { step: s } => s,
        }
    }
}

/// 解析计划文本；失败时返回兜底计划
pub fn parse_plan(text: &str) -> Plan {
    match parse_json::<RawPlan>(text) {
        Ok(RawPlan::List(steps)) | Ok(RawPlan::Wrapped { steps }) => {
            Plan::from_steps(steps.into_iter().map(RawStep::into_text))
        }
        Err(e) => {
            tracing::warn!(error = %e, "plan parse failed, using catch-all step");
            Plan::catch_all()
        }
    }
}

pub struct Planner {
    system_prompt: String,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT)
    }
}

impl Planner {
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
        let mut user = format!("Task: {}", state.task);
        if let Some(v) = &state.evaluation {
            if !v.reasoning.is_empty() {
                user.push_str(&format!("\nAssessment: {}", v.reasoning));
            }
            if let Some(account) = &v.account_id {
                user.push_str(&format!("\nTarget account(s): {}", account));
            }
        }
        let messages = vec![Message::system(self.system_prompt.clone()), Message::user(user)];
        let text = ctx.call_model(Node::Planner, &messages).await?;
        let plan = parse_plan(&text);
        tracing::info!(run_id = %ctx.run_id, steps = plan.len(), "plan created");
        Ok(StateUpdate::new().plan(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::CATCH_ALL_STEP;

    #[test]
    fn test_parse_array_and_wrapped() {
        assert_eq!(parse_plan("[\"a\", \"b\"]").len(), 2);
        assert_eq!(parse_plan("```json\n{\"steps\": [\"a\"]}\n```").len(), 1);
        assert_eq!(
            parse_plan("[{\"step\": \"x\"}, {\"step\": \"y\"}]").steps[1].step,
            "y"
        );
    }

    #[test]
    fn test_malformed_plan_is_single_catch_all() {
        for bad in ["[not json", "", "[]", "{\"steps\": []}", "just prose"] {
            let plan = parse_plan(bad);
            assert_eq!(plan.len(), 1, "input {:?}", bad);
            assert_eq!(plan.steps[0].step, CATCH_ALL_STEP);
        }
    }
}
