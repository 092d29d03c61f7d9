//! 终止节点：CLARIFY（挂起等待外部输入）与 FINAL（确定性收尾，不调用模型）

use crate::react::state::compose_answer;
use crate::react::{OrchestrationState, StateUpdate};

pub const DEFAULT_CLARIFICATION: &str = "Could you clarify what you would like me to do?";

/// CLARIFY：记录澄清问题，遍历在此暂停
pub fn clarify(state: &OrchestrationState) -> StateUpdate {
    let question = state
        .evaluation
        .as_ref()
        .and_then(|v| v.clarification_question.clone())
        .unwrap_or_else(|| DEFAULT_CLARIFICATION.to_string());
    StateUpdate::new().clarification(question)
}

/// 缺失信息标签
pub fn missing_info(state: &OrchestrationState) -> String {
    state
        .evaluation
        .as_ref()
        .and_then(|v| v.missing_info.clone())
        .unwrap_or_else(|| "task_details".to_string())
}

/// FINAL：把剩余步骤标为完成并记录最终答案
pub fn finalize(state: &OrchestrationState) -> StateUpdate {
    let mut update = StateUpdate::new()
        .complete(true)
        .final_answer(compose_answer(state));
    if let Some(plan) = &state.plan {
        update = update.plan(plan.all_completed());
    }
    update
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;
    use crate::react::{EvaluationMode, EvaluationVerdict, Plan, StepStatus};

    #[test]
    fn test_finalize_completes_plan() {
        let mut s = OrchestrationState::new("t");
        s.apply(
            StateUpdate::new()
                .plan(Plan::from_steps(["a", "b"]))
                .message(Message::assistant("all done")),
        );
        s.apply(finalize(&s));
        assert!(s.is_complete);
        assert_eq!(s.final_answer.as_deref(), Some("all done"));
        assert!(s
            .plan
            .unwrap()
            .steps
            .iter()
            .all(|st| st.status == StepStatus::Completed));
    }

    #[test]
    fn test_clarify_uses_verdict_question() {
        let mut s = OrchestrationState::new("do the thing");
        s.apply(StateUpdate::new().evaluation(EvaluationVerdict {
            mode: EvaluationMode::End,
            clarification_question: Some("Which account?".to_string()),
            missing_info: Some("account_id".to_string()),
            ..EvaluationVerdict::fallback()
        }));
        s.apply(clarify(&s));
        assert_eq!(s.clarification.as_deref(), Some("Which account?"));
        assert_eq!(missing_info(&s), "account_id");
    }
}
