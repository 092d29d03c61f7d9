//! 编排状态：贯穿每个节点的类型化记录
//!
//! 节点只返回 StateUpdate（部分更新），由 OrchestrationState::apply 统一合并：
//! - messages / tool_results 追加
//! - plan / clarification / last_reflection 有值即整体替换
//! - iteration 取最新值，但不会变小
//! - evaluation 第一次非空后保持不变
//! - is_complete 以最后一次写入为准

use serde::{Deserialize, Serialize};

use crate::core::Mode;
use crate::memory::{Message, Role, ToolCall};

/// Planner 未产出可用计划时的兜底步骤
pub const CATCH_ALL_STEP: &str = "Analyze and respond to the request";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step: String,
    pub status: StepStatus,
}

impl PlanStep {
    pub fn pending(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Pending,
        }
    }
}

/// 有序步骤列表，只会整体替换
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// 由步骤文本构造；空文本被丢弃，全部为空时退化为兜底步骤
    pub fn from_steps<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let steps: Vec<PlanStep> = steps
            .into_iter()
            .map(Into::into)
            .map(|s: String| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PlanStep::pending)
            .collect();
        if steps.is_empty() {
            Self::catch_all()
        } else {
            Self { steps }
        }
    }

    pub fn catch_all() -> Self {
        Self {
            steps: vec![PlanStep::pending(CATCH_ALL_STEP)],
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 第一个未完成的步骤
    pub fn active_index(&self) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.status != StepStatus::Completed)
    }

    pub fn with_status(&self, index: usize, status: StepStatus) -> Self {
        let mut plan = self.clone();
        if let Some(step) = plan.steps.get_mut(index) {
            step.status = status;
        }
        plan
    }

    pub fn all_completed(&self) -> Self {
        Self {
            steps: self
                .steps
                .iter()
                .map(|s| PlanStep {
                    step: s.step.clone(),
                    status: StepStatus::Completed,
                })
                .collect(),
        }
    }
}

/// Evaluator 判定的执行策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    Plan,
    Fast,
    /// 任务含糊，需要澄清
    End,
}

impl EvaluationMode {
    /// 大小写不敏感；clarify 视为 end
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plan" => Some(EvaluationMode::Plan),
            "fast" => Some(EvaluationMode::Fast),
            "end" | "clarify" => Some(EvaluationMode::End),
            _ => None,
        }
    }

    /// 对应的 Run 执行模式；End 没有
    pub fn as_mode(&self) -> Option<Mode> {
        match self {
            EvaluationMode::Plan => Some(Mode::Plan),
            EvaluationMode::Fast => Some(Mode::Fast),
            EvaluationMode::End => None,
        }
    }
}

impl From<Mode> for EvaluationMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Plan => EvaluationMode::Plan,
            Mode::Fast => EvaluationMode::Fast,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationVerdict {
    pub mode: EvaluationMode,
    pub skill_id: Option<String>,
    pub account_id: Option<String>,
    pub requires_approval: bool,
    pub reasoning: String,
    pub clarification_question: Option<String>,
    pub missing_info: Option<String>,
}

impl EvaluationVerdict {
    /// 解析或调用失败时的兜底判定
    pub fn fallback() -> Self {
        Self {
            mode: EvaluationMode::Fast,
            skill_id: None,
            account_id: None,
            requires_approval: false,
            reasoning: "fallback".to_string(),
            clarification_question: None,
            missing_info: None,
        }
    }
}

/// Reflector 的结构化反馈
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reflection {
    pub analysis: String,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub is_complete: bool,
}

/// 节点返回的部分更新
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub messages: Vec<Message>,
    pub plan: Option<Plan>,
    pub tool_results: Vec<String>,
    pub iteration: Option<u32>,
    pub evaluation: Option<EvaluationVerdict>,
    pub is_complete: Option<bool>,
    pub clarification: Option<String>,
    pub last_reflection: Option<Reflection>,
    pub final_answer: Option<String>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, m: Message) -> Self {
        self.messages.push(m);
        self
    }

    pub fn plan(mut self, plan: Plan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn tool_result(mut self, text: impl Into<String>) -> Self {
        self.tool_results.push(text.into());
        self
    }

    pub fn iteration(mut self, n: u32) -> Self {
        self.iteration = Some(n);
        self
    }

    pub fn evaluation(mut self, v: EvaluationVerdict) -> Self {
        self.evaluation = Some(v);
        self
    }

    pub fn complete(mut self, done: bool) -> Self {
        self.is_complete = Some(done);
        self
    }

    pub fn clarification(mut self, q: impl Into<String>) -> Self {
        self.clarification = Some(q.into());
        self
    }

    pub fn reflection(mut self, r: Reflection) -> Self {
        self.last_reflection = Some(r);
        self
    }

    pub fn final_answer(mut self, a: impl Into<String>) -> Self {
        self.final_answer = Some(a.into());
        self
    }
}

/// 单个 run 的编排状态（可序列化为检查点）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationState {
    pub task: String,
    pub messages: Vec<Message>,
    pub plan: Option<Plan>,
    pub tool_results: Vec<String>,
    pub iteration: u32,
    pub evaluation: Option<EvaluationVerdict>,
    pub is_complete: bool,
    pub clarification: Option<String>,
    pub last_reflection: Option<Reflection>,
    pub final_answer: Option<String>,
}

impl OrchestrationState {
    pub fn new(task: impl Into<String>) -> Self {
        let task = task.into();
        Self {
            messages: vec![Message::user(task.clone())],
            task,
            ..Default::default()
        }
    }

    /// 合并节点返回的部分更新
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        if let Some(plan) = update.plan {
            self.plan = Some(plan);
        }
        self.tool_results.extend(update.tool_results);
        if let Some(n) = update.iteration {
            self.iteration = self.iteration.max(n);
        }
        if self.evaluation.is_none() {
            self.evaluation = update.evaluation;
        }
        if let Some(done) = update.is_complete {
            self.is_complete = done;
        }
        if let Some(q) = update.clarification {
            self.clarification = Some(q);
        }
        if let Some(r) = update.last_reflection {
            self.last_reflection = Some(r);
        }
        if let Some(a) = update.final_answer {
            self.final_answer = Some(a);
        }
    }

    /// 生效的执行模式；未评估或 end 时按 fast 处理
    pub fn mode(&self) -> Mode {
        match self.evaluation.as_ref().map(|v| v.mode) {
            Some(EvaluationMode::Plan) => Mode::Plan,
            _ => Mode::Fast,
        }
    }

    /// 最近一条 assistant 消息中尚未执行的工具调用
    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        match self.messages.last() {
            Some(m) if m.role == Role::Assistant => &m.tool_calls,
            _ => &[],
        }
    }

    pub fn has_pending_tool_calls(&self) -> bool {
        !self.pending_tool_calls().is_empty()
    }

    /// 最后一条不含工具调用的 assistant 文本
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.has_tool_calls() && !m.content.trim().is_empty())
            .map(|m| m.content.as_str())
    }

    /// 结果摘要：FINAL 记录的答案 > 最后的 assistant 文本 > 最后一条工具结果
    pub fn summary(&self) -> String {
        if let Some(a) = &self.final_answer {
            return a.clone();
        }
        compose_answer(self)
    }
}

/// 由当前状态推导最终答案（FINAL 节点与执行器共用）
pub fn compose_answer(state: &OrchestrationState) -> String {
    state
        .last_assistant_text()
        .map(str::to_string)
        .or_else(|| state.tool_results.last().cloned())
        .unwrap_or_else(|| "No result produced.".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(mode: EvaluationMode) -> EvaluationVerdict {
        EvaluationVerdict {
            mode,
            ..EvaluationVerdict::fallback()
        }
    }

    #[test]
    fn test_apply_merge_rules() {
        let mut s = OrchestrationState::new("task");
        s.apply(
            StateUpdate::new()
                .evaluation(verdict(EvaluationMode::Plan))
                .plan(Plan::from_steps(["a", "b"]))
                .iteration(3)
                .tool_result("r1"),
        );
        s.apply(
            StateUpdate::new()
                .evaluation(verdict(EvaluationMode::Fast))
                .iteration(2)
                .tool_result("r2")
                .message(Message::assistant("hi")),
        );

        assert_eq!(s.evaluation.as_ref().unwrap().mode, EvaluationMode::Plan);
        assert_eq!(s.iteration, 3);
        assert_eq!(s.tool_results, vec!["r1", "r2"]);
        assert_eq!(s.messages.len(), 2);
        assert_eq!(s.plan.as_ref().unwrap().len(), 2);

        s.apply(StateUpdate::new().plan(Plan::from_steps(["only"])));
        assert_eq!(s.plan.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_is_complete_last_write_wins() {
        let mut s = OrchestrationState::new("t");
        s.apply(StateUpdate::new().complete(true));
        s.apply(StateUpdate::new().complete(false));
        assert!(!s.is_complete);
        s.apply(StateUpdate::new());
        assert!(!s.is_complete);
    }

    #[test]
    fn test_plan_never_empty() {
        let p = Plan::from_steps(Vec::<String>::new());
        assert_eq!(p.len(), 1);
        assert_eq!(p.steps[0].step, CATCH_ALL_STEP);
        let p = Plan::from_steps(["  ", ""]);
        assert_eq!(p.steps[0].step, CATCH_ALL_STEP);
    }

    #[test]
    fn test_active_step() {
        let p = Plan::from_steps(["a", "b"]).with_status(0, StepStatus::Completed);
        assert_eq!(p.active_index(), Some(1));
        assert_eq!(p.all_completed().active_index(), None);
    }

    #[test]
    fn test_pending_tool_calls_only_on_last_assistant() {
        let call = ToolCall {
            id: "c1".to_string(),
            name: "echo".to_string(),
            args: serde_json::json!({}),
        };
        let mut s = OrchestrationState::new("t");
        s.apply(StateUpdate::new().message(Message::assistant_with_tools("", vec![call.clone()])));
        assert_eq!(s.pending_tool_calls().len(), 1);
        s.apply(StateUpdate::new().message(Message::tool(&call, "ok")));
        assert!(!s.has_pending_tool_calls());
    }

    #[test]
    fn test_summary_fallbacks() {
        let mut s = OrchestrationState::new("t");
        assert_eq!(s.summary(), "No result produced.");
        s.apply(StateUpdate::new().tool_result("[echo] hi"));
        assert_eq!(s.summary(), "[echo] hi");
        s.apply(StateUpdate::new().message(Message::assistant("final words")));
        assert_eq!(s.summary(), "final words");
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(EvaluationMode::parse("PLAN"), Some(EvaluationMode::Plan));
        assert_eq!(EvaluationMode::parse("clarify"), Some(EvaluationMode::End));
        assert_eq!(EvaluationMode::parse("other"), None);
    }
}
