//! Run：一次任务执行的持久化记录
//!
//! 只有 RunExecutor 会修改 Run，且只能经由状态迁移方法（start / complete / fail / await_input / resume）
//! 与 record_evaluation（写回 Evaluator 判定的模式、技能、账号）。
//! 迁移规则：queued → in_progress → {completed | failed | awaiting_input}，awaiting_input → in_progress（恢复）。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::{AgentError, TriggerMetadata};
use crate::react::{ApprovalRequest, EvaluationVerdict};

pub type RunId = String;

/// 执行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// 多步、先规划
    Plan,
    /// 单轮 ReAct
    Fast,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Plan => "plan",
            Mode::Fast => "fast",
        }
    }
}

/// Run 生命周期状态（同一时刻只有一个）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    AwaitingInput,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::AwaitingInput => "awaiting_input",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(RunStatus::Queued),
            "in_progress" => Some(RunStatus::InProgress),
            "awaiting_input" => Some(RunStatus::AwaitingInput),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn can_transition_to(&self, to: RunStatus) -> bool {
        matches!(
            (self, to),
            (RunStatus::Queued, RunStatus::InProgress)
                | (RunStatus::InProgress, RunStatus::Completed)
                | (RunStatus::InProgress, RunStatus::Failed)
                | (RunStatus::InProgress, RunStatus::AwaitingInput)
                | (RunStatus::AwaitingInput, RunStatus::InProgress)
        )
    }
}

/// 成功结果：摘要、使用过的工具（集合语义）、迭代次数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub summary: String,
    pub tools_used: BTreeSet<String>,
    pub iterations: u32,
}

/// 暂停时需要外部补充的信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clarification {
    pub question: String,
    /// 缺失信息的标签（如 account_id、tool_approval）
    pub missing_info: String,
}

/// 任务提交请求（由触发适配器构造）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub tenant_id: String,
    pub task: String,
    pub trigger: TriggerMetadata,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub skill_id: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    /// 覆盖配置中的 auto_approve
    #[serde(default)]
    pub auto_approve: Option<bool>,
}

impl TaskRequest {
    pub fn new(tenant_id: impl Into<String>, task: impl Into<String>, trigger: TriggerMetadata) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            task: task.into(),
            trigger,
            mode: None,
            skill_id: None,
            account_id: None,
            auto_approve: None,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_skill(mut self, skill_id: impl Into<String>) -> Self {
        self.skill_id = Some(skill_id.into());
        self
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = Some(auto_approve);
        self
    }
}

/// 一次任务执行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub tenant_id: String,
    /// 来源渠道标签（二级索引）
    pub channel: String,
    pub trigger: TriggerMetadata,
    pub task: String,
    pub mode: Option<Mode>,
    pub skill_id: Option<String>,
    pub account_id: Option<String>,
    pub auto_approve: bool,
    pub status: RunStatus,
    /// 毫秒时间戳
    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
    pub result: Option<RunResult>,
    pub error: Option<String>,
    pub clarification: Option<Clarification>,
    pub pending_approval: Option<ApprovalRequest>,
}

impl Run {
    pub fn new(request: TaskRequest, default_auto_approve: bool) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            run_id: format!("run_{}", uuid::Uuid::new_v4()),
            tenant_id: request.tenant_id,
            channel: request.trigger.channel().to_string(),
            trigger: request.trigger,
            task: request.task,
            mode: request.mode,
            skill_id: request.skill_id,
            account_id: request.account_id,
            auto_approve: request.auto_approve.unwrap_or(default_auto_approve),
            status: RunStatus::Queued,
            created_at: now,
            updated_at: now,
            completed_at: None,
            result: None,
            error: None,
            clarification: None,
            pending_approval: None,
        }
    }

    /// 检查点 / 会话标识，与 run_id 一一对应
    pub fn thread_id(&self) -> &str {
        &self.run_id
    }

    /// 写回判定结果；判定里没有的项保留提交时的值
    pub fn record_evaluation(&mut self, verdict: &EvaluationVerdict) {
        if let Some(mode) = verdict.mode.as_mode() {
            self.mode = Some(mode);
        }
        if verdict.skill_id.is_some() {
            self.skill_id = verdict.skill_id.clone();
        }
        if verdict.account_id.is_some() {
            self.account_id = verdict.account_id.clone();
        }
    }

    /// 运行耗时（毫秒）；未结束时按当前时间计算
    pub fn duration_ms(&self) -> i64 {
        let end = self
            .completed_at
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        (end - self.created_at).max(0)
    }

    fn transition(&mut self, to: RunStatus) -> Result<(), AgentError> {
        if !self.status.can_transition_to(to) {
            return Err(AgentError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = chrono::Utc::now().timestamp_millis();
        Ok(())
    }

    /// queued → in_progress
    pub fn start(&mut self) -> Result<(), AgentError> {
        if self.status != RunStatus::Queued {
            return Err(AgentError::InvalidTransition {
                from: self.status,
                to: RunStatus::InProgress,
            });
        }
        self.transition(RunStatus::InProgress)
    }

    /// awaiting_input → in_progress
    pub fn resume(&mut self) -> Result<(), AgentError> {
        if self.status != RunStatus::AwaitingInput {
            return Err(AgentError::InvalidTransition {
                from: self.status,
                to: RunStatus::InProgress,
            });
        }
        self.transition(RunStatus::InProgress)?;
        self.clarification = None;
        self.pending_approval = None;
        Ok(())
    }

    pub fn complete(&mut self, result: RunResult) -> Result<(), AgentError> {
        self.transition(RunStatus::Completed)?;
        self.result = Some(result);
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), AgentError> {
        self.transition(RunStatus::Failed)?;
        self.error = Some(error.into());
        self.completed_at = Some(self.updated_at);
        Ok(())
    }

    pub fn await_input(
        &mut self,
        clarification: Clarification,
        approval: Option<ApprovalRequest>,
    ) -> Result<(), AgentError> {
        self.transition(RunStatus::AwaitingInput)?;
        self.clarification = Some(clarification);
        self.pending_approval = approval;
        Ok(())
    }
}
