//! 图驱动循环
//!
//! START → EVALUATOR → … → END：每步执行当前节点、合并其 StateUpdate、再由 route 选出下一个节点。
//! 节点严格顺序执行；两处会让遍历提前停下：
//! - CLARIFY 执行后暂停，等待外部补充信息
//! - 关闭自动审批时，在进入 TOOLS 前挂起，返回带待审批调用的检查点
//!
//! 恢复时从检查点记录的节点继续，已经执行过的节点不会重跑。

use crate::core::AgentError;
use crate::react::evaluator::Evaluator;
use crate::react::generator::Generator;
use crate::react::planner::Planner;
use crate::react::reflector::Reflector;
use crate::react::reviser::Reviser;
use crate::react::terminal::{clarify, finalize, missing_info};
use crate::react::tool_node::run_tools;
use crate::react::{
    route, ApprovalRequest, Checkpoint, Decision, EvaluationVerdict, GraphContext, GraphEvent,
    Node, OrchestrationState, StateUpdate,
};

/// 一次遍历的结局
#[derive(Debug)]
pub enum GraphOutcome {
    /// 到达 END
    Completed(OrchestrationState),
    /// CLARIFY 暂停
    Clarify {
        state: OrchestrationState,
        question: String,
        missing_info: String,
    },
    /// 审批中断，检查点指向 TOOLS
    Interrupted(Checkpoint),
}

impl GraphOutcome {
    /// 遍历结束时的 Evaluator 判定（三种结局都带着状态）
    pub fn evaluation(&self) -> Option<&EvaluationVerdict> {
        let state = match self {
            GraphOutcome::Completed(state) | GraphOutcome::Clarify { state, .. } => state,
            GraphOutcome::Interrupted(checkpoint) => &checkpoint.state,
        };
        state.evaluation.as_ref()
    }
}

/// 节点集合
#[derive(Default)]
pub struct Graph {
    pub evaluator: Evaluator,
    pub planner: Planner,
    pub generator: Generator,
    pub reflector: Reflector,
    pub reviser: Reviser,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 START 开始遍历
    pub async fn run(
        &self,
        ctx: &GraphContext,
        state: OrchestrationState,
    ) -> Result<GraphOutcome, AgentError> {
        self.drive(ctx, state, Node::Start, None).await
    }

    /// 从审批检查点恢复；每个待审批调用必须恰好对应一个决定
    pub async fn resume(
        &self,
        ctx: &GraphContext,
        checkpoint: Checkpoint,
        decisions: Vec<Decision>,
    ) -> Result<GraphOutcome, AgentError> {
        let request = checkpoint.pending_approval.as_ref().ok_or_else(|| {
            AgentError::InvalidResume(format!(
                "checkpoint {} has no pending approval",
                checkpoint.thread_id
            ))
        })?;
        request.validate(&decisions)?;
        if checkpoint.next_node != Node::Tools {
            return Err(AgentError::InvalidResume(format!(
                "checkpoint suspended at {}, expected tools",
                checkpoint.next_node
            )));
        }
        self.drive(ctx, checkpoint.state, checkpoint.next_node, Some(decisions))
            .await
    }

    async fn drive(
        &self,
        ctx: &GraphContext,
        mut state: OrchestrationState,
        mut node: Node,
        mut decisions: Option<Vec<Decision>>,
    ) -> Result<GraphOutcome, AgentError> {
        loop {
            if ctx.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            match node {
                Node::End => return Ok(GraphOutcome::Completed(state)),
                Node::Start => {
                    node = route(node, &state, &ctx.router);
                    continue;
                }
                Node::Tools if ctx.router.interrupt_before_tools && decisions.is_none() => {
                    let request = ApprovalRequest::from_calls(state.pending_tool_calls());
                    tracing::info!(run_id = %ctx.run_id, calls = request.len(), "suspending for tool approval");
                    return Ok(GraphOutcome::Interrupted(Checkpoint::new(
                        ctx.run_id.clone(),
                        Node::Tools,
                        state,
                        Some(request),
                    )));
                }
                _ => {}
            }

            ctx.events.send(GraphEvent::NodeStart { node });
            tracing::debug!(run_id = %ctx.run_id, node = %node, iteration = state.iteration, "node start");

            let update = match node {
                Node::Evaluator => self.evaluator.run(ctx, &state).await?,
                Node::Planner => self.planner.run(ctx, &state).await?,
                Node::Generate => self.generator.run(ctx, &state).await?,
                Node::Tools => {
                    let d = decisions.take();
                    run_tools(ctx, &state, d.as_deref()).await?
                }
                Node::Reflect => self.reflector.run(ctx, &state).await?,
                Node::Revise => self.reviser.run(ctx, &state).await?,
                Node::Clarify => clarify(&state),
                Node::Final => finalize(&state),
                Node::Start | Node::End => StateUpdate::new(),
            };

            let summary = node_summary(node, &update);
            state.apply(update);
            ctx.events.send(GraphEvent::NodeEnd { node, summary });

            if node == Node::Clarify {
                let question = state.clarification.clone().unwrap_or_default();
                let missing = missing_info(&state);
                return Ok(GraphOutcome::Clarify {
                    state,
                    question,
                    missing_info: missing,
                });
            }

            node = route(node, &state, &ctx.router);
        }
    }
}

/// 节点结束事件的简述
fn node_summary(node: Node, update: &StateUpdate) -> String {
    match node {
        Node::Evaluator => update
            .evaluation
            .as_ref()
            .and_then(|v| serde_json::to_string(v).ok())
            .unwrap_or_default(),
        Node::Planner => update
            .plan
            .as_ref()
            .map(|p| {
                p.steps
                    .iter()
                    .enumerate()
                    .map(|(i, s)| format!("{}. {}", i + 1, s.step))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default(),
        Node::Generate | Node::Revise => update
            .messages
            .last()
            .map(|m| {
                if m.has_tool_calls() {
                    let names: Vec<&str> = m.tool_calls.iter().map(|c| c.name.as_str()).collect();
                    format!("tool calls: {}", names.join(", "))
                } else {
                    m.content.clone()
                }
            })
            .unwrap_or_default(),
        Node::Tools => update.tool_results.join("\n"),
        Node::Reflect => update
            .last_reflection
            .as_ref()
            .map(|r| r.analysis.clone())
            .unwrap_or_default(),
        Node::Clarify => update.clarification.clone().unwrap_or_default(),
        Node::Final => update.final_answer.clone().unwrap_or_default(),
        Node::Start | Node::End => String::new(),
    }
}
