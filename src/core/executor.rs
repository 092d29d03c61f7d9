//! RunExecutor：单个 run 的完整生命周期
//!
//! submit 持久化 queued 记录；execute / resume 负责：
//! 1. 占用 run（同一 run 的并发调用只有一个能继续），状态迁移到 in_progress 并持久化
//! 2. 分配沙箱、申请凭证会话、构建工具集（任一步失败即 run 失败）
//! 3. 启动事件记录任务，驱动图执行
//! 4. 等记录任务排空后，按结局迁移状态：completed / awaiting_input / failed
//! 5. 无论哪条路径都删除沙箱，并尽力回送结果
//!
//! 未预期错误只在这里被捕获一次：记一条 error 事件，run 置为 failed。
//! 取消不会产生新状态，持久化状态保持为最后一次写入的值。

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::notifier::{Notification, Notifier};
use crate::core::recorder::EventRecorder;
use crate::core::{
    AgentError, Clarification, CredentialProvider, Run, RunResult, RunSandbox, RunStatus,
    RunClaim, RunSupervisor, TaskRequest,
};
use crate::llm::LlmClient;
use crate::react::{
    ApprovalRequest, Checkpoint, Decision, EventSink, Graph, GraphContext, GraphOutcome,
    LoopStyle, OrchestrationState, Overrides, RouterConfig,
};
use crate::skills::SkillLoader;
use crate::store::{CheckpointStore, EventStore, ExecutionEvent, RunStore};
use crate::tools::{ToolExecutor, ToolsetContext, ToolsetProvider};

/// 审批暂停时写入 Clarification 的缺失信息标签
pub const MISSING_TOOL_APPROVAL: &str = "tool_approval";

/// 执行器参数（取自 AppConfig）
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub max_iterations: u32,
    pub loop_style: LoopStyle,
    pub auto_approve: bool,
    pub tool_timeout_secs: u64,
    pub tool_result_max_chars: usize,
    pub event_content_max_chars: usize,
    pub event_retention_days: u32,
    pub sandbox_root: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

impl ExecutorConfig {
    pub fn from_app(cfg: &AppConfig) -> Self {
        Self {
            max_iterations: cfg.agent.max_iterations,
            loop_style: cfg.agent.loop_style,
            auto_approve: cfg.agent.auto_approve,
            tool_timeout_secs: cfg.tools.tool_timeout_secs,
            tool_result_max_chars: cfg.agent.tool_result_max_chars,
            event_content_max_chars: cfg.agent.event_content_max_chars,
            event_retention_days: cfg.storage.event_retention_days,
            sandbox_root: cfg.app.sandbox_root.clone(),
        }
    }
}

/// 执行器依赖：模型与工具绑定显式注入，不使用全局状态
#[derive(Clone)]
pub struct RunDeps {
    pub llm: Arc<dyn LlmClient>,
    pub toolset: Arc<dyn ToolsetProvider>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub skills: Arc<SkillLoader>,
    pub runs: Arc<dyn RunStore>,
    pub events: Arc<dyn EventStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct RunExecutor {
    deps: RunDeps,
    config: ExecutorConfig,
    supervisor: RunSupervisor,
    graph: Graph,
}

impl RunExecutor {
    pub fn new(deps: RunDeps, config: ExecutorConfig) -> Self {
        Self {
            deps,
            config,
            supervisor: RunSupervisor::new(),
            graph: Graph::new(),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// 创建并持久化一个 queued run
    pub async fn submit(&self, request: TaskRequest) -> Result<Run, AgentError> {
        let run = Run::new(request, self.config.auto_approve);
        self.deps.runs.put(&run).await?;
        tracing::info!(
            run_id = %run.run_id,
            tenant_id = %run.tenant_id,
            channel = %run.channel,
            "run queued"
        );
        Ok(run)
    }

    pub async fn get(&self, tenant_id: &str, run_id: &str) -> Result<Run, AgentError> {
        self.deps
            .runs
            .get(tenant_id, run_id)
            .await?
            .ok_or_else(|| AgentError::RunNotFound(run_id.to_string()))
    }

    /// 按时间顺序回放事件日志
    pub async fn events(&self, run_id: &str) -> Result<Vec<ExecutionEvent>, AgentError> {
        self.deps.events.list(run_id).await
    }

    /// 在后台任务中执行
    pub fn spawn(
        self: &Arc<Self>,
        tenant_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> JoinHandle<Result<Run, AgentError>> {
        let this = Arc::clone(self);
        let tenant_id = tenant_id.into();
        let run_id = run_id.into();
        tokio::spawn(async move { this.execute(&tenant_id, &run_id).await })
    }

    /// 执行一个 queued run 直到完成、失败或暂停
    pub async fn execute(&self, tenant_id: &str, run_id: &str) -> Result<Run, AgentError> {
        let claim = self.claim(run_id)?;
        let mut run = self.get(tenant_id, run_id).await?;
        run.start()?;
        self.deps.runs.put(&run).await?;
        tracing::info!(run_id = %run.run_id, "run started");

        let recorder = EventRecorder::new(
            run.run_id.clone(),
            Arc::clone(&self.deps.events),
            self.config.event_content_max_chars,
            self.config.event_retention_days,
        );
        self.drive(run, recorder, &claim, None).await
    }

    /// 以审批决定恢复一个在 TOOLS 前挂起的 run；每个待审批调用必须恰好一个决定
    ///
    /// 决定无效时 run 保持 awaiting_input。澄清暂停没有检查点，不能恢复，需重新提交任务。
    pub async fn resume(
        &self,
        tenant_id: &str,
        run_id: &str,
        decisions: Vec<Decision>,
    ) -> Result<Run, AgentError> {
        let claim = self.claim(run_id)?;
        let mut run = self.get(tenant_id, run_id).await?;
        if run.status != RunStatus::AwaitingInput {
            return Err(AgentError::InvalidTransition {
                from: run.status,
                to: RunStatus::InProgress,
            });
        }
        let checkpoint = self
            .deps
            .checkpoints
            .load(run.thread_id())
            .await?
            .ok_or_else(|| {
                AgentError::InvalidResume(format!("run {} has no checkpoint", run.run_id))
            })?;
        match checkpoint.pending_approval.as_ref() {
            Some(request) => request.validate(&decisions)?,
            None => {
                return Err(AgentError::InvalidResume(format!(
                    "run {} is not waiting for tool approval",
                    run.run_id
                )))
            }
        }

        run.resume()?;
        self.deps.runs.put(&run).await?;
        tracing::info!(run_id = %run.run_id, decisions = decisions.len(), "run resumed");

        let recorder = EventRecorder::new(
            run.run_id.clone(),
            Arc::clone(&self.deps.events),
            self.config.event_content_max_chars,
            self.config.event_retention_days,
        )
        .continue_from()
        .await;
        self.drive(run, recorder, &claim, Some((checkpoint, decisions)))
            .await
    }

    /// 请求停止正在执行的 run；返回该 run 是否在执行
    pub fn cancel(&self, run_id: &str) -> bool {
        self.supervisor.cancel(run_id)
    }

    pub fn is_running(&self, run_id: &str) -> bool {
        self.supervisor.is_active(run_id)
    }

    /// 停止所有正在执行的 run
    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }

    /// 执行中的 run 被再次 execute / resume 时拒绝
    fn claim(&self, run_id: &str) -> Result<RunClaim<'_>, AgentError> {
        self.supervisor.claim(run_id).ok_or_else(|| {
            tracing::warn!(run_id = %run_id, "run is already executing");
            AgentError::InvalidTransition {
                from: RunStatus::InProgress,
                to: RunStatus::InProgress,
            }
        })
    }

    async fn drive(
        &self,
        run: Run,
        recorder: EventRecorder,
        claim: &RunClaim<'_>,
        resume: Option<(Checkpoint, Vec<Decision>)>,
    ) -> Result<Run, AgentError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let record_task = recorder.spawn(rx);

        let outcome = self
            .run_in_sandbox(&run, EventSink::new(tx), claim.token(), resume)
            .await;

        // 发送端已随 GraphContext 释放，等记录任务写完剩余事件
        let recorder = match record_task.await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(run_id = %run.run_id, "event recorder task failed: {}", e);
                EventRecorder::new(
                    run.run_id.clone(),
                    Arc::clone(&self.deps.events),
                    self.config.event_content_max_chars,
                    self.config.event_retention_days,
                )
                .continue_from()
                .await
            }
        };
        self.finish(run, outcome, recorder).await
    }

    /// 沙箱在这里创建，并在返回前删除（暂停也删除，恢复时重新分配）
    async fn run_in_sandbox(
        &self,
        run: &Run,
        events: EventSink,
        cancel: CancellationToken,
        resume: Option<(Checkpoint, Vec<Decision>)>,
    ) -> Result<GraphOutcome, AgentError> {
        let mut sandbox =
            RunSandbox::create(self.config.sandbox_root.as_deref(), &run.run_id).await?;
        let outcome = self
            .run_graph(run, &sandbox, events, cancel, resume)
            .await;
        if let Err(e) = sandbox.close().await {
            tracing::warn!(run_id = %run.run_id, "{}", e);
        }
        outcome
    }

    async fn run_graph(
        &self,
        run: &Run,
        sandbox: &RunSandbox,
        events: EventSink,
        cancel: CancellationToken,
        resume: Option<(Checkpoint, Vec<Decision>)>,
    ) -> Result<GraphOutcome, AgentError> {
        let credentials = self.deps.credentials.session_for(run).await?;
        let registry = self
            .deps
            .toolset
            .build(ToolsetContext {
                run,
                sandbox: sandbox.path(),
                credentials: &credentials,
            })
            .await?;
        tracing::debug!(run_id = %run.run_id, tools = ?registry.tool_names(), "toolset ready");

        let ctx = GraphContext {
            run_id: run.run_id.clone(),
            llm: Arc::clone(&self.deps.llm),
            tools: Arc::new(
                ToolExecutor::new(registry, self.config.tool_timeout_secs).for_run(&run.run_id),
            ),
            skills: Arc::clone(&self.deps.skills),
            events,
            cancel,
            router: RouterConfig {
                max_iterations: self.config.max_iterations,
                loop_style: self.config.loop_style,
                interrupt_before_tools: !run.auto_approve,
            },
            overrides: Overrides {
                mode: run.mode,
                skill_id: run.skill_id.clone(),
                account_id: run.account_id.clone(),
            },
            tool_result_max_chars: self.config.tool_result_max_chars,
        };

        match resume {
            None => self.graph.run(&ctx, OrchestrationState::new(&run.task)).await,
            Some((checkpoint, decisions)) => self.graph.resume(&ctx, checkpoint, decisions).await,
        }
    }

    async fn finish(
        &self,
        mut run: Run,
        outcome: Result<GraphOutcome, AgentError>,
        mut recorder: EventRecorder,
    ) -> Result<Run, AgentError> {
        let outcome = match outcome {
            Ok(GraphOutcome::Interrupted(checkpoint)) => {
                match self.deps.checkpoints.save(&checkpoint).await {
                    Ok(()) => Ok(GraphOutcome::Interrupted(checkpoint)),
                    Err(e) => Err(e),
                }
            }
            other => other,
        };
        if let Some(verdict) = outcome.as_ref().ok().and_then(GraphOutcome::evaluation) {
            run.record_evaluation(verdict);
        }

        let transition = match outcome {
            Ok(GraphOutcome::Completed(state)) => {
                self.discard_checkpoint(&run).await;
                let result = RunResult {
                    summary: state.summary(),
                    tools_used: recorder.tools_used().clone(),
                    iterations: state.iteration,
                };
                tracing::info!(
                    run_id = %run.run_id,
                    iterations = result.iterations,
                    tools = result.tools_used.len(),
                    "run completed"
                );
                run.complete(result)
            }
            Ok(GraphOutcome::Clarify {
                question,
                missing_info,
                ..
            }) => {
                self.discard_checkpoint(&run).await;
                tracing::info!(run_id = %run.run_id, missing = %missing_info, "run awaiting clarification");
                run.await_input(
                    Clarification {
                        question,
                        missing_info,
                    },
                    None,
                )
            }
            Ok(GraphOutcome::Interrupted(checkpoint)) => {
                let request = checkpoint.pending_approval.unwrap_or_else(|| {
                    ApprovalRequest::from_calls(checkpoint.state.pending_tool_calls())
                });
                tracing::info!(run_id = %run.run_id, calls = request.len(), "run awaiting tool approval");
                run.await_input(
                    Clarification {
                        question: request.describe(),
                        missing_info: MISSING_TOOL_APPROVAL.to_string(),
                    },
                    Some(request),
                )
            }
            Err(AgentError::Cancelled) => {
                tracing::info!(run_id = %run.run_id, status = run.status.as_str(), "run cancelled");
                return Err(AgentError::Cancelled);
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(run_id = %run.run_id, "run failed: {}", message);
                recorder.record_error("executor", &message).await;
                self.discard_checkpoint(&run).await;
                run.fail(message)
            }
        };
        transition?;

        self.deps.runs.put(&run).await?;
        self.notify(&run).await;
        Ok(run)
    }

    async fn discard_checkpoint(&self, run: &Run) {
        if let Err(e) = self.deps.checkpoints.delete(run.thread_id()).await {
            tracing::warn!(run_id = %run.run_id, "checkpoint not deleted: {}", e);
        }
    }

    async fn notify(&self, run: &Run) {
        if let Err(e) = self.deps.notifier.notify(Notification::for_run(run)).await {
            tracing::warn!(run_id = %run.run_id, "notification failed: {}", e);
        }
    }
}
