//! 场景测试共用：可计数的假工具、记录沙箱路径的工具集、按任务分发回复的模型、内存存储装配

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use nucleus::core::{
    AgentError, ExecutorConfig, LogNotifier, NoCredentials, Run, RunDeps, RunExecutor,
};
use nucleus::llm::{Completion, LlmClient, ScriptedLlmClient};
use nucleus::memory::Message;
use nucleus::skills::SkillLoader;
use nucleus::store::{InMemoryCheckpointStore, InMemoryEventStore, InMemoryRunStore, RunStore};
use nucleus::tools::{Tool, ToolRegistry, ToolsetContext, ToolsetProvider};

/// 固定回复并记录调用次数的工具
pub struct FakeTool {
    name: String,
    reply: String,
    pub calls: Arc<AtomicUsize>,
}

impl FakeTool {
    pub fn new(name: &str, reply: &str) -> Self {
        Self {
            name: name.to_string(),
            reply: reply.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Tool for FakeTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "test tool"
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// 开始执行后通知测试，然后一直阻塞
pub struct BlockingTool {
    pub started: Arc<Notify>,
}

#[async_trait]
impl Tool for BlockingTool {
    fn name(&self) -> &str {
        "wait_forever"
    }

    fn description(&self) -> &str {
        "blocks until cancelled"
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        self.started.notify_one();
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok("unreachable".to_string())
    }
}

/// 记录沙箱路径的工具集；fail 为 true 时构建失败
#[derive(Default)]
pub struct RecordingToolset {
    pub tools: Vec<Arc<dyn Tool>>,
    pub fail: bool,
    pub sandboxes: Mutex<Vec<PathBuf>>,
}

impl RecordingToolset {
    pub fn with_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            tools,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sandboxes(&self) -> Vec<PathBuf> {
        self.sandboxes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolsetProvider for RecordingToolset {
    async fn build(&self, ctx: ToolsetContext<'_>) -> Result<ToolRegistry, AgentError> {
        assert!(ctx.sandbox.is_dir(), "sandbox must exist before the toolset is built");
        self.sandboxes.lock().unwrap().push(ctx.sandbox.to_path_buf());
        if self.fail {
            return Err(AgentError::ToolExecutionFailed("toolset unavailable".to_string()));
        }
        let mut registry = ToolRegistry::new();
        for t in &self.tools {
            registry.register_arc(Arc::clone(t));
        }
        Ok(registry)
    }
}

/// 每次读写前让出一次调度，模拟数据库驱动的 await 点
pub struct YieldingRunStore(pub Arc<InMemoryRunStore>);

#[async_trait]
impl RunStore for YieldingRunStore {
    async fn put(&self, run: &Run) -> Result<(), AgentError> {
        tokio::task::yield_now().await;
        self.0.put(run).await
    }

    async fn get(&self, tenant_id: &str, run_id: &str) -> Result<Option<Run>, AgentError> {
        tokio::task::yield_now().await;
        self.0.get(tenant_id, run_id).await
    }

    async fn list_by_channel(&self, channel: &str, limit: usize) -> Result<Vec<Run>, AgentError> {
        self.0.list_by_channel(channel, limit).await
    }
}

/// 按消息中出现的任务标记分发回复；每次调用固定计 10 个 prompt token、1 个 completion token
#[derive(Default)]
pub struct TaskRoutedLlm {
    scripts: Mutex<HashMap<String, VecDeque<String>>>,
}

impl TaskRoutedLlm {
    pub fn script(&self, marker: &str, replies: &[&str]) {
        self.scripts.lock().unwrap().insert(
            marker.to_string(),
            replies.iter().map(|r| r.to_string()).collect(),
        );
    }
}

#[async_trait]
impl LlmClient for TaskRoutedLlm {
    fn model_name(&self) -> &str {
        "routed"
    }

    async fn complete(&self, messages: &[Message]) -> Result<Completion, String> {
        tokio::task::yield_now().await;
        let mut scripts = self.scripts.lock().map_err(|e| e.to_string())?;
        let marker = scripts
            .keys()
            .find(|k| messages.iter().any(|m| m.content.contains(k.as_str())))
            .cloned()
            .ok_or_else(|| "no script for these messages".to_string())?;
        let text = scripts
            .get_mut(&marker)
            .and_then(|q| q.pop_front())
            .ok_or_else(|| format!("script for {} exhausted", marker))?;
        Ok(Completion {
            text,
            prompt_tokens: 10,
            completion_tokens: 1,
        })
    }
}

pub struct Harness<L = ScriptedLlmClient> {
    pub executor: Arc<RunExecutor>,
    pub llm: Arc<L>,
    pub runs: Arc<InMemoryRunStore>,
    pub events: Arc<InMemoryEventStore>,
    pub checkpoints: Arc<InMemoryCheckpointStore>,
    pub toolset: Arc<RecordingToolset>,
    pub sandbox_root: tempfile::TempDir,
}

pub fn harness(replies: &[&str], toolset: RecordingToolset) -> Harness {
    harness_with(replies, toolset, |_| {})
}

pub fn harness_with(
    replies: &[&str],
    toolset: RecordingToolset,
    tweak: impl FnOnce(&mut ExecutorConfig),
) -> Harness {
    let llm = Arc::new(ScriptedLlmClient::with_replies(replies.iter().copied()));
    harness_with_llm(llm, toolset, tweak)
}

pub fn harness_with_llm<L: LlmClient + 'static>(
    llm: Arc<L>,
    toolset: RecordingToolset,
    tweak: impl FnOnce(&mut ExecutorConfig),
) -> Harness<L> {
    let runs = Arc::new(InMemoryRunStore::new());
    let events = Arc::new(InMemoryEventStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());
    let toolset = Arc::new(toolset);
    let sandbox_root = tempfile::tempdir().unwrap();

    let mut config = ExecutorConfig {
        sandbox_root: Some(sandbox_root.path().to_path_buf()),
        ..ExecutorConfig::default()
    };
    tweak(&mut config);

    let deps = RunDeps {
        llm: llm.clone(),
        toolset: toolset.clone(),
        credentials: Arc::new(NoCredentials),
        skills: Arc::new(SkillLoader::empty()),
        runs: Arc::new(YieldingRunStore(runs.clone())),
        events: events.clone(),
        checkpoints: checkpoints.clone(),
        notifier: Arc::new(LogNotifier),
    };
    Harness {
        executor: Arc::new(RunExecutor::new(deps, config)),
        llm,
        runs,
        events,
        checkpoints,
        toolset,
        sandbox_root,
    }
}
