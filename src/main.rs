//! Nucleus - 运维智能体编排引擎
//!
//! 入口：`nucleus <task...>`。初始化日志与配置，执行任务；关闭自动审批时在终端逐个审批工具调用，
//! 结束后打印事件日志与结果。

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use nucleus::config::{load_config, AppConfig, StorageBackend};
use nucleus::core::{
    EnvCredentialProvider, ExecutorConfig, LogNotifier, RunDeps, RunExecutor, RunStatus,
    TaskRequest, TriggerMetadata,
};
use nucleus::llm::create_llm_from_config;
use nucleus::observability;
use nucleus::react::{ApprovalRequest, Decision};
use nucleus::skills::SkillLoader;
use nucleus::store::{
    CheckpointStore, EventStore, InMemoryCheckpointStore, InMemoryEventStore, InMemoryRunStore,
    RunStore,
};
use nucleus::tools::SandboxToolset;

type Stores = (
    Arc<dyn RunStore>,
    Arc<dyn EventStore>,
    Arc<dyn CheckpointStore>,
);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let task = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if task.trim().is_empty() {
        anyhow::bail!("usage: nucleus <task...>");
    }

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let skills = Arc::new(SkillLoader::new(&cfg.skills.dir));
    if let Err(e) = skills.load_all().await {
        tracing::warn!("Skill loading failed: {:#}", e);
    }

    let (runs, events, checkpoints) = build_stores(&cfg).await?;
    let llm = create_llm_from_config(&cfg);
    let deps = RunDeps {
        llm: Arc::clone(&llm),
        toolset: Arc::new(SandboxToolset),
        credentials: Arc::new(EnvCredentialProvider::default()),
        skills,
        runs,
        events,
        checkpoints,
        notifier: Arc::new(LogNotifier),
    };
    let executor = Arc::new(RunExecutor::new(deps, ExecutorConfig::from_app(&cfg)));

    {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received, stopping runs");
                executor.shutdown();
            }
        });
    }

    let submitted = executor
        .submit(TaskRequest::new("local", task, TriggerMetadata::api("cli")))
        .await?;
    let mut run = executor
        .execute(&submitted.tenant_id, &submitted.run_id)
        .await
        .context("Run execution failed")?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let Some(request) = run.pending_approval.clone() {
        let decisions = ask_decisions(&request, &mut stdin).await?;
        run = executor
            .resume(&run.tenant_id, &run.run_id, decisions)
            .await
            .context("Run resume failed")?;
    }

    for ev in executor.events(&run.run_id).await? {
        let first_line = ev.content.lines().next().unwrap_or("");
        println!(
            "{} {:<11} {:<9} {}",
            ev.sort_key,
            ev.event_type.as_str(),
            ev.node,
            first_line
        );
    }

    println!();
    match run.status {
        RunStatus::Completed => {
            if let Some(result) = &run.result {
                println!("{}", result.summary);
                println!(
                    "\n[{} iterations, tools: {}]",
                    result.iterations,
                    result.tools_used.iter().cloned().collect::<Vec<_>>().join(", ")
                );
            }
        }
        RunStatus::Failed => println!("failed: {}", run.error.as_deref().unwrap_or("")),
        RunStatus::AwaitingInput => {
            if let Some(c) = &run.clarification {
                println!("needs input ({}): {}", c.missing_info, c.question);
            }
        }
        RunStatus::Queued | RunStatus::InProgress => println!("status: {}", run.status.as_str()),
    }

    let (prompt_tokens, completion_tokens, total_tokens) = llm.token_usage();
    tracing::info!(prompt_tokens, completion_tokens, total_tokens, "token usage");
    Ok(())
}

async fn build_stores(cfg: &AppConfig) -> anyhow::Result<Stores> {
    match cfg.storage.backend {
        StorageBackend::Sqlite => {
            #[cfg(feature = "async-sqlite")]
            {
                let store = Arc::new(
                    nucleus::store::SqliteStore::new(&cfg.storage.sqlite_path)
                        .await
                        .context("Failed to open sqlite store")?,
                );
                let runs: Arc<dyn RunStore> = store.clone();
                let events: Arc<dyn EventStore> = store.clone();
                let checkpoints: Arc<dyn CheckpointStore> = store;
                return Ok((runs, events, checkpoints));
            }
            #[cfg(not(feature = "async-sqlite"))]
            tracing::warn!("sqlite backend needs the async-sqlite feature, using memory");
        }
        StorageBackend::Memory => {}
    }
    let runs: Arc<dyn RunStore> = Arc::new(InMemoryRunStore::new());
    let events: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    Ok((runs, events, checkpoints))
}

/// 逐个读取审批决定：a 批准，r 拒绝，e <json> 以新参数执行
async fn ask_decisions<R>(
    request: &ApprovalRequest,
    stdin: &mut tokio::io::Lines<R>,
) -> anyhow::Result<Vec<Decision>>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut decisions = Vec::with_capacity(request.len());
    for call in &request.calls {
        println!("approve {} {} ? [a]pprove / [r]eject / e <json>", call.tool, call.args);
        let line = stdin.next_line().await?.unwrap_or_default();
        let line = line.trim();
        let decision = if let Some(args) = line.strip_prefix('e') {
            Decision::Edit {
                args: args.trim().to_string(),
            }
        } else if line.starts_with('r') {
            Decision::Reject
        } else {
            Decision::Approve
        };
        decisions.push(decision);
    }
    Ok(decisions)
}
