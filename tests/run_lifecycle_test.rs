//! RunExecutor 场景测试：完成、失败、澄清、迭代上限、取消、并发 run 互不干扰

mod common;

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::Notify;

use common::{
    harness, harness_with, harness_with_llm, BlockingTool, FakeTool, RecordingToolset,
    TaskRoutedLlm,
};
use nucleus::core::{AgentError, Mode, RunStatus, TaskRequest, TriggerMetadata};
use nucleus::tools::Tool;
use nucleus::react::{Decision, CATCH_ALL_STEP};
use nucleus::store::{EventStore, EventType, RunStore};

fn request(task: &str) -> TaskRequest {
    TaskRequest::new("tenant-a", task, TriggerMetadata::api("test"))
}

#[tokio::test]
async fn test_fast_s3_listing_completes_with_tools_used() {
    let discover = Arc::new(FakeTool::new("discover_accounts", "accounts: 123456789012"));
    let buckets = Arc::new(FakeTool::new("list_buckets", "logs-bucket, assets-bucket"));
    let h = harness(
        &[
            r#"{"mode": "fast", "account_id": "123456789012", "reasoning": "read-only lookup"}"#,
            r#"{"tool": "discover_accounts", "args": {}}"#,
            r#"{"tool_calls": [
                {"tool": "list_buckets", "args": {"account_id": "123456789012"}},
                {"tool": "list_buckets", "args": {"account_id": "123456789012", "region": "eu-west-1"}}
            ]}"#,
            "You have two buckets: logs-bucket and assets-bucket.",
            "COMPLETE",
        ],
        RecordingToolset::with_tools(vec![discover.clone(), buckets.clone()]),
    );

    let run = h.executor.submit(request("list my S3 buckets")).await.unwrap();
    let run = h.executor.execute("tenant-a", &run.run_id).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    let result = run.result.as_ref().unwrap();
    assert!(result.tools_used.contains("discover_accounts"));
    assert!(result.tools_used.contains("list_buckets"));
    assert_eq!(result.tools_used.len(), 2);
    assert_eq!(result.iterations, 3);
    assert_eq!(result.summary, "You have two buckets: logs-bucket and assets-bucket.");
    assert_eq!(buckets.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.llm.remaining(), 0);

    assert_eq!(
        h.runs.status_history(&run.run_id).await,
        vec![RunStatus::Queued, RunStatus::InProgress, RunStatus::Completed]
    );
    let stored = h.runs.get("tenant-a", &run.run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
    assert_eq!(stored.mode, Some(Mode::Fast));
    assert_eq!(stored.account_id.as_deref(), Some("123456789012"));
    assert!(stored.skill_id.is_none());

    let events = h.events.list(&run.run_id).await.unwrap();
    let mut keys: Vec<String> = events.iter().map(|e| e.sort_key.clone()).collect();
    keys.dedup();
    assert_eq!(keys.len(), events.len());
    let tool_calls = events
        .iter()
        .filter(|e| e.event_type == EventType::ToolCall && e.tool_name.is_some())
        .count();
    assert_eq!(tool_calls, 3);
    assert!(events.iter().all(|e| e.event_type != EventType::Error));
    assert_eq!(events.first().unwrap().node, "evaluator");

    for dir in h.toolset.sandboxes() {
        assert!(!dir.exists(), "sandbox {} left behind", dir.display());
    }
}

#[tokio::test]
async fn test_malformed_plan_uses_catch_all_step() {
    let h = harness(
        &[
            r#"{"mode": "plan", "reasoning": "multi-step"}"#,
            "Sure! First I will look around, then I will answer.",
            "Everything looks healthy.",
        ],
        RecordingToolset::default(),
    );
    let run = h.executor.submit(request("audit my account")).await.unwrap();
    let run = h.executor.execute("tenant-a", &run.run_id).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.result.as_ref().unwrap().summary, "Everything looks healthy.");

    let events = h.events.list(&run.run_id).await.unwrap();
    let plan_summary = events
        .iter()
        .find(|e| e.node == "planner" && e.content.starts_with("1."))
        .expect("planner node end event");
    assert_eq!(plan_summary.content, format!("1. {}", CATCH_ALL_STEP));
    assert!(events.iter().any(|e| e.event_type == EventType::Final));
}

#[tokio::test]
async fn test_fast_ceiling_ends_after_generate() {
    let h = harness_with(
        &[
            r#"{"mode": "fast"}"#,
            "Partial answer.",
            "You did not mention the region.",
            "Answer with region us-east-1.",
        ],
        RecordingToolset::default(),
        |cfg| cfg.max_iterations = 2,
    );
    let run = h.executor.submit(request("where is my vpc")).await.unwrap();
    let run = h.executor.execute("tenant-a", &run.run_id).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    let result = run.result.as_ref().unwrap();
    assert_eq!(result.iterations, 2);
    assert_eq!(result.summary, "Answer with region us-east-1.");
    assert_eq!(h.llm.call_count(), 4);

    let events = h.events.list(&run.run_id).await.unwrap();
    let last_reflect = events.iter().rposition(|e| e.node == "reflect").unwrap();
    let last_generate = events.iter().rposition(|e| e.node == "generate").unwrap();
    assert!(last_generate > last_reflect);
}

#[tokio::test]
async fn test_toolset_failure_fails_run_and_removes_sandbox() {
    let h = harness(&[], RecordingToolset::failing());
    let run = h.executor.submit(request("anything")).await.unwrap();
    let run = h.executor.execute("tenant-a", &run.run_id).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.as_deref(), Some("Tool execution failed: toolset unavailable"));
    assert_eq!(
        h.runs.status_history(&run.run_id).await,
        vec![RunStatus::Queued, RunStatus::InProgress, RunStatus::Failed]
    );

    let sandboxes = h.toolset.sandboxes();
    assert_eq!(sandboxes.len(), 1);
    assert!(!sandboxes[0].exists());

    let events = h.events.list(&run.run_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Error);
    assert_eq!(events[0].content, "Tool execution failed: toolset unavailable");
}

#[tokio::test]
async fn test_llm_failure_mid_run_fails_and_cleans_up() {
    let h = harness(&[r#"{"mode": "fast"}"#], RecordingToolset::default());
    h.llm.push_error("connection reset");

    let run = h.executor.submit(request("list instances")).await.unwrap();
    let run = h.executor.execute("tenant-a", &run.run_id).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.as_deref(), Some("LLM error: connection reset"));
    assert!(run.result.is_none());
    for dir in h.toolset.sandboxes() {
        assert!(!dir.exists());
    }

    let events = h.events.list(&run.run_id).await.unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.event_type, EventType::Error);
    assert_eq!(
        events.iter().filter(|e| e.event_type == EventType::Error).count(),
        1
    );
}

#[tokio::test]
async fn test_clarification_pauses_run() {
    let h = harness(
        &[r#"{"mode": "end", "clarification_question": "Which AWS account?", "missing_info": "account_id"}"#],
        RecordingToolset::default(),
    );
    let run = h.executor.submit(request("clean up the old stuff")).await.unwrap();
    let run = h.executor.execute("tenant-a", &run.run_id).await.unwrap();

    assert_eq!(run.status, RunStatus::AwaitingInput);
    let c = run.clarification.as_ref().unwrap();
    assert_eq!(c.question, "Which AWS account?");
    assert_eq!(c.missing_info, "account_id");
    assert!(run.pending_approval.is_none());

    let err = h
        .executor
        .resume("tenant-a", &run.run_id, vec![Decision::Approve])
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidResume(_)));
    let stored = h.runs.get("tenant-a", &run.run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::AwaitingInput);
}

#[tokio::test]
async fn test_cancel_keeps_last_status_and_removes_sandbox() {
    let started = Arc::new(Notify::new());
    let h = harness(
        &[r#"{"mode": "fast"}"#, r#"{"tool": "wait_forever", "args": {}}"#],
        RecordingToolset::with_tools(vec![Arc::new(BlockingTool {
            started: started.clone(),
        })]),
    );
    let run = h.executor.submit(request("wait")).await.unwrap();
    let handle = h.executor.spawn("tenant-a", run.run_id.clone());

    started.notified().await;
    assert!(h.executor.cancel(&run.run_id));

    let outcome = handle.await.unwrap();
    assert!(matches!(outcome, Err(AgentError::Cancelled)));
    assert!(!h.executor.is_running(&run.run_id));

    let stored = h.runs.get("tenant-a", &run.run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::InProgress);
    for dir in h.toolset.sandboxes() {
        assert!(!dir.exists());
    }
}

#[tokio::test]
async fn test_execute_unknown_run() {
    let h = harness(&[], RecordingToolset::default());
    let err = h.executor.execute("tenant-a", "run_missing").await.unwrap_err();
    assert!(matches!(err, AgentError::RunNotFound(_)));
}

#[tokio::test]
async fn test_execute_twice_is_rejected() {
    let h = harness(&[r#"{"mode": "fast"}"#, "done", "COMPLETE"], RecordingToolset::default());
    let run = h.executor.submit(request("ping")).await.unwrap();
    h.executor.execute("tenant-a", &run.run_id).await.unwrap();
    let err = h.executor.execute("tenant-a", &run.run_id).await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_concurrent_execute_runs_once() {
    let h = harness(&[r#"{"mode": "fast"}"#, "pong", "COMPLETE"], RecordingToolset::default());
    let run = h.executor.submit(request("ping")).await.unwrap();

    let (a, b) = tokio::join!(
        h.executor.execute("tenant-a", &run.run_id),
        h.executor.execute("tenant-a", &run.run_id)
    );
    let (ok, err) = match (a, b) {
        (Ok(run), Err(e)) | (Err(e), Ok(run)) => (run, e),
        other => panic!("expected exactly one execution, got {:?}", other),
    };
    assert_eq!(ok.status, RunStatus::Completed);
    assert!(matches!(err, AgentError::InvalidTransition { .. }));
    assert_eq!(h.llm.call_count(), 3);
    assert_eq!(h.toolset.sandboxes().len(), 1);
    assert!(!h.executor.is_running(&run.run_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_runs_stay_isolated() {
    const JOBS: [&str; 4] = ["job-alpha", "job-bravo", "job-charlie", "job-delta"];

    let llm = Arc::new(TaskRoutedLlm::default());
    let mut tools: Vec<Arc<FakeTool>> = Vec::new();
    for job in JOBS {
        let tool = format!("inspect_{}", job.trim_start_matches("job-"));
        let call = format!(r#"{{"tool": "{}", "args": {{}}}}"#, tool);
        let answer = format!("finished {}", tool);
        llm.script(job, &[r#"{"mode": "fast"}"#, &call, &answer, "COMPLETE"]);
        tools.push(Arc::new(FakeTool::new(&tool, "ok")));
    }
    let registered: Vec<Arc<dyn Tool>> = tools.iter().map(|t| t.clone() as Arc<dyn Tool>).collect();
    let h = harness_with_llm(llm, RecordingToolset::with_tools(registered), |_| {});

    let mut handles = Vec::new();
    for job in JOBS {
        let run = h.executor.submit(request(&format!("check {}", job))).await.unwrap();
        handles.push(h.executor.spawn("tenant-a", run.run_id));
    }
    let mut finished = Vec::new();
    for handle in handles {
        finished.push(handle.await.unwrap().unwrap());
    }

    for (job, run) in JOBS.iter().zip(&finished) {
        let tool = format!("inspect_{}", job.trim_start_matches("job-"));
        assert_eq!(run.status, RunStatus::Completed);
        let result = run.result.as_ref().unwrap();
        assert_eq!(result.tools_used, BTreeSet::from([tool.clone()]));
        assert_eq!(result.summary, format!("finished {}", tool));

        let events = h.events.list(&run.run_id).await.unwrap();
        assert!(events.iter().all(|e| e.run_id == run.run_id));
        let called: BTreeSet<String> = events.iter().filter_map(|e| e.tool_name.clone()).collect();
        assert_eq!(called, BTreeSet::from([tool]));
        // 每次模型调用只记自己的用量
        let usage: Vec<u64> = events
            .iter()
            .filter_map(|e| e.metadata.get("prompt_tokens").and_then(|v| v.as_u64()))
            .collect();
        assert_eq!(usage, vec![10; 4]);
    }
    for tool in &tools {
        assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
    }

    let sandboxes: BTreeSet<_> = h.toolset.sandboxes().into_iter().collect();
    assert_eq!(sandboxes.len(), JOBS.len());
    assert!(sandboxes.iter().all(|dir| !dir.exists()));
}
