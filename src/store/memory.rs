//! 内存存储（默认后端，亦用于测试）
//!
//! InMemoryRunStore 额外记录每个 run 依次写入过的状态，便于断言状态迁移顺序。

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::{AgentError, Run, RunStatus};
use crate::react::Checkpoint;
use crate::store::{CheckpointStore, EventStore, ExecutionEvent, RunStore};

#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<(String, String), Run>>,
    history: RwLock<HashMap<String, Vec<RunStatus>>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 该 run 每次写入时的状态序列（相邻重复合并）
    pub async fn status_history(&self, run_id: &str) -> Vec<RunStatus> {
        self.history
            .read()
            .await
            .get(run_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn put(&self, run: &Run) -> Result<(), AgentError> {
        self.runs
            .write()
            .await
            .insert((run.tenant_id.clone(), run.run_id.clone()), run.clone());
        let mut history = self.history.write().await;
        let seq = history.entry(run.run_id.clone()).or_default();
        if seq.last() != Some(&run.status) {
            seq.push(run.status);
        }
        Ok(())
    }

    async fn get(&self, tenant_id: &str, run_id: &str) -> Result<Option<Run>, AgentError> {
        Ok(self
            .runs
            .read()
            .await
            .get(&(tenant_id.to_string(), run_id.to_string()))
            .cloned())
    }

    async fn list_by_channel(&self, channel: &str, limit: usize) -> Result<Vec<Run>, AgentError> {
        let mut runs: Vec<Run> = self
            .runs
            .read()
            .await
            .values()
            .filter(|r| r.channel == channel)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit);
        Ok(runs)
    }
}

#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<HashMap<String, BTreeMap<String, ExecutionEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: &ExecutionEvent) -> Result<(), AgentError> {
        let mut events = self.events.write().await;
        let per_run = events.entry(event.run_id.clone()).or_default();
        if per_run.contains_key(&event.sort_key) {
            return Err(AgentError::StoreError(format!(
                "duplicate event key {}#{}",
                event.run_id, event.sort_key
            )));
        }
        per_run.insert(event.sort_key.clone(), event.clone());
        Ok(())
    }

    async fn list(&self, run_id: &str) -> Result<Vec<ExecutionEvent>, AgentError> {
        Ok(self
            .events
            .read()
            .await
            .get(run_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), AgentError> {
        self.checkpoints
            .write()
            .await
            .insert(checkpoint.thread_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, AgentError> {
        Ok(self.checkpoints.read().await.get(thread_id).cloned())
    }

    async fn delete(&self, thread_id: &str) -> Result<(), AgentError> {
        self.checkpoints.write().await.remove(thread_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TaskRequest, TriggerMetadata};
    use crate::store::{sort_key, EventType};

    fn event(run_id: &str, ts: i64, seq: u64) -> ExecutionEvent {
        ExecutionEvent {
            run_id: run_id.to_string(),
            sort_key: sort_key(ts, seq),
            timestamp: ts,
            event_type: EventType::Execution,
            node: "generate".to_string(),
            content: format!("e{}", seq),
            tool_name: None,
            tool_args: None,
            tool_output: None,
            metadata: Default::default(),
            expire_at: 0,
        }
    }

    #[tokio::test]
    async fn test_events_listed_in_key_order() {
        let store = InMemoryEventStore::new();
        store.append(&event("r", 5, 2)).await.unwrap();
        store.append(&event("r", 5, 1)).await.unwrap();
        store.append(&event("r", 4, 3)).await.unwrap();
        let contents: Vec<String> = store
            .list("r")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.content)
            .collect();
        assert_eq!(contents, vec!["e3", "e1", "e2"]);
        assert!(store.append(&event("r", 5, 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_run_history_and_channel_listing() {
        let store = InMemoryRunStore::new();
        let mut run = Run::new(TaskRequest::new("t", "x", TriggerMetadata::api("c")), true);
        store.put(&run).await.unwrap();
        run.start().unwrap();
        store.put(&run).await.unwrap();
        store.put(&run).await.unwrap();
        assert_eq!(
            store.status_history(&run.run_id).await,
            vec![RunStatus::Queued, RunStatus::InProgress]
        );
        assert_eq!(store.list_by_channel("api", 10).await.unwrap().len(), 1);
        assert!(store.list_by_channel("chat", 10).await.unwrap().is_empty());
        assert!(store.get("other", &run.run_id).await.unwrap().is_none());
    }
}
