//! SQLite 存储（sqlx，需启用 `async-sqlite` feature）
//!
//! 一个连接池同时实现 RunStore / EventStore / CheckpointStore。记录整体以 JSON 存放在 body 列，
//! 键列与索引列单独存放以支持主键与按渠道的倒序查询。

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::core::{AgentError, Run};
use crate::react::Checkpoint;
use crate::store::{CheckpointStore, EventStore, ExecutionEvent, RunStore};

fn store_err(e: sqlx::Error) -> AgentError {
    AgentError::StoreError(e.to_string())
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// 打开（不存在则创建）数据库文件并建表
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(store_err)?;
        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    /// 内存数据库（单连接，测试用）
    pub async fn in_memory() -> Result<Self, AgentError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(store_err)?;
        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<(), AgentError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS runs (
                tenant_id TEXT NOT NULL,
                run_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (tenant_id, run_id)
            )",
            "CREATE INDEX IF NOT EXISTS idx_runs_channel_created ON runs(channel, created_at DESC)",
            "CREATE TABLE IF NOT EXISTS run_events (
                run_id TEXT NOT NULL,
                sort_key TEXT NOT NULL,
                event_type TEXT NOT NULL,
                node TEXT NOT NULL,
                expire_at INTEGER NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (run_id, sort_key)
            )",
            "CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                body TEXT NOT NULL
            )",
        ];
        for sql in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
        }
        Ok(())
    }
}

#[async_trait]
impl RunStore for SqliteStore {
    async fn put(&self, run: &Run) -> Result<(), AgentError> {
        let body = serde_json::to_string(run)?;
        sqlx::query(
            "INSERT OR REPLACE INTO runs (tenant_id, run_id, channel, status, created_at, updated_at, body)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.tenant_id)
        .bind(&run.run_id)
        .bind(&run.channel)
        .bind(run.status.as_str())
        .bind(run.created_at)
        .bind(run.updated_at)
        .bind(&body)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn get(&self, tenant_id: &str, run_id: &str) -> Result<Option<Run>, AgentError> {
        let row = sqlx::query("SELECT body FROM runs WHERE tenant_id = ? AND run_id = ?")
            .bind(tenant_id)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        match row {
            Some(row) => {
                let body: String = row.get("body");
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn list_by_channel(&self, channel: &str, limit: usize) -> Result<Vec<Run>, AgentError> {
        let rows = sqlx::query(
            "SELECT body FROM runs WHERE channel = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(channel)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.into_iter()
            .map(|row| {
                let body: String = row.get("body");
                serde_json::from_str(&body).map_err(AgentError::from)
            })
            .collect()
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn append(&self, event: &ExecutionEvent) -> Result<(), AgentError> {
        let body = serde_json::to_string(event)?;
        sqlx::query(
            "INSERT INTO run_events (run_id, sort_key, event_type, node, expire_at, body)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.run_id)
        .bind(&event.sort_key)
        .bind(event.event_type.as_str())
        .bind(&event.node)
        .bind(event.expire_at)
        .bind(&body)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn list(&self, run_id: &str) -> Result<Vec<ExecutionEvent>, AgentError> {
        let rows = sqlx::query("SELECT body FROM run_events WHERE run_id = ? ORDER BY sort_key ASC")
            .bind(run_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.into_iter()
            .map(|row| {
                let body: String = row.get("body");
                serde_json::from_str(&body).map_err(AgentError::from)
            })
            .collect()
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), AgentError> {
        let body = serde_json::to_string(checkpoint)
            .map_err(|e| AgentError::CheckpointError(e.to_string()))?;
        sqlx::query("INSERT OR REPLACE INTO checkpoints (thread_id, created_at, body) VALUES (?, ?, ?)")
            .bind(&checkpoint.thread_id)
            .bind(checkpoint.created_at)
            .bind(&body)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, AgentError> {
        let row = sqlx::query("SELECT body FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        match row {
            Some(row) => {
                let body: String = row.get("body");
                serde_json::from_str(&body)
                    .map(Some)
                    .map_err(|e| AgentError::CheckpointError(e.to_string()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, thread_id: &str) -> Result<(), AgentError> {
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

#[cfg(all(test, feature = "async-sqlite"))]
mod tests {
    use super::*;
    use crate::core::{TaskRequest, TriggerMetadata};
    use crate::react::{Node, OrchestrationState};
    use crate::store::{sort_key, EventType};

    #[tokio::test]
    async fn test_run_round_trip_and_channel_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut older = Run::new(TaskRequest::new("t", "a", TriggerMetadata::api("c")), true);
        older.created_at -= 1000;
        let newer = Run::new(TaskRequest::new("t", "b", TriggerMetadata::api("c")), true);
        store.put(&older).await.unwrap();
        store.put(&newer).await.unwrap();

        let listed = store.list_by_channel("api", 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].run_id, newer.run_id);
        assert!(store.get("t", &older.run_id).await.unwrap().is_some());
        assert!(store.get("other", &older.run_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_events_ascending_and_unique() {
        let store = SqliteStore::in_memory().await.unwrap();
        for (ts, seq) in [(10, 1), (10, 0), (9, 2)] {
            let ev = ExecutionEvent {
                run_id: "r".to_string(),
                sort_key: sort_key(ts, seq),
                timestamp: ts,
                event_type: EventType::Execution,
                node: "generate".to_string(),
                content: format!("{}", seq),
                tool_name: None,
                tool_args: None,
                tool_output: None,
                metadata: Default::default(),
                expire_at: 0,
            };
            store.append(&ev).await.unwrap();
        }
        let order: Vec<String> = store
            .list("r")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.content)
            .collect();
        assert_eq!(order, vec!["2", "0", "1"]);
    }

    #[tokio::test]
    async fn test_checkpoint_save_load_delete() {
        let store = SqliteStore::in_memory().await.unwrap();
        let cp = Checkpoint::new("run_1", Node::Tools, OrchestrationState::new("task"), None);
        store.save(&cp).await.unwrap();
        assert_eq!(store.load("run_1").await.unwrap(), Some(cp));
        store.delete("run_1").await.unwrap();
        assert!(store.load("run_1").await.unwrap().is_none());
    }
}
