//! 凭证会话：每个 run 单独申请，不缓存、不跨 run 共享
//!
//! 凭证值只交给工具集构建（ToolsetProvider），不会进入 LLM 上下文或事件日志。

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use crate::core::{AgentError, Run};

/// 一次 run 的凭证会话
#[derive(Clone, Default)]
pub struct CredentialSession {
    /// 会话对应的目标账号（多账号时为逗号分隔列表中的第一个）
    pub account_id: Option<String>,
    values: HashMap<String, String>,
    /// 过期时间（unix 秒）
    pub expires_at: Option<i64>,
}

impl CredentialSession {
    pub fn new(account_id: Option<String>) -> Self {
        Self {
            account_id,
            values: HashMap::new(),
            expires_at: None,
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for CredentialSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("CredentialSession")
            .field("account_id", &self.account_id)
            .field("keys", &keys)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// 凭证提供方
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// 为该 run 申请一个新会话；失败会让 run 进入 failed
    async fn session_for(&self, run: &Run) -> Result<CredentialSession, AgentError>;
}

/// 不提供任何凭证
#[derive(Debug, Default)]
pub struct NoCredentials;

#[async_trait]
impl CredentialProvider for NoCredentials {
    async fn session_for(&self, run: &Run) -> Result<CredentialSession, AgentError> {
        Ok(CredentialSession::new(primary_account(run)))
    }
}

/// 从环境变量读取凭证：`{prefix}KEY=value` 去掉前缀后作为键（小写）
#[derive(Debug, Clone)]
pub struct EnvCredentialProvider {
    prefix: String,
}

impl EnvCredentialProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new("NUCLEUS_CRED_")
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn session_for(&self, run: &Run) -> Result<CredentialSession, AgentError> {
        let mut session = CredentialSession::new(primary_account(run));
        for (k, v) in std::env::vars() {
            if let Some(key) = k.strip_prefix(&self.prefix) {
                if !key.is_empty() {
                    session = session.with_value(key.to_lowercase(), v);
                }
            }
        }
        tracing::debug!(run_id = %run.run_id, keys = session.values.len(), "credential session issued");
        Ok(session)
    }
}

fn primary_account(run: &Run) -> Option<String> {
    run.account_id
        .as_deref()
        .and_then(|ids| ids.split(',').map(str::trim).find(|s| !s.is_empty()))
        .map(str::to_string)
}
