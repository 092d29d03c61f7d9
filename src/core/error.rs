//! Agent 错误类型
//!
//! 节点内部的解析失败、工具失败都在本地降级处理，不会走到这里；
//! 只有未预期的错误（LLM 调用失败、存储失败、沙箱失败等）才会冒泡到 RunExecutor 边界，
//! 由其记录一条 error 事件并把 Run 置为 failed。

use thiserror::Error;

use crate::core::RunStatus;

/// 编排与运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    #[error("Sandbox error: {0}")]
    SandboxError(String),

    #[error("Credential error: {0}")]
    CredentialError(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    #[error("Invalid resume: {0}")]
    InvalidResume(String),

    #[error("Cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::JsonParseError(e.to_string())
    }
}
