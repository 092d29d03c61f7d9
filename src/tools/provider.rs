//! 工具集构建：每个 run 在沙箱与凭证会话就绪后构建一次自己的 ToolRegistry
//!
//! 构建失败视为 run 失败（沙箱仍会被清理）。

use std::path::Path;

use async_trait::async_trait;

use crate::core::{AgentError, CredentialSession, Run};
use crate::tools::{EchoTool, ListDirTool, ReadFileTool, SafeFs, ToolRegistry, WriteFileTool};

/// 构建工具集时可用的 run 上下文
pub struct ToolsetContext<'a> {
    pub run: &'a Run,
    pub sandbox: &'a Path,
    pub credentials: &'a CredentialSession,
}

/// 工具集提供方
#[async_trait]
pub trait ToolsetProvider: Send + Sync {
    async fn build(&self, ctx: ToolsetContext<'_>) -> Result<ToolRegistry, AgentError>;
}

/// 默认工具集：echo 与绑定沙箱目录的文件工具
#[derive(Debug, Default)]
pub struct SandboxToolset;

#[async_trait]
impl ToolsetProvider for SandboxToolset {
    async fn build(&self, ctx: ToolsetContext<'_>) -> Result<ToolRegistry, AgentError> {
        if !ctx.sandbox.is_dir() {
            return Err(AgentError::SandboxError(format!(
                "sandbox missing: {}",
                ctx.sandbox.display()
            )));
        }
        let fs = SafeFs::new(ctx.sandbox);
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(ReadFileTool::new(fs.clone()));
        registry.register(ListDirTool::new(fs.clone()));
        registry.register(WriteFileTool::new(fs));
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TaskRequest, TriggerMetadata};

    #[tokio::test]
    async fn test_sandbox_toolset() {
        let dir = tempfile::tempdir().unwrap();
        let run = Run::new(TaskRequest::new("t", "x", TriggerMetadata::api("c")), true);
        let creds = CredentialSession::default();
        let reg = SandboxToolset
            .build(ToolsetContext {
                run: &run,
                sandbox: dir.path(),
                credentials: &creds,
            })
            .await
            .unwrap();
        assert_eq!(
            reg.tool_names(),
            vec!["echo", "list_dir", "read_file", "write_file"]
        );
    }

    #[tokio::test]
    async fn test_missing_sandbox_fails() {
        let run = Run::new(TaskRequest::new("t", "x", TriggerMetadata::api("c")), true);
        let creds = CredentialSession::default();
        let res = SandboxToolset
            .build(ToolsetContext {
                run: &run,
                sandbox: Path::new("/definitely/not/here"),
                credentials: &creds,
            })
            .await;
        assert!(matches!(res, Err(AgentError::SandboxError(_))));
    }
}
