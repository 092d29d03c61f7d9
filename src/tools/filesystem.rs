//! 沙箱文件系统工具
//!
//! SafeFs 绑定 run 的沙箱目录，所有路径经 resolve 校验必须在根下（禁止 ../ 与绝对路径逃逸）；
//! ReadFileTool / ListDirTool / WriteFileTool 基于 SafeFs 提供读、列目录、写能力。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::Tool;

/// 沙箱文件系统：绑定根目录，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 按词法规整相对路径；出现绝对路径或越过根的 .. 即拒绝
    fn normalize(&self, path: &str) -> Result<PathBuf, AgentError> {
        let mut out = PathBuf::new();
        for comp in Path::new(path).components() {
            match comp {
                Component::CurDir => {}
                Component::Normal(p) => out.push(p),
                Component::ParentDir => {
                    if !out.pop() {
                        return Err(AgentError::PathEscape(path.to_string()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(AgentError::PathEscape(path.to_string()));
                }
            }
        }
        Ok(self.root_dir.join(out))
    }

    /// 解析已存在的路径，并在解析符号链接后再次确认仍在根下
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let full = self.normalize(path)?;
        let canonical = full
            .canonicalize()
            .map_err(|_| AgentError::ToolExecutionFailed(format!("Path not found: {}", path)))?;
        if canonical.starts_with(&self.root_dir) {
            Ok(canonical)
        } else {
            Err(AgentError::PathEscape(path.to_string()))
        }
    }

    pub fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let resolved = self.resolve(path)?;
        std::fs::read_to_string(&resolved)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Read failed: {}", e)))
    }

    pub fn write_file(&self, path: &str, content: &str) -> Result<usize, AgentError> {
        let target = self.normalize(path)?;
        if target == self.root_dir {
            return Err(AgentError::ToolExecutionFailed("Empty path".to_string()));
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AgentError::ToolExecutionFailed(format!("Write failed: {}", e)))?;
        }
        std::fs::write(&target, content)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Write failed: {}", e)))?;
        Ok(content.len())
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, AgentError> {
        let base = if path.is_empty() || path == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        let mut entries = Vec::new();
        for e in std::fs::read_dir(&base)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("List failed: {}", e)))?
        {
            let e = e.map_err(|e| AgentError::ToolExecutionFailed(e.to_string()))?;
            let name = e.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                let suffix = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    "/"
                } else {
                    ""
                };
                entries.push(format!("{}{}", name, suffix));
            }
        }
        entries.sort();
        Ok(entries)
    }
}

fn path_arg<'a>(args: &'a Value, default: &'a str) -> &'a str {
    args.get("path").and_then(|v| v.as_str()).unwrap_or(default)
}

/// 读取沙箱内文件
pub struct ReadFileTool {
    fs: SafeFs,
}

impl ReadFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the run workspace. Read-only."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "path": { "type": "string", "description": "path relative to the workspace" } },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = path_arg(&args, "");
        tracing::debug!(path = %path, "read_file");
        self.fs.read_file(path).map_err(|e| e.to_string())
    }
}

/// 列出沙箱内目录
pub struct ListDirTool {
    fs: SafeFs,
}

impl ListDirTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List a directory in the run workspace. Read-only."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "path": { "type": "string", "description": "directory, default '.'" } },
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = path_arg(&args, ".");
        let entries = self.fs.list_dir(path).map_err(|e| e.to_string())?;
        Ok(entries.join("\n"))
    }
}

/// 写入沙箱内文件（会产生副作用）
pub struct WriteFileTool {
    fs: SafeFs,
}

impl WriteFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write a file inside the run workspace, creating parent directories. Mutating."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let path = path_arg(&args, "");
        let content = args.get("content").and_then(|v| v.as_str()).unwrap_or("");
        let n = self.fs.write_file(path, content).map_err(|e| e.to_string())?;
        Ok(format!("Wrote {} bytes to {}", n, path))
    }
}
