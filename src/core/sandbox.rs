//! Run 沙箱：每个 run 独占一个临时目录，在所有退出路径上删除
//!
//! 创建与正常删除都不阻塞运行时线程（tokio::fs / spawn_blocking）；
//! Drop 兜底时同步删除（例如任务被中途取消）。

use std::path::{Path, PathBuf};

use crate::core::AgentError;

#[derive(Debug)]
pub struct RunSandbox {
    path: PathBuf,
    closed: bool,
}

impl RunSandbox {
    /// 在 root 下创建 `<run_id>` 目录；root 为 None 时使用系统临时目录
    pub async fn create(root: Option<&Path>, run_id: &str) -> Result<Self, AgentError> {
        let base = root
            .map(Path::to_path_buf)
            .unwrap_or_else(|| std::env::temp_dir().join("nucleus-sandboxes"));
        let path = base.join(run_id);
        tokio::fs::create_dir_all(&path).await.map_err(|e| {
            AgentError::SandboxError(format!("create {}: {}", path.display(), e))
        })?;
        tracing::debug!(run_id = %run_id, path = %path.display(), "sandbox created");
        Ok(Self {
            path,
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 删除沙箱目录；重复调用无副作用
    pub async fn close(&mut self) -> Result<(), AgentError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || remove_dir(&path))
            .await
            .map_err(|e| AgentError::SandboxError(format!("remove {}: {}", self.path.display(), e)))?
    }
}

fn remove_dir(path: &Path) -> Result<(), AgentError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "sandbox removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AgentError::SandboxError(format!(
            "remove {}: {}",
            path.display(),
            e
        ))),
    }
}

impl Drop for RunSandbox {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = remove_dir(&self.path) {
            tracing::warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_close_removes_dir() {
        let root = tempfile::tempdir().unwrap();
        let mut sb = RunSandbox::create(Some(root.path()), "run_a").await.unwrap();
        std::fs::write(sb.path().join("f.txt"), "x").unwrap();
        assert!(sb.path().is_dir());
        sb.close().await.unwrap();
        assert!(!root.path().join("run_a").exists());
        sb.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_removes_dir() {
        let root = tempfile::tempdir().unwrap();
        {
            let _sb = RunSandbox::create(Some(root.path()), "run_b").await.unwrap();
            assert!(root.path().join("run_b").is_dir());
        }
        assert!(!root.path().join("run_b").exists());
    }
}
