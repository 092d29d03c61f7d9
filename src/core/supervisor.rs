//! Run 监管：每个运行中的 run 持有一个取消令牌（父令牌的子令牌）
//!
//! 同一 run 同一时刻只能被一个 execute / resume 占用：claim 在第一次 await 之前完成，占用期间的重复调用直接被拒绝。
//! cancel(run_id) 只中止该 run；shutdown() 取消全部。取消不会回滚工具副作用，也不改写已持久化的状态。

use std::collections::HashMap;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct RunSupervisor {
    root: CancellationToken,
    active: Mutex<HashMap<String, CancellationToken>>,
}

impl RunSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 占用 run；已被占用时返回 None。返回的守卫在 drop 时释放占用
    pub fn claim(&self, run_id: &str) -> Option<RunClaim<'_>> {
        let mut active = self.active.lock().ok()?;
        if active.contains_key(run_id) {
            return None;
        }
        let token = self.root.child_token();
        active.insert(run_id.to_string(), token.clone());
        Some(RunClaim {
            supervisor: self,
            run_id: run_id.to_string(),
            token,
        })
    }

    fn release(&self, run_id: &str) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(run_id);
        }
    }

    /// 取消指定 run；返回该 run 是否在运行
    pub fn cancel(&self, run_id: &str) -> bool {
        let token = self
            .active
            .lock()
            .ok()
            .and_then(|active| active.get(run_id).cloned());
        match token {
            Some(t) => {
                tracing::info!(run_id = %run_id, "cancelling run");
                t.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, run_id: &str) -> bool {
        self.active
            .lock()
            .map(|a| a.contains_key(run_id))
            .unwrap_or(false)
    }

    /// 取消所有 run
    pub fn shutdown(&self) {
        self.root.cancel();
    }
}

/// 对一个 run 的独占执行权
#[derive(Debug)]
pub struct RunClaim<'a> {
    supervisor: &'a RunSupervisor,
    run_id: String,
    token: CancellationToken,
}

impl RunClaim<'_> {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for RunClaim<'_> {
    fn drop(&mut self) {
        self.supervisor.release(&self.run_id);
    }
}
