//! 结果回送：按触发元数据的关联句柄，把完成 / 失败 / 澄清 / 待审批消息送回来源渠道
//!
//! 尽力而为，失败只记日志。

use async_trait::async_trait;

use crate::core::{Run, RunStatus};

/// 回送内容
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub run_id: String,
    pub channel: String,
    pub correlation: String,
    pub status: RunStatus,
    pub text: String,
}

impl Notification {
    pub fn for_run(run: &Run) -> Self {
        let text = match run.status {
            RunStatus::Completed => run
                .result
                .as_ref()
                .map(|r| r.summary.clone())
                .unwrap_or_default(),
            RunStatus::Failed => format!("Run failed: {}", run.error.as_deref().unwrap_or("unknown error")),
            RunStatus::AwaitingInput => run
                .clarification
                .as_ref()
                .map(|c| c.question.clone())
                .unwrap_or_default(),
            RunStatus::Queued | RunStatus::InProgress => String::new(),
        };
        Self {
            run_id: run.run_id.clone(),
            channel: run.channel.clone(),
            correlation: run.trigger.correlation_handle(),
            status: run.status,
            text,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), String>;
}

/// 只写日志
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: Notification) -> Result<(), String> {
        tracing::info!(
            run_id = %n.run_id,
            channel = %n.channel,
            correlation = %n.correlation,
            status = n.status.as_str(),
            "{}",
            n.text
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RunResult, TaskRequest, TriggerMetadata};

    #[test]
    fn test_notification_uses_correlation_handle() {
        let trigger = TriggerMetadata::Ticket {
            issue_key: "OPS-7".to_string(),
            project_key: "OPS".to_string(),
            reporter: "dana".to_string(),
        };
        let mut run = Run::new(TaskRequest::new("t", "x", trigger), true);
        run.start().unwrap();
        run.complete(RunResult {
            summary: "done".to_string(),
            tools_used: Default::default(),
            iterations: 1,
        })
        .unwrap();
        let n = Notification::for_run(&run);
        assert_eq!(n.correlation, "OPS-7");
        assert_eq!(n.text, "done");
        assert_eq!(n.channel, "ticket");
    }
}
