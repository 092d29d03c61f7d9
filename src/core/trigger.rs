//! 触发元数据：由外部适配器（聊天 / 工单 / API）解析后交给核心
//!
//! 核心只关心来源标签与一个不透明的关联句柄（回帖目标、工单号、回调地址），
//! 结果与澄清问题通过 Notifier 按该句柄回送。

use serde::{Deserialize, Serialize};

/// 触发来源（按 source 打标签的联合体）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TriggerMetadata {
    /// 聊天渠道
    Chat {
        user_id: String,
        channel_id: String,
        reply_target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
    },
    /// 工单系统
    Ticket {
        issue_key: String,
        project_key: String,
        reporter: String,
    },
    /// 直接 API 调用
    Api {
        client_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        callback_url: Option<String>,
    },
}

impl TriggerMetadata {
    /// 来源渠道标签，用作 Run 的二级索引分区
    pub fn channel(&self) -> &'static str {
        match self {
            TriggerMetadata::Chat { .. } => "chat",
            TriggerMetadata::Ticket { .. } => "ticket",
            TriggerMetadata::Api { .. } => "api",
        }
    }

    /// 回送结果时使用的关联句柄
    pub fn correlation_handle(&self) -> String {
        match self {
            TriggerMetadata::Chat {
                channel_id,
                reply_target,
                thread_id,
                ..
            } => match thread_id {
                Some(t) => format!("{}:{}:{}", channel_id, reply_target, t),
                None => format!("{}:{}", channel_id, reply_target),
            },
            TriggerMetadata::Ticket { issue_key, .. } => issue_key.clone(),
            TriggerMetadata::Api {
                client_id,
                callback_url,
            } => callback_url.clone().unwrap_or_else(|| client_id.clone()),
        }
    }

    pub fn api(client_id: impl Into<String>) -> Self {
        TriggerMetadata::Api {
            client_id: client_id.into(),
            callback_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_serializes_with_source_tag() {
        let t = TriggerMetadata::Ticket {
            issue_key: "OPS-12".to_string(),
            project_key: "OPS".to_string(),
            reporter: "alice".to_string(),
        };
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["source"], "ticket");
        assert_eq!(t.channel(), "ticket");
        assert_eq!(t.correlation_handle(), "OPS-12");
    }

    #[test]
    fn test_chat_correlation_includes_thread() {
        let t = TriggerMetadata::Chat {
            user_id: "U1".to_string(),
            channel_id: "C1".to_string(),
            reply_target: "U1".to_string(),
            thread_id: Some("1700000000.01".to_string()),
        };
        assert_eq!(t.correlation_handle(), "C1:U1:1700000000.01");
    }
}
