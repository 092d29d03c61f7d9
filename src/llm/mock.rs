//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! - MockLlmClient：取最后一条 User 消息，回显为 JSON Tool Call（echo），便于本地跑通编排流程。
//! - ScriptedLlmClient：按顺序返回预先排好的回复（或错误），并记录每次调用收到的消息，供测试断言。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{Completion, LlmClient};
use crate::memory::{Message, Role};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, messages: &[Message]) -> Result<Completion, String> {
        // 已经拿到过工具结果则直接结束，避免无限回显
        if messages.iter().any(|m| m.role == Role::Tool) {
            return Ok(Completion::text("COMPLETE"));
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(Completion::text(
            serde_json::json!({
                "tool": "echo",
                "args": { "text": format!("Echo from Mock: {}", last_user) }
            })
            .to_string(),
        ))
    }
}

enum ScriptStep {
    Reply(String),
    Fail(String),
}

/// 脚本化客户端：每次 complete 弹出一条预设回复
#[derive(Default)]
pub struct ScriptedLlmClient {
    steps: Mutex<VecDeque<ScriptStep>>,
    calls: Mutex<Vec<Vec<Message>>>,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以一组回复构造
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for r in replies {
            client.push_reply(r);
        }
        client
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(ScriptStep::Reply(reply.into()));
        }
    }

    pub fn push_error(&self, error: impl Into<String>) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(ScriptStep::Fail(error.into()));
        }
    }

    /// 已发生的调用次数
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// 第 n 次调用收到的消息
    pub fn call(&self, n: usize) -> Option<Vec<Message>> {
        self.calls.lock().ok().and_then(|c| c.get(n).cloned())
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        let p = self.prompt_tokens.load(Ordering::Relaxed);
        let c = self.completion_tokens.load(Ordering::Relaxed);
        (p, c, p + c)
    }

    async fn complete(&self, messages: &[Message]) -> Result<Completion, String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let step = self
            .steps
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front()
            .ok_or_else(|| "scripted responses exhausted".to_string())?;
        match step {
            ScriptStep::Reply(text) => {
                // 按 4 字符 ≈ 1 token 估算
                let prompt_chars: usize = messages.iter().map(|m| m.content.len()).sum();
                let prompt_tokens = (prompt_chars / 4) as u64;
                let completion_tokens = (text.len() / 4) as u64;
                self.prompt_tokens.fetch_add(prompt_tokens, Ordering::Relaxed);
                self.completion_tokens
                    .fetch_add(completion_tokens, Ordering::Relaxed);
                Ok(Completion {
                    text,
                    prompt_tokens,
                    completion_tokens,
                })
            }
            ScriptStep::Fail(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let llm = ScriptedLlmClient::with_replies(["first", "second"]);
        let first = llm.complete(&[Message::user("a")]).await.unwrap();
        assert_eq!(first.text, "first");
        let second = llm.complete(&[Message::user("bbbbbbbb")]).await.unwrap();
        assert_eq!(second.text, "second");
        assert_eq!(second.prompt_tokens, 2);
        assert_eq!(second.completion_tokens, 1);
        assert_eq!(llm.token_usage(), (2, 2, 4));
        assert!(llm.complete(&[Message::user("c")]).await.is_err());
        assert_eq!(llm.call_count(), 3);
        assert_eq!(llm.call(1).unwrap()[0].content, "bbbbbbbb");
    }

    #[tokio::test]
    async fn test_scripted_error_step() {
        let llm = ScriptedLlmClient::new();
        llm.push_error("rate limited");
        assert_eq!(
            llm.complete(&[Message::user("x")]).await.unwrap_err(),
            "rate limited"
        );
    }

    #[tokio::test]
    async fn test_mock_echoes_then_completes() {
        let llm = MockLlmClient;
        let first = llm.complete(&[Message::user("hello")]).await.unwrap();
        assert!(first.text.contains("\"echo\""));
        let call = crate::memory::ToolCall {
            id: "c".to_string(),
            name: "echo".to_string(),
            args: serde_json::json!({}),
        };
        let done = llm
            .complete(&[Message::user("hello"), Message::tool(&call, "hello")])
            .await
            .unwrap();
        assert_eq!(done.text, "COMPLETE");
    }
}
