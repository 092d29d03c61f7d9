//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock / Scripted）实现 LlmClient。
//! 工具绑定通过 prompt 中的工具描述与 Tool Call JSON Schema 完成，模型以 JSON 回复工具调用。

use async_trait::async_trait;

use crate::memory::Message;

/// 一次模型调用的回复与本次调用消耗的 token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl Completion {
    /// 不统计用量的回复
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；用量只属于本次调用
    async fn complete(&self, messages: &[Message]) -> Result<Completion, String>;

    /// 模型标识（写入事件 metadata）
    fn model_name(&self) -> &str {
        "unknown"
    }

    /// 客户端生命周期内的累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 被所有 run 共享，只用于进程级汇总；默认返回 (0, 0, 0)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
