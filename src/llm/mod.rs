//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::AppConfig;

pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{Completion, LlmClient};

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let has_key = std::env::var("OPENAI_API_KEY").is_ok();

    if provider == "mock" || (!has_key && cfg.llm.base_url.is_none()) {
        tracing::warn!(provider = %provider, "No API key set or provider is mock, using Mock LLM");
        return Arc::new(MockLlmClient);
    }

    tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
    Arc::new(
        OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        )
        .with_request_timeout(cfg.llm.timeouts.request),
    )
}
