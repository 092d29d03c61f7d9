//! 图执行上下文：一个 run 内所有节点共享的依赖（模型、工具、技能、事件出口、取消令牌）
//!
//! 模型调用统一走 call_model / call_model_with_tools：发出 ModelStart / ModelEnd 事件，并与取消令牌竞速。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, Mode};
use crate::llm::{Completion, LlmClient};
use crate::memory::{Message, ToolCall};
use crate::react::parse::{parse_model_output, ModelOutput};
use crate::react::{EventSink, GraphEvent, Node, RouterConfig};
use crate::skills::{Skill, SkillLoader};
use crate::tools::ToolExecutor;

/// 提交请求中的覆盖项，优先于 Evaluator 的判定
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub mode: Option<Mode>,
    pub skill_id: Option<String>,
    pub account_id: Option<String>,
}

pub struct GraphContext {
    pub run_id: String,
    pub llm: Arc<dyn LlmClient>,
    pub tools: Arc<ToolExecutor>,
    pub skills: Arc<SkillLoader>,
    pub events: EventSink,
    pub cancel: CancellationToken,
    pub router: RouterConfig,
    pub overrides: Overrides,
    /// 单条工具结果写入状态前的截断长度
    pub tool_result_max_chars: usize,
}

impl GraphContext {
    /// 当前判定选中的技能
    pub async fn active_skill(&self, skill_id: Option<&str>) -> Option<Skill> {
        match skill_id {
            Some(id) => self.skills.get(id).await,
            None => None,
        }
    }

    async fn invoke(&self, node: Node, messages: &[Message]) -> Result<Completion, AgentError> {
        let model = self.llm.model_name().to_string();
        self.events.send(GraphEvent::ModelStart {
            node,
            model: model.clone(),
        });
        let reply = tokio::select! {
            _ = self.cancel.cancelled() => return Err(AgentError::Cancelled),
            r = self.llm.complete(messages) => r.map_err(AgentError::LlmError)?,
        };
        tracing::debug!(
            run_id = %self.run_id,
            node = %node,
            model = %model,
            prompt_tokens = reply.prompt_tokens,
            completion_tokens = reply.completion_tokens,
            "model call finished"
        );
        Ok(reply)
    }

    fn model_end(&self, node: Node, reply: &Completion, tool_calls: Vec<ToolCall>) {
        self.events.send(GraphEvent::ModelEnd {
            node,
            model: self.llm.model_name().to_string(),
            text: reply.text.clone(),
            tool_calls,
            prompt_tokens: reply.prompt_tokens,
            completion_tokens: reply.completion_tokens,
        });
    }

    /// 普通模型调用（Evaluator / Planner / Reflector）
    pub async fn call_model(&self, node: Node, messages: &[Message]) -> Result<String, AgentError> {
        let reply = self.invoke(node, messages).await?;
        self.model_end(node, &reply, Vec::new());
        Ok(reply.text)
    }

    /// 绑定工具的模型调用（Generator / Reviser），返回解析后的输出
    pub async fn call_model_with_tools(
        &self,
        node: Node,
        messages: &[Message],
        iteration: u32,
    ) -> Result<ModelOutput, AgentError> {
        let reply = self.invoke(node, messages).await?;
        let output = parse_model_output(&reply.text, iteration);
        let calls = match &output {
            ModelOutput::ToolCalls(calls) => calls.clone(),
            ModelOutput::Text(_) => Vec::new(),
        };
        self.model_end(node, &reply, calls);
        Ok(output)
    }
}
