//! 路由：节点枚举 + 纯函数 route，根据当前状态决定下一个节点
//!
//! 节点集合与迁移表是固定的；审批中断不在这里处理，由驱动循环在 →TOOLS 边上判断。

use serde::{Deserialize, Serialize};

use crate::core::Mode;
use crate::react::state::{EvaluationMode, OrchestrationState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Start,
    Evaluator,
    Planner,
    Clarify,
    Generate,
    Tools,
    Reflect,
    Revise,
    Final,
    End,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::Start => "start",
            Node::Evaluator => "evaluator",
            Node::Planner => "planner",
            Node::Clarify => "clarify",
            Node::Generate => "generate",
            Node::Tools => "tools",
            Node::Reflect => "reflect",
            Node::Revise => "revise",
            Node::Final => "final",
            Node::End => "end",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Node::End)
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// fast 模式下 REFLECT 未完成时的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopStyle {
    /// 回到 GENERATE
    #[default]
    React,
    /// 进入 REVISE
    Revise,
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub max_iterations: u32,
    pub loop_style: LoopStyle,
    /// 关闭自动审批时，进入 TOOLS 前挂起
    pub interrupt_before_tools: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            loop_style: LoopStyle::React,
            interrupt_before_tools: false,
        }
    }
}

/// 由当前节点与状态计算下一个节点
pub fn route(node: Node, state: &OrchestrationState, cfg: &RouterConfig) -> Node {
    let ceiling = state.iteration >= cfg.max_iterations;
    match node {
        Node::Start => Node::Evaluator,
        Node::Evaluator => match state.evaluation.as_ref().map(|v| v.mode) {
            Some(EvaluationMode::Plan) => Node::Planner,
            Some(EvaluationMode::Fast) | None => Node::Generate,
            Some(EvaluationMode::End) => Node::Clarify,
        },
        Node::Planner => Node::Generate,
        Node::Generate => {
            if state.has_pending_tool_calls() {
                return Node::Tools;
            }
            match state.mode() {
                Mode::Plan if state.iteration <= 1 => Node::Final,
                Mode::Plan => Node::Reflect,
                Mode::Fast if ceiling => Node::End,
                Mode::Fast => Node::Reflect,
            }
        }
        Node::Tools => {
            if ceiling {
                Node::Reflect
            } else {
                Node::Generate
            }
        }
        Node::Reflect => match state.mode() {
            Mode::Plan if state.is_complete || ceiling => Node::Final,
            Mode::Plan => Node::Generate,
            Mode::Fast if state.is_complete => Node::End,
            Mode::Fast => match cfg.loop_style {
                LoopStyle::Revise => Node::Revise,
                LoopStyle::React => Node::Generate,
            },
        },
        Node::Revise => {
            if state.has_pending_tool_calls() {
                Node::Tools
            } else {
                Node::Reflect
            }
        }
        Node::Clarify | Node::Final | Node::End => Node::End,
    }
}
