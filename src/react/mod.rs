//! 编排层：状态、路由、各节点（Evaluator / Planner / Generator / Tools / Reflector / Reviser / Clarify / Final）、
//! 图驱动循环、审批中断与检查点

pub mod approval;
pub mod checkpoint;
pub mod context;
pub mod evaluator;
pub mod events;
pub mod generator;
pub mod loop_;
pub mod parse;
pub mod planner;
pub mod reflector;
pub mod reviser;
pub mod router;
pub mod state;
pub mod terminal;
pub mod tool_node;

pub use approval::{ApprovalRequest, Decision, DecisionKind, PendingToolCall};
pub use checkpoint::Checkpoint;
pub use context::{GraphContext, Overrides};
pub use events::{EventSink, GraphEvent};
pub use loop_::{Graph, GraphOutcome};
pub use parse::{parse_model_output, ModelOutput};
pub use router::{route, LoopStyle, Node, RouterConfig};
pub use state::{
    EvaluationMode, EvaluationVerdict, OrchestrationState, Plan, PlanStep, Reflection,
    StateUpdate, StepStatus, CATCH_ALL_STEP,
};
pub use tool_node::CANCELLED_BY_USER;
