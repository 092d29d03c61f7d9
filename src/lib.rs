//! Nucleus - 运维智能体编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、Run 生命周期、RunExecutor（沙箱、取消、凭证、事件记录、回送）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）
//! - **memory**: 对话消息
//! - **observability**: tracing 初始化
//! - **react**: 状态机：Evaluator、Planner、Generator、Tools、Reflector、Reviser 与路由、审批、检查点
//! - **skills**: 技能目录（skill.toml + capability.md）
//! - **store**: Run / 事件 / 检查点存储（内存 / SQLite）
//! - **tools**: 工具 trait、注册表、执行器与沙箱文件工具

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod skills;
pub mod store;
pub mod tools;
