//! 技能系统
//!
//! 技能（Skill）是一段能力描述加一个可选的工具白名单。Evaluator 从技能目录中挑选，
//! Generator 把能力描述拼进上下文，Tool Invoker 按白名单拦截越权调用。
//!
//! 目录结构：
//! ```text
//! skills/
//! ├── s3_inventory/
//! │   ├── skill.toml      # 技能元数据（id / name / description / tools）
//! │   └── capability.md   # 能力描述
//! └── ...
//! ```

mod loader;

pub use loader::{Skill, SkillCache, SkillLoader, SkillMeta};
