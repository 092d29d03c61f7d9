//! 工具层：Tool trait、注册表、带超时与审计的执行器、沙箱文件工具、按 run 构建的工具集

pub mod echo;
pub mod executor;
pub mod filesystem;
pub mod provider;
pub mod registry;
pub mod schema;

pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use filesystem::{ListDirTool, ReadFileTool, SafeFs, WriteFileTool};
pub use provider::{SandboxToolset, ToolsetContext, ToolsetProvider};
pub use registry::{Tool, ToolRegistry};
pub use schema::tool_call_schema_json;
