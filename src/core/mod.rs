//! 核心层：错误、Run 模型与触发元数据、运行执行器（沙箱、监管、凭证、事件记录、结果回送）

pub mod credentials;
pub mod error;
pub mod executor;
pub mod notifier;
pub mod recorder;
pub mod run;
pub mod sandbox;
pub mod supervisor;
pub mod trigger;

pub use credentials::{CredentialProvider, CredentialSession, EnvCredentialProvider, NoCredentials};
pub use error::AgentError;
pub use executor::{ExecutorConfig, RunDeps, RunExecutor, MISSING_TOOL_APPROVAL};
pub use notifier::{LogNotifier, Notification, Notifier};
pub use recorder::EventRecorder;
pub use run::{Clarification, Mode, Run, RunId, RunResult, RunStatus, TaskRequest};
pub use sandbox::RunSandbox;
pub use supervisor::{RunClaim, RunSupervisor};
pub use trigger::TriggerMetadata;
