//! 记忆层：编排状态中只追加的对话历史

pub mod conversation;

pub use conversation::{Message, Role, ToolCall};
