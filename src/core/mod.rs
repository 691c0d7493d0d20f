//! 核心层：工具级与回合级错误类型

pub mod error;

pub use error::{AgentError, ToolError};
