//! ReAct 层：工具调用抽取、自我反思、提示词组装、过程事件与主循环

pub mod events;
pub mod extractor;
pub mod loop_;
pub mod prompt;
pub mod reflection;

pub use events::AgentEvent;
pub use extractor::{ExtractStrategy, ToolCallExtractor, ToolCallRequest};
pub use loop_::{AgentConfig, AgentPhase, AgentSession, TurnOutcome};
pub use prompt::build_system_prompt;
pub use reflection::SelfReflectionController;
