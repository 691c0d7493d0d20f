//! LLM 层：补全服务客户端抽象与实现（OpenAI 兼容 / 重试装饰器 / Mock）

pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

pub use mock::{MockClient, MockReply};
pub use openai::{OpenAiClient, TokenUsage};
pub use retry::{RetryConfig, RetryingClient};
pub use traits::{Completion, CompletionClient, LlmError, NativeToolCall, ToolSchema};
