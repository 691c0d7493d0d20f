//! 补全服务客户端抽象
//!
//! 所有后端实现 CompletionClient：输入角色标注的消息序列与可选工具 schema，
//! 返回自由文本或原生工具调用列表。错误按类别区分（连接 / 限流 / 请求格式 / 不支持工具 / 其它），
//! 供重试装饰器与会话的原生工具协商使用。

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::memory::Message;

/// 补全服务错误类别
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("connection failure: {0}")]
    Connection(String),

    #[error("rate limited")]
    RateLimited,

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// 端点不支持原生 function calling；会话收到后降级为文本抽取并记住该选择
    #[error("native tool calling unsupported by endpoint")]
    ToolsUnsupported,

    #[error("llm error: {0}")]
    Other(String),
}

impl LlmError {
    /// 瞬时错误（限流、连接失败）可按退避重试；其余类别立即上抛
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Connection(_) | LlmError::RateLimited)
    }
}

/// 传给端点的工具 schema（名称、描述、参数 JSON Schema）
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 端点原生返回的工具调用（arguments 为未解析的 JSON 字符串）
#[derive(Debug, Clone)]
pub struct NativeToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// 一次补全的结果：自由文本与（可能为空的）原生工具调用列表
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub content: String,
    pub tool_calls: Vec<NativeToolCall>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// 补全客户端 trait：tools 为 None 表示不携带工具 schema（纯文本模式）
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
    ) -> Result<Completion, LlmError>;
}
