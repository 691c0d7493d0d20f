//! Agent 错误类型
//!
//! 分两层：ToolError 在单次工具调用内恢复（折入历史供模型自我纠正，不中止循环）；
//! AgentError 是回合级失败（重试耗尽的 LLM 错误、取消、配置错误），向上抛给调用方。

use thiserror::Error;

use crate::llm::LlmError;

/// 单次工具调用的结构化错误：作为结果折入历史，模型可据此调整，绝不使循环崩溃
#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    Timeout(String),
}

/// 回合级错误：整回合失败时向调用方抛出
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM 调用在重试耗尽后仍失败
    #[error("LLM request failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Cancelled by user")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),
}
