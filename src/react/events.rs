//! ReAct 过程事件：供前端展示步数、思考、工具调用、观察与反思

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// ReAct 步数更新（当前第几步）
    StepUpdate { step: usize, max_steps: usize },
    /// 正在调用 LLM 思考
    Thinking,
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    /// 大结果已转存 Scratchpad
    Offloaded {
        tool: String,
        key: String,
        size_hint: String,
    },
    /// 触发一次反思重规划（显式工具调用或低置信度自动触发）
    Reflection { critique: String },
    /// 最终回复
    FinalAnswer { text: String },
    /// 错误
    Error { text: String },
}
