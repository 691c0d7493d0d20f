//! Forge - Rust 自主智能体运行时
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型（工具级 / 回合级）
//! - **llm**: 补全服务客户端抽象与实现（OpenAI 兼容 / 重试装饰器 / Mock）
//! - **memory**: 消息、历史预算、Scratchpad、目标状态
//! - **react**: 工具调用抽取、自我反思、提示词组装、ReAct 主循环
//! - **tools**: 工具 trait、注册表、执行器、内置元工具、动态安装

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use react::{AgentConfig, AgentSession, TurnOutcome};
