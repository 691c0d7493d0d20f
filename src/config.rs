//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FORGE__*` 覆盖（双下划线表示嵌套，如 `FORGE__LLM__MODEL=gpt-4o-mini`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub scratchpad: ScratchpadSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

/// [agent] 段：人设、迭代上限、历史预算、反思阈值
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 系统提示词人设（每回合确定性重建，不做原地修改）
    pub persona: String,
    /// 单回合 ReAct 迭代上限，防止死循环
    pub max_iterations: usize,
    /// 历史消息条数上限（超出后剪枝最旧的可裁剪消息）
    pub max_history_messages: usize,
    /// 历史估算 token 预算
    pub history_token_budget: usize,
    /// 置信度低于该值时自动触发一次反思重规划
    pub reflection_confidence_threshold: f64,
    /// 内联工具结果的最大字符数（超出截断）
    pub max_inline_result_chars: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            persona: "You are Forge, an elite autonomous agent known for rigorous reasoning."
                .to_string(),
            max_iterations: 10,
            max_history_messages: 20,
            history_token_budget: 12_000,
            reflection_confidence_threshold: 0.7,
            max_inline_result_chars: 12_000,
        }
    }
}

/// [scratchpad] 段：大结果转存策略（元素数 / 序列化字符数 / 转存 TTL）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScratchpadSection {
    /// 序列超过该元素数视为「大结果」
    pub max_seq_elements: usize,
    /// 序列化后超过该字符数视为「大结果」
    pub max_serialized_chars: usize,
    /// 自动转存条目的存活秒数
    pub offload_ttl_secs: u64,
}

impl Default for ScratchpadSection {
    fn default() -> Self {
        Self {
            max_seq_elements: 10,
            max_serialized_chars: 1000,
            offload_ttl_secs: 300,
        }
    }
}

/// [llm] 段：端点、模型、原生工具调用偏好与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: Option<String>,
    pub model: String,
    /// 首选原生 function calling；端点不支持时本会话内自动降级为文本抽取
    pub prefer_native_tools: bool,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "deepseek-chat".to_string(),
            prefer_native_tools: true,
            request_timeout_secs: 45,
            retry: RetrySection::default(),
        }
    }
}

/// [llm.retry] 段：瞬时错误（限流 / 连接失败）的指数退避
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

/// [tools] 段：单次工具调用超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 25,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent: AgentSection::default(),
            llm: LlmSection::default(),
            scratchpad: ScratchpadSection::default(),
            tools: ToolsSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 FORGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FORGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FORGE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
