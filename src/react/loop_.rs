//! ReAct 主循环
//!
//! 单一规范状态机：REASONING -> TOOL_DISPATCH -> OBSERVING -> REASONING，
//! 终态 FINAL_ANSWER 与 ABORTED_MAX_ITERATIONS。同一回合由一个 AgentSession::run_turn
//! 驱动到完成，历史与目标状态无并发写者；一条回复中的多个工具调用并发扇出执行，
//! 单调用超时由执行器负责，卡死的工具不会拖住其它调用。端点是否支持原生 function calling
//! 在首次失败时协商一次并在会话内记住，之后透明走文本抽取。

use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{AgentError, ToolError};
use crate::llm::{Completion, CompletionClient, LlmError, NativeToolCall};
use crate::memory::{GoalState, HistoryBudgeter, Message, OffloadPolicy, ScratchPad};
use crate::react::reflection::ReflectArgs;
use crate::react::{
    build_system_prompt, AgentEvent, SelfReflectionController, ToolCallExtractor, ToolCallRequest,
};
use crate::tools::builtin::SELF_REFLECT_TOOL;
use crate::tools::{register_builtin_tools, ToolExecutor, ToolRegistry};

/// 状态机状态（终态随 TurnOutcome 返回）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Reasoning,
    ToolDispatch,
    Observing,
    FinalAnswer,
    AbortedMaxIterations,
}

/// 回合结果：最终回复、产出的消息序列与到达的终态
#[derive(Debug)]
pub struct TurnOutcome {
    pub response: String,
    pub messages: Vec<Message>,
    pub phase: AgentPhase,
    pub iterations: usize,
}

/// 会话配置：人设、各项预算与策略，显式传入构造函数，提示词每轮确定性重建
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub persona: String,
    pub max_iterations: usize,
    pub max_history_messages: usize,
    pub history_token_budget: usize,
    pub reflection_confidence_threshold: f64,
    pub max_inline_result_chars: usize,
    pub prefer_native_tools: bool,
    pub tool_timeout_secs: u64,
    pub offload: OffloadPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

impl AgentConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            persona: cfg.agent.persona.clone(),
            max_iterations: cfg.agent.max_iterations,
            max_history_messages: cfg.agent.max_history_messages,
            history_token_budget: cfg.agent.history_token_budget,
            reflection_confidence_threshold: cfg.agent.reflection_confidence_threshold,
            max_inline_result_chars: cfg.agent.max_inline_result_chars,
            prefer_native_tools: cfg.llm.prefer_native_tools,
            tool_timeout_secs: cfg.tools.tool_timeout_secs,
            offload: OffloadPolicy {
                max_seq_elements: cfg.scratchpad.max_seq_elements,
                max_serialized_chars: cfg.scratchpad.max_serialized_chars,
                offload_ttl: std::time::Duration::from_secs(cfg.scratchpad.offload_ttl_secs),
            },
        }
    }
}

/// Agent 会话：组合补全客户端、注册表、执行器、Scratchpad、目标状态与各控制器
pub struct AgentSession {
    llm: Arc<dyn CompletionClient>,
    registry: Arc<ToolRegistry>,
    executor: ToolExecutor,
    scratchpad: Arc<ScratchPad>,
    goal: Arc<Mutex<GoalState>>,
    budgeter: HistoryBudgeter,
    reflection: SelfReflectionController,
    extractor: ToolCallExtractor,
    config: AgentConfig,
    /// 原生工具协商结果：None 未知，Some(false) 表示端点不支持（会话内记住，不再重试协商）
    native_tools: Mutex<Option<bool>>,
    cancel: CancellationToken,
    event_tx: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl AgentSession {
    /// 创建会话：注册内置元工具；领域工具通过 registry() 继续注册
    pub fn new(llm: Arc<dyn CompletionClient>, config: AgentConfig) -> Self {
        let registry = Arc::new(ToolRegistry::new());
        let scratchpad = Arc::new(ScratchPad::new());
        let goal = Arc::new(Mutex::new(GoalState::default()));
        register_builtin_tools(&registry, scratchpad.clone(), goal.clone());

        Self {
            llm,
            executor: ToolExecutor::new(registry.clone(), config.tool_timeout_secs),
            registry,
            scratchpad,
            goal,
            budgeter: HistoryBudgeter::new(
                config.max_history_messages,
                config.history_token_budget,
            ),
            reflection: SelfReflectionController::new(config.reflection_confidence_threshold),
            extractor: ToolCallExtractor::new(),
            config,
            native_tools: Mutex::new(None),
            cancel: CancellationToken::new(),
            event_tx: None,
        }
    }

    /// 设置取消令牌（用户中止会传播到在途的补全请求与工具调用）
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 设置过程事件通道
    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn scratchpad(&self) -> &Arc<ScratchPad> {
        &self.scratchpad
    }

    pub fn goal_state(&self) -> GoalState {
        self.goal.lock().unwrap().clone()
    }

    fn send_event(&self, event: AgentEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// 驱动一个用户输入到完成：返回最终回复，或迭代上限触发的「已达上限」通告。
    /// history 为既有对话（不含 system prompt），回合产出的消息随 TurnOutcome 交回调用方持久化。
    pub async fn run_turn(
        &self,
        history: Vec<Message>,
        user_input: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let mut history = history;
        history.push(Message::user(user_input));
        self.goal.lock().unwrap().reset(user_input);

        let max = self.config.max_iterations;
        let mut iterations = 0usize;

        loop {
            self.send_event(AgentEvent::StepUpdate {
                step: iterations,
                max_steps: max,
            });
            if self.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            if iterations >= max {
                let summary = self.goal.lock().unwrap().summary();
                let mut response = format!(
                    "Iteration limit ({max}) reached before a final answer was produced."
                );
                if !summary.is_empty() {
                    response.push_str(&format!(" Progress so far: {summary}"));
                }
                return Ok(TurnOutcome {
                    response,
                    messages: history,
                    phase: AgentPhase::AbortedMaxIterations,
                    iterations,
                });
            }

            // REASONING：剪枝 + 确定性重建 system prompt + 一次补全
            self.budgeter.trim(&mut history);
            let goal_snapshot = self.goal.lock().unwrap().clone();
            let system =
                build_system_prompt(&self.config.persona, &self.registry, &goal_snapshot);
            let mut messages = vec![Message::system(system)];
            messages.extend(history.iter().cloned());

            self.send_event(AgentEvent::Thinking);
            let completion = self.request_completion(&messages).await?;

            let (requests, assistant_text) = if !completion.tool_calls.is_empty() {
                *self.native_tools.lock().unwrap() = Some(true);
                let reqs: Vec<ToolCallRequest> = completion
                    .tool_calls
                    .iter()
                    .map(native_to_request)
                    .collect();
                let text = if completion.content.is_empty() {
                    render_native_calls(&reqs)
                } else {
                    completion.content.clone()
                };
                (reqs, text)
            } else {
                (
                    self.extractor.extract(&completion.content, &self.registry),
                    completion.content.clone(),
                )
            };
            history.push(Message::assistant(assistant_text));

            // 显式置信度标记：记入目标状态，低于阈值时自动合成一次反思
            if let Some(conf) = self.reflection.detect_confidence(&completion.content) {
                self.goal.lock().unwrap().confidence = Some(conf);
                if self.reflection.is_low_confidence(conf) {
                    let critique = format!("Confidence {conf} is below threshold");
                    self.send_event(AgentEvent::Reflection {
                        critique: critique.clone(),
                    });
                    self.reflection.apply(&mut history, &critique, &[]);
                    iterations += 1;
                    continue;
                }
            }

            // 无工具调用 -> 终态 FINAL_ANSWER
            if requests.is_empty() {
                let response = strip_final_wrapper(&completion.content);
                self.send_event(AgentEvent::FinalAnswer {
                    text: response.clone(),
                });
                return Ok(TurnOutcome {
                    response,
                    messages: history,
                    phase: AgentPhase::FinalAnswer,
                    iterations,
                });
            }

            // 反思哨兵：在派发前拦截，剪除历史并注入注记后重新规划。
            // 同回复中的其它调用随被剪除的上下文一并丢弃。
            if let Some(req) = requests.iter().find(|r| r.name == SELF_REFLECT_TOOL) {
                let args: ReflectArgs = serde_json::from_value(req.arguments.clone())
                    .unwrap_or_else(|_| ReflectArgs {
                        critique: "(unspecified)".to_string(),
                        new_plan: Vec::new(),
                    });
                self.send_event(AgentEvent::Reflection {
                    critique: args.critique.clone(),
                });
                self.reflection.apply(&mut history, &args.critique, &args.new_plan);
                iterations += 1;
                continue;
            }

            // TOOL_DISPATCH：并发扇出；join 等待全部结果或各自超时，取消令牌可整体中止
            for req in &requests {
                self.send_event(AgentEvent::ToolCall {
                    tool: req.name.clone(),
                    args: req.arguments.clone(),
                });
            }
            let dispatch = join_all(
                requests
                    .iter()
                    .map(|req| self.executor.execute(&req.name, req.arguments.clone())),
            );
            let results: Vec<Result<Value, ToolError>> = tokio::select! {
                _ = self.cancel.cancelled() => return Err(AgentError::Cancelled),
                results = dispatch => results,
            };

            // OBSERVING：折回历史，大结果转存 Scratchpad
            for (req, result) in requests.iter().zip(results) {
                let content = self.fold_result(req, result);
                let preview: String = content.chars().take(200).collect();
                self.send_event(AgentEvent::Observation {
                    tool: req.name.clone(),
                    preview,
                });
                history.push(Message::tool(&req.name, &req.call_id, content));
            }
            iterations += 1;
        }
    }

    /// 一次补全请求：原生工具 schema 按协商状态决定是否携带；
    /// 端点拒绝工具参数时降级重发并在会话内记住，之后不再协商
    async fn request_completion(&self, messages: &[Message]) -> Result<Completion, AgentError> {
        let want_native = {
            let remembered = self.native_tools.lock().unwrap();
            self.config.prefer_native_tools && remembered.unwrap_or(true)
        };
        let schemas = if want_native {
            Some(self.registry.to_llm_schemas())
        } else {
            None
        };

        let result = tokio::select! {
            _ = self.cancel.cancelled() => return Err(AgentError::Cancelled),
            r = self.llm.complete(messages, schemas.as_deref()) => r,
        };

        match result {
            Ok(completion) => Ok(completion),
            Err(LlmError::ToolsUnsupported) if want_native => {
                *self.native_tools.lock().unwrap() = Some(false);
                tracing::info!(
                    "endpoint rejected native tool calling, using text extraction for this session"
                );
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(AgentError::Cancelled),
                    r = self.llm.complete(messages, None) => r.map_err(AgentError::Llm),
                }
            }
            Err(e) => Err(AgentError::Llm(e)),
        }
    }

    /// 把单个工具结果折成历史消息内容：
    /// 成功且大 -> 转存并留指针文本；成功且小 -> 内联（超长截断）；失败 -> 结构化错误 JSON
    fn fold_result(&self, req: &ToolCallRequest, result: Result<Value, ToolError>) -> String {
        match result {
            Ok(value) => {
                if self.config.offload.is_large(&value) {
                    let size_hint = describe_size(&value);
                    let key = self
                        .scratchpad
                        .store(value, Some(self.config.offload.offload_ttl));
                    self.send_event(AgentEvent::Offloaded {
                        tool: req.name.clone(),
                        key: key.clone(),
                        size_hint: size_hint.clone(),
                    });
                    format!(
                        "Result saved to scratchpad under key '{key}' ({size_hint}). \
                         Use load_from_scratchpad to retrieve it."
                    )
                } else {
                    let mut s = serde_json::to_string(&value)
                        .unwrap_or_else(|_| "(unserializable result)".to_string());
                    if s.len() > self.config.max_inline_result_chars {
                        s = format!(
                            "{}...",
                            s.chars()
                                .take(self.config.max_inline_result_chars)
                                .collect::<String>()
                        );
                    }
                    s
                }
            }
            Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
        }
    }
}

/// 原生工具调用转抽取请求：arguments 字符串解析失败时套用同一组文本修复
fn native_to_request(call: &NativeToolCall) -> ToolCallRequest {
    let arguments = serde_json::from_str::<Value>(&call.arguments)
        .ok()
        .or_else(|| {
            let cleaned = call
                .arguments
                .replace('\u{0}', "")
                .trim()
                .trim_end_matches(',')
                .to_string();
            serde_json::from_str::<Value>(&cleaned).ok()
        })
        .unwrap_or(Value::Null);
    let mut req = ToolCallRequest::new(call.name.clone(), arguments);
    if !call.id.is_empty() {
        req.call_id = call.id.clone();
    }
    req
}

/// 原生调用在历史中的文字表示（content 为空时使用）
fn render_native_calls(requests: &[ToolCallRequest]) -> String {
    requests
        .iter()
        .map(|r| format!("Tool call: {}({})", r.name, r.arguments))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 去掉最终回复外层的「最终答案」包装（```final 围栏或 Final Answer: 前缀）
fn strip_final_wrapper(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```final") {
        let inner = rest.trim_start_matches(['\n', '\r']);
        let inner = inner.strip_suffix("```").unwrap_or(inner);
        return inner.trim().to_string();
    }
    for prefix in ["Final Answer:", "FINAL ANSWER:", "Final answer:"] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return rest.trim().to_string();
        }
    }
    trimmed.to_string()
}

/// 结果规模的简短描述，写入指针文本
fn describe_size(value: &Value) -> String {
    match value {
        Value::Array(arr) => format!("{} elements", arr.len()),
        other => format!(
            "{} chars",
            serde_json::to_string(other).map(|s| s.len()).unwrap_or(0)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_final_wrapper() {
        assert_eq!(strip_final_wrapper("plain text"), "plain text");
        assert_eq!(strip_final_wrapper("Final Answer: 42"), "42");
        assert_eq!(strip_final_wrapper("```final\nthe answer\n```"), "the answer");
    }

    #[test]
    fn test_describe_size() {
        assert_eq!(describe_size(&json!([1, 2, 3])), "3 elements");
        assert!(describe_size(&json!("abc")).ends_with("chars"));
    }

    #[test]
    fn test_native_to_request_repairs_arguments() {
        let call = NativeToolCall {
            id: "abc".to_string(),
            name: "echo".to_string(),
            arguments: "{\"text\": \"hi\"}".to_string(),
        };
        let req = native_to_request(&call);
        assert_eq!(req.call_id, "abc");
        assert_eq!(req.arguments, json!({"text": "hi"}));

        let broken = NativeToolCall {
            id: String::new(),
            name: "echo".to_string(),
            arguments: "not json".to_string(),
        };
        let req = native_to_request(&broken);
        assert_eq!(req.arguments, Value::Null);
        assert!(req.call_id.starts_with("call_"));
    }
}
