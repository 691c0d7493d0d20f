//! ReAct 循环集成测试：用脚本化 Mock 客户端驱动完整回合

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use forge::llm::{LlmError, MockClient, MockReply, NativeToolCall};
use forge::memory::Role;
use forge::react::AgentPhase;
use forge::tools::{ParamSpec, Tool};
use forge::{AgentConfig, AgentSession};

struct SumTwoTool;

#[async_trait]
impl Tool for SumTwoTool {
    fn name(&self) -> &str {
        "sum_two"
    }
    fn description(&self) -> &str {
        "Add two numbers."
    }
    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("a", "number"),
            ParamSpec::required("b", "number"),
        ]
    }
    async fn execute(&self, args: Value) -> Result<Value, String> {
        let a = args.get("a").and_then(Value::as_f64).ok_or("a must be a number")?;
        let b = args.get("b").and_then(Value::as_f64).ok_or("b must be a number")?;
        Ok(json!(a + b))
    }
}

struct FetchRowsTool;

#[async_trait]
impl Tool for FetchRowsTool {
    fn name(&self) -> &str {
        "fetch_rows"
    }
    fn description(&self) -> &str {
        "Fetch numeric rows."
    }
    async fn execute(&self, _args: Value) -> Result<Value, String> {
        let rows: Vec<i64> = (0..50).map(|i| i * 1000).collect();
        Ok(json!(rows))
    }
}

fn tool_call_text(name: &str, args: Value) -> String {
    format!("```json\n{{\"tool_call\": {{\"name\": \"{name}\", \"arguments\": {args}}}}}\n```")
}

fn session_with(mock: Arc<MockClient>, config: AgentConfig) -> AgentSession {
    let session = AgentSession::new(mock, config);
    session.registry().register(SumTwoTool);
    session.registry().register(FetchRowsTool);
    session
}

#[tokio::test]
async fn test_small_result_folded_inline() {
    let mock = Arc::new(MockClient::from_script(vec![
        MockReply::Text(tool_call_text("sum_two", json!({"a": 3379.5, "b": 0}))),
        MockReply::Text("Final Answer: the total is 3379.5".to_string()),
    ]));
    let session = session_with(mock.clone(), AgentConfig::default());

    let outcome = session.run_turn(Vec::new(), "add the numbers").await.unwrap();
    assert_eq!(outcome.phase, AgentPhase::FinalAnswer);
    assert_eq!(outcome.response, "the total is 3379.5");

    // 小结果内联折回：下一次 REASONING 的上下文里能看到字面值
    let tool_msg = outcome
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .unwrap();
    assert_eq!(tool_msg.tool_name.as_deref(), Some("sum_two"));
    assert!(tool_msg.content.contains("3379.5"));
    assert!(mock.call_saw(1, "3379.5"));
}

#[tokio::test]
async fn test_large_result_offloaded_to_scratchpad() {
    let mock = Arc::new(MockClient::from_script(vec![
        MockReply::Text(tool_call_text("fetch_rows", json!({}))),
        MockReply::Text("done".to_string()),
    ]));
    let session = session_with(mock.clone(), AgentConfig::default());

    let outcome = session.run_turn(Vec::new(), "fetch all rows").await.unwrap();
    let tool_msg = outcome
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .unwrap();

    // 指针文本：键 + 规模说明，而不是 50 行原始数据
    assert!(tool_msg.content.contains("sp_"));
    assert!(tool_msg.content.contains("50 elements"));
    assert!(!tool_msg.content.contains("41000"));
    assert!(!mock.call_saw(1, "41000"));

    // 键可以取回原值
    let key_start = tool_msg.content.find("sp_").unwrap();
    let key: String = tool_msg.content[key_start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    let stored = session.scratchpad().load(&key).unwrap();
    assert_eq!(stored.as_array().unwrap().len(), 50);
    assert_eq!(stored[41], json!(41000));
}

#[tokio::test]
async fn test_plain_prose_is_final_answer_on_first_iteration() {
    let mock = Arc::new(MockClient::from_script(vec![MockReply::Text(
        "The production total was within tolerance.".to_string(),
    )]));
    let session = session_with(mock, AgentConfig::default());

    let outcome = session.run_turn(Vec::new(), "how did production go?").await.unwrap();
    assert_eq!(outcome.phase, AgentPhase::FinalAnswer);
    assert_eq!(outcome.iterations, 0);
    assert_eq!(outcome.response, "The production total was within tolerance.");
}

#[tokio::test]
async fn test_iteration_ceiling_terminates_loop() {
    let call = tool_call_text("sum_two", json!({"a": 1, "b": 1}));
    let mock = Arc::new(MockClient::from_script(vec![
        MockReply::Text(call.clone()),
        MockReply::Text(call.clone()),
        MockReply::Text(call.clone()),
        MockReply::Text(call.clone()),
        MockReply::Text(call),
    ]));
    let config = AgentConfig {
        max_iterations: 3,
        ..AgentConfig::default()
    };
    let session = session_with(mock, config);

    let outcome = session.run_turn(Vec::new(), "loop forever").await.unwrap();
    assert_eq!(outcome.phase, AgentPhase::AbortedMaxIterations);
    assert_eq!(outcome.iterations, 3);
    assert!(outcome.response.contains("Iteration limit"));
}

#[tokio::test]
async fn test_self_reflect_prunes_history() {
    let mock = Arc::new(MockClient::from_script(vec![
        MockReply::Text(tool_call_text("sum_two", json!({"a": 1, "b": 2}))),
        MockReply::Text(tool_call_text(
            "self_reflect",
            json!({"critique": "wrong approach entirely", "new_plan": ["recount", "report"]}),
        )),
        MockReply::Text("fixed".to_string()),
    ]));
    let session = session_with(mock, AgentConfig::default());

    let outcome = session.run_turn(Vec::new(), "count things").await.unwrap();
    assert_eq!(outcome.phase, AgentPhase::FinalAnswer);

    // 反思把第一轮的 assistant/tool 消息全部剪除：
    // 剩 user + 合成注记 + 最终 assistant
    assert_eq!(outcome.messages.len(), 3);
    assert_eq!(outcome.messages[0].role, Role::User);
    assert_eq!(outcome.messages[1].role, Role::System);
    assert!(outcome.messages[1].content.contains("wrong approach entirely"));
    assert!(outcome.messages[1].content.contains("1. recount"));
    assert_eq!(outcome.messages[2].content, "fixed");
}

#[tokio::test]
async fn test_low_confidence_marker_triggers_reflection() {
    let mock = Arc::new(MockClient::from_script(vec![
        MockReply::Text("I think the answer is 7 but I am unsure. CONF=0.3".to_string()),
        MockReply::Text("After re-checking, the answer is 9. CONF=0.95".to_string()),
    ]));
    let session = session_with(mock, AgentConfig::default());

    let outcome = session.run_turn(Vec::new(), "compute").await.unwrap();
    assert_eq!(outcome.phase, AgentPhase::FinalAnswer);
    assert!(outcome.response.contains("the answer is 9"));
    // 低置信度那轮被剪掉，只留合成注记
    assert!(outcome
        .messages
        .iter()
        .any(|m| m.role == Role::System && m.content.contains("below threshold")));
    assert!(!outcome.messages.iter().any(|m| m.content.contains("CONF=0.3")));
    assert_eq!(session.goal_state().confidence, Some(0.95));
}

#[tokio::test]
async fn test_unknown_tool_surfaces_structured_error() {
    let mock = Arc::new(MockClient::from_script(vec![
        MockReply::Text(tool_call_text("made_up_tool", json!({}))),
        MockReply::Text("understood".to_string()),
    ]));
    let session = session_with(mock.clone(), AgentConfig::default());

    let outcome = session.run_turn(Vec::new(), "use a fake tool").await.unwrap();
    assert_eq!(outcome.phase, AgentPhase::FinalAnswer);
    let tool_msg = outcome
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .unwrap();
    assert!(tool_msg.content.contains("Unknown tool"));
    // 模型在下一轮能看到这个错误并自我纠正
    assert!(mock.call_saw(1, "Unknown tool"));
}

#[tokio::test]
async fn test_concurrent_calls_all_executed_in_order() {
    let two_calls = format!(
        "{}\nand\n{}",
        tool_call_text("sum_two", json!({"a": 1, "b": 2})),
        tool_call_text("sum_two", json!({"a": 10, "b": 20}))
    );
    let mock = Arc::new(MockClient::from_script(vec![
        MockReply::Text(two_calls),
        MockReply::Text("both done".to_string()),
    ]));
    let session = session_with(mock, AgentConfig::default());

    let outcome = session.run_turn(Vec::new(), "add twice").await.unwrap();
    let tool_msgs: Vec<_> = outcome
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .collect();
    assert_eq!(tool_msgs.len(), 2);
    assert!(tool_msgs[0].content.contains('3'));
    assert!(tool_msgs[1].content.contains("30"));
}

#[tokio::test]
async fn test_native_tool_calls_preferred_when_offered() {
    let mock = Arc::new(MockClient::from_script(vec![
        MockReply::Native(vec![NativeToolCall {
            id: "x1".to_string(),
            name: "sum_two".to_string(),
            arguments: "{\"a\": 1, \"b\": 2}".to_string(),
        }]),
        MockReply::Text("done".to_string()),
    ]));
    let session = session_with(mock.clone(), AgentConfig::default());

    let outcome = session.run_turn(Vec::new(), "add").await.unwrap();
    let tool_msg = outcome
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .unwrap();
    assert_eq!(tool_msg.call_id.as_deref(), Some("x1"));
    assert!(tool_msg.content.contains('3'));
    assert_eq!(*mock.seen_tools.lock().unwrap(), vec![true, true]);
}

#[tokio::test]
async fn test_tools_unsupported_downgrade_is_sticky() {
    let mock = Arc::new(MockClient::from_script(vec![
        MockReply::Fail(LlmError::ToolsUnsupported),
        MockReply::Text("hello".to_string()),
        MockReply::Text("again".to_string()),
    ]));
    let session = session_with(mock.clone(), AgentConfig::default());

    let first = session.run_turn(Vec::new(), "hi").await.unwrap();
    assert_eq!(first.response, "hello");
    let second = session.run_turn(first.messages, "hi again").await.unwrap();
    assert_eq!(second.response, "again");

    // 首次带 schema 被拒后立即降级重发；之后整个会话不再携带
    assert_eq!(*mock.seen_tools.lock().unwrap(), vec![true, false, false]);
}

#[tokio::test]
async fn test_transient_llm_failure_escalates_after_retries() {
    // MockClient 不做重试；回合级错误直接上抛（重试由 RetryingClient 装饰器负责，见其单测）
    let mock = Arc::new(MockClient::from_script(vec![MockReply::Fail(
        LlmError::Connection("refused".to_string()),
    )]));
    let session = session_with(mock, AgentConfig::default());
    let err = session.run_turn(Vec::new(), "hi").await.unwrap_err();
    assert!(err.to_string().contains("connection failure"));
}

#[tokio::test]
async fn test_cancelled_turn_aborts() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mock = Arc::new(MockClient::new());
    let session = AgentSession::new(mock, AgentConfig::default()).with_cancel_token(cancel);
    let err = session.run_turn(Vec::new(), "hi").await.unwrap_err();
    assert!(matches!(err, forge::core::AgentError::Cancelled));
}
