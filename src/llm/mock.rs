//! Mock 补全客户端（用于测试，无需 API）
//!
//! 按脚本顺序吐出预置回复（文本 / 原生工具调用 / 错误），并记录每次收到的消息
//! 与是否携带工具 schema，便于断言提示词组装与原生工具协商行为。
//! 脚本耗尽后回显最后一条 User 消息。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{Completion, CompletionClient, LlmError, NativeToolCall, ToolSchema};
use crate::memory::{Message, Role};

/// 一条脚本回复
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 自由文本回复
    Text(String),
    /// 原生工具调用回复
    Native(Vec<NativeToolCall>),
    /// 返回错误
    Fail(LlmError),
}

/// 脚本化 Mock 客户端
#[derive(Default)]
pub struct MockClient {
    script: Mutex<VecDeque<MockReply>>,
    /// 每次调用收到的完整消息序列
    pub seen_messages: Mutex<Vec<Vec<Message>>>,
    /// 每次调用是否携带工具 schema
    pub seen_tools: Mutex<Vec<bool>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_script(replies: Vec<MockReply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            seen_messages: Mutex::new(Vec::new()),
            seen_tools: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: MockReply) {
        self.script.lock().unwrap().push_back(reply);
    }

    /// 第 n 次调用收到的消息中是否包含子串（跨所有角色）
    pub fn call_saw(&self, call_index: usize, needle: &str) -> bool {
        self.seen_messages
            .lock()
            .unwrap()
            .get(call_index)
            .map(|msgs| msgs.iter().any(|m| m.content.contains(needle)))
            .unwrap_or(false)
    }
}

#[async_trait]
impl CompletionClient for MockClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
    ) -> Result<Completion, LlmError> {
        self.seen_messages.lock().unwrap().push(messages.to_vec());
        self.seen_tools.lock().unwrap().push(tools.is_some());

        match self.script.lock().unwrap().pop_front() {
            Some(MockReply::Text(t)) => Ok(Completion::text(t)),
            Some(MockReply::Native(calls)) => Ok(Completion {
                content: String::new(),
                tool_calls: calls,
            }),
            Some(MockReply::Fail(e)) => Err(e),
            None => {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| matches!(m.role, Role::User))
                    .map(|m| m.content.as_str())
                    .unwrap_or("(no input)");
                Ok(Completion::text(format!("Echo from Mock: {}", last_user)))
            }
        }
    }
}
