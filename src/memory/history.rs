//! 历史预算：滑动窗口剪枝
//!
//! 双重上限：消息条数与估算 token 预算，超出任一项即从最旧的可裁剪消息开始丢弃。
//! 开头的 System 消息与最近一条 User 消息永不丢弃。不做语义摘要；重要结论
//! 应当已经外化进目标状态的 key_findings 或 Scratchpad。

use crate::memory::{Message, Role};

/// Token 估算器（简单的字符计数近似）
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量
    /// 使用简单的启发式规则：英文约 4 字符/token，非 ASCII 约 1.5 字符/token
    pub fn estimate(text: &str) -> usize {
        let mut ascii_chars = 0usize;
        let mut non_ascii_chars = 0usize;
        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }
        let tokens = ascii_chars / 4 + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }
}

/// 历史预算器：trim 就地丢弃最旧的可裁剪消息直到两个上限都满足
#[derive(Debug, Clone)]
pub struct HistoryBudgeter {
    max_messages: usize,
    token_budget: usize,
}

impl HistoryBudgeter {
    pub fn new(max_messages: usize, token_budget: usize) -> Self {
        Self {
            max_messages,
            token_budget,
        }
    }

    fn total_tokens(messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| TokenEstimator::estimate(&m.content))
            .sum()
    }

    /// 消息 i 是否受保护：开头连续的 System 段，或最近一条 User 消息
    fn protected(messages: &[Message], i: usize) -> bool {
        let leading_system_end = messages
            .iter()
            .position(|m| m.role != Role::System)
            .unwrap_or(messages.len());
        if i < leading_system_end {
            return true;
        }
        let last_user = messages.iter().rposition(|m| m.role == Role::User);
        last_user == Some(i)
    }

    /// 就地剪枝；返回丢弃的消息条数
    pub fn trim(&self, messages: &mut Vec<Message>) -> usize {
        let mut dropped = 0;
        loop {
            let over_count = messages.len() > self.max_messages;
            let over_budget = Self::total_tokens(messages) > self.token_budget;
            if !over_count && !over_budget {
                break;
            }
            let victim = (0..messages.len()).find(|&i| !Self::protected(messages, i));
            match victim {
                Some(i) => {
                    messages.remove(i);
                    dropped += 1;
                }
                None => break, // 只剩受保护消息，无可裁剪
            }
        }
        if dropped > 0 {
            tracing::debug!(dropped, remaining = messages.len(), "history trimmed");
        }
        dropped
    }
}
