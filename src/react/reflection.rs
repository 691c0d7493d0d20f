//! 自我反思与重规划
//!
//! self_reflect 是一个哨兵调用：不把结果按普通工具折回，而是（a）取出 critique 与 new_plan，
//! （b）丢弃最近一条 User 消息之后的全部历史，（c）追加一条总结批评与新计划的合成 System 注记，
//! （d）回到 REASONING。反思计入迭代上限（策略见 DESIGN.md），保证最坏情况仍会终止。
//! 另外，模型文本中出现低于阈值的显式置信度标记（CONF=x.y）时，即使没有显式调用
//! 也自动合成一次等价的反思。

use regex::Regex;
use serde::Deserialize;

use crate::memory::{Message, Role};

/// self_reflect 工具的参数
#[derive(Debug, Clone, Deserialize)]
pub struct ReflectArgs {
    pub critique: String,
    #[serde(default)]
    pub new_plan: Vec<String>,
}

/// 反思控制器：置信度门限 + 历史剪除与注记注入
pub struct SelfReflectionController {
    confidence_threshold: f64,
    confidence_re: Regex,
}

impl SelfReflectionController {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
            confidence_re: Regex::new(r"CONF\s*=\s*([0-9]*\.?[0-9]+)").expect("conf regex"),
        }
    }

    /// 在模型文本中寻找显式置信度标记，返回解析到的值
    pub fn detect_confidence(&self, text: &str) -> Option<f64> {
        self.confidence_re
            .captures(text)
            .and_then(|cap| cap.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    }

    /// 置信度是否低到需要自动反思
    pub fn is_low_confidence(&self, conf: f64) -> bool {
        conf < self.confidence_threshold
    }

    /// 执行一次反思：截断到最近一条 User 消息为止，再追加一条合成 System 注记
    pub fn apply(&self, history: &mut Vec<Message>, critique: &str, new_plan: &[String]) {
        if let Some(last_user) = history.iter().rposition(|m| m.role == Role::User) {
            history.truncate(last_user + 1);
        }
        let plan_text = if new_plan.is_empty() {
            "Re-examine the task and proceed more carefully.".to_string()
        } else {
            new_plan
                .iter()
                .enumerate()
                .map(|(i, s)| format!("{}. {}", i + 1, s))
                .collect::<Vec<_>>()
                .join("\n")
        };
        history.push(Message::system(format!(
            "Reflection note: the previous approach was judged insufficient.\nCritique: {}\nNew plan:\n{}",
            critique, plan_text
        )));
        tracing::info!(critique = %critique, "reflection applied, history pruned");
    }
}
