//! 目标状态：当前任务的计划、已完成步骤与关键发现
//!
//! 每个顶层用户请求重置一次，跨同一回合的多次迭代持续存在；
//! 只通过 update_goal_state 工具修改。拼入 system prompt 供规划参考，
//! 也是历史剪枝前沉淀重要结论的去处。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 目标状态
#[derive(Clone, Debug, Default, Serialize)]
pub struct GoalState {
    pub original_request: String,
    pub plan: Vec<String>,
    pub completed_steps: Vec<String>,
    pub key_findings: BTreeMap<String, String>,
    pub confidence: Option<f64>,
}

/// update_goal_state 工具的参数：所有字段可选，给出即应用
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GoalUpdate {
    pub original_request: Option<String>,
    pub plan: Option<Vec<String>>,
    pub completed_step: Option<String>,
    pub finding_key: Option<String>,
    pub finding_value: Option<Value>,
    pub confidence: Option<f64>,
}

impl GoalState {
    /// 新顶层请求：清空计划与发现，记录原始请求
    pub fn reset(&mut self, request: &str) {
        *self = GoalState {
            original_request: request.to_string(),
            ..GoalState::default()
        };
    }

    /// 应用一次更新（update_goal_state 工具的唯一修改入口）
    pub fn apply(&mut self, update: GoalUpdate) {
        if let Some(req) = update.original_request {
            self.original_request = req;
        }
        if let Some(plan) = update.plan {
            self.plan = plan;
        }
        if let Some(step) = update.completed_step {
            self.completed_steps.push(step);
        }
        if let (Some(key), Some(value)) = (update.finding_key, update.finding_value) {
            let note = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            self.key_findings.insert(key, note);
        }
        if let Some(conf) = update.confidence {
            self.confidence = Some(conf);
        }
    }

    /// 构建拼入 system prompt 的片段（Current Goal / Plan / Completed / Key Findings）
    pub fn to_prompt_section(&self) -> String {
        if self.original_request.is_empty() {
            return String::new();
        }
        let mut s = String::new();
        s.push_str(&format!("## Current Goal\n{}\n\n", self.original_request));
        if !self.plan.is_empty() {
            s.push_str("## Plan\n");
            for (i, step) in self.plan.iter().enumerate() {
                s.push_str(&format!("{}. {}\n", i + 1, step));
            }
            s.push('\n');
        }
        if !self.completed_steps.is_empty() {
            s.push_str("## Completed\n");
            for step in &self.completed_steps {
                s.push_str(&format!("- {}\n", step));
            }
            s.push('\n');
        }
        if !self.key_findings.is_empty() {
            s.push_str("## Key Findings\n");
            for (k, v) in &self.key_findings {
                s.push_str(&format!("- {}: {}\n", k, v));
            }
            s.push('\n');
        }
        s
    }

    /// 迭代上限触发时的简要总结（随「已达上限」提示一并返回）
    pub fn summary(&self) -> String {
        let mut s = String::new();
        if !self.plan.is_empty() {
            s.push_str(&format!(
                "Plan so far: {}. ",
                self.plan.join("; ")
            ));
        }
        if !self.completed_steps.is_empty() {
            s.push_str(&format!(
                "Completed: {}. ",
                self.completed_steps.join("; ")
            ));
        }
        if !self.key_findings.is_empty() {
            let findings: Vec<String> = self
                .key_findings
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            s.push_str(&format!("Findings: {}.", findings.join(", ")));
        }
        s.trim_end().to_string()
    }
}
