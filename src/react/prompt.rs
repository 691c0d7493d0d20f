//! 提示词组装
//!
//! system prompt = 人设 + 工具目录 + 调用格式约定 + 目标状态片段。
//! 每次 REASONING 进入时确定性重建，不做原地修改；工具目录直接来自注册表，
//! 注册变更（含动态安装）立即反映在下一次组装中。

use crate::memory::GoalState;
use crate::tools::{tool_call_schema_json, ToolRegistry};

/// 组装完整 system prompt
pub fn build_system_prompt(persona: &str, registry: &ToolRegistry, goal: &GoalState) -> String {
    let mut s = String::new();
    s.push_str(persona);
    s.push_str("\n\n### Tools\n");
    s.push_str(&registry.describe_all());
    s.push_str("\n\n### Tool Calling\n");
    s.push_str(
        "Tools are available via native function calling (if supported) or via a JSON fallback.\n\
         When using the fallback, reply with exactly one fenced block per call:\n\
         ```json\n{\"tool_call\": {\"name\": \"<tool_name>\", \"arguments\": {...}}}\n```\n\
         The block must conform to this schema:\n",
    );
    s.push_str(&tool_call_schema_json());
    s.push_str(
        "\n\nWhen you are done, reply with plain text only (no JSON block). \
         You may state your confidence as `CONF=<0..1>`.\n",
    );

    let goal_section = goal.to_prompt_section();
    if !goal_section.is_empty() {
        s.push_str("\n\n");
        s.push_str(&goal_section);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::GoalUpdate;
    use crate::tools::EchoTool;

    #[test]
    fn test_prompt_contains_catalog_and_goal() {
        let registry = ToolRegistry::new();
        registry.register(EchoTool);
        let mut goal = GoalState::default();
        goal.reset("count the rows");
        goal.apply(GoalUpdate {
            finding_key: Some("rows".into()),
            finding_value: Some(serde_json::json!(42)),
            ..Default::default()
        });

        let prompt = build_system_prompt("You are Forge.", &registry, &goal);
        assert!(prompt.starts_with("You are Forge."));
        assert!(prompt.contains("- echo: Echo back the given text."));
        assert!(prompt.contains("tool_call"));
        assert!(prompt.contains("## Current Goal"));
        assert!(prompt.contains("rows: 42"));
    }

    #[test]
    fn test_registration_visible_in_next_build() {
        let registry = ToolRegistry::new();
        let goal = GoalState::default();
        let before = build_system_prompt("p", &registry, &goal);
        assert!(!before.contains("- echo"));
        registry.register(EchoTool);
        let after = build_system_prompt("p", &registry, &goal);
        assert!(after.contains("- echo"));
    }
}
