//! 内置元工具
//!
//! 每个会话默认注册：update_goal_state（目标状态的唯一修改入口）、
//! save_to_scratchpad / load_from_scratchpad（显式暂存与取回）、
//! self_reflect（反思哨兵，由循环拦截，不按普通工具折回结果）。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::memory::{GoalState, GoalUpdate, ScratchPad};
use crate::tools::{ParamSpec, Tool, ToolRegistry};

/// 反思哨兵工具名：循环在派发前拦截该调用
pub const SELF_REFLECT_TOOL: &str = "self_reflect";

/// 注册全部内置元工具
pub fn register_builtin_tools(
    registry: &ToolRegistry,
    scratchpad: Arc<ScratchPad>,
    goal: Arc<Mutex<GoalState>>,
) {
    registry.register(UpdateGoalStateTool { goal });
    registry.register(SaveToScratchpadTool {
        scratchpad: scratchpad.clone(),
    });
    registry.register(LoadFromScratchpadTool { scratchpad });
    registry.register(SelfReflectTool);
}

/// 更新或查询目标状态
struct UpdateGoalStateTool {
    goal: Arc<Mutex<GoalState>>,
}

#[async_trait]
impl Tool for UpdateGoalStateTool {
    fn name(&self) -> &str {
        "update_goal_state"
    }

    fn description(&self) -> &str {
        "Update or query the current goal state (plan, completed steps, key findings, confidence)."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::optional("original_request", "string"),
            ParamSpec::optional("plan", "array"),
            ParamSpec::optional("completed_step", "string"),
            ParamSpec::optional("finding_key", "string"),
            ParamSpec::optional("finding_value", "any"),
            ParamSpec::optional("confidence", "number"),
        ]
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let update: GoalUpdate =
            serde_json::from_value(args).map_err(|e| format!("bad goal update: {e}"))?;
        let mut goal = self.goal.lock().unwrap();
        goal.apply(update);
        serde_json::to_value(&*goal).map_err(|e| e.to_string())
    }
}

/// 显式存入 Scratchpad，返回键
struct SaveToScratchpadTool {
    scratchpad: Arc<ScratchPad>,
}

#[async_trait]
impl Tool for SaveToScratchpadTool {
    fn name(&self) -> &str {
        "save_to_scratchpad"
    }

    fn description(&self) -> &str {
        "Persist a value in the scratchpad and return its key."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("value", "any"),
            ParamSpec::optional("ttl_s", "integer"),
        ]
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let value = args
            .get("value")
            .cloned()
            .ok_or_else(|| "missing value".to_string())?;
        let ttl = args
            .get("ttl_s")
            .and_then(Value::as_u64)
            .map(Duration::from_secs);
        let key = self.scratchpad.store(value, ttl);
        Ok(json!({ "key": key }))
    }
}

/// 按键取回 Scratchpad 中的值；不存在或已过期即失败
struct LoadFromScratchpadTool {
    scratchpad: Arc<ScratchPad>,
}

#[async_trait]
impl Tool for LoadFromScratchpadTool {
    fn name(&self) -> &str {
        "load_from_scratchpad"
    }

    fn description(&self) -> &str {
        "Retrieve a value from the scratchpad by its key."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required("key", "string")]
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let key = args
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing key".to_string())?;
        self.scratchpad
            .load(key)
            .ok_or_else(|| format!("{key} not found or expired"))
    }
}

/// 反思哨兵：正常路径下由循环拦截，execute 仅作为兜底返回元标记
struct SelfReflectTool;

#[async_trait]
impl Tool for SelfReflectTool {
    fn name(&self) -> &str {
        SELF_REFLECT_TOOL
    }

    fn description(&self) -> &str {
        "Self-reflect when stuck: critique the current approach and propose a new plan."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("critique", "string"),
            ParamSpec::required("new_plan", "array"),
        ]
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        Ok(json!({
            "meta": "reflect",
            "critique": args.get("critique").cloned().unwrap_or(Value::Null),
            "plan": args.get("new_plan").cloned().unwrap_or(Value::Null),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<ToolRegistry>, Arc<ScratchPad>, Arc<Mutex<GoalState>>) {
        let registry = Arc::new(ToolRegistry::new());
        let scratchpad = Arc::new(ScratchPad::new());
        let goal = Arc::new(Mutex::new(GoalState::default()));
        register_builtin_tools(&registry, scratchpad.clone(), goal.clone());
        (registry, scratchpad, goal)
    }

    #[tokio::test]
    async fn test_builtins_registered() {
        let (registry, _, _) = setup();
        for name in [
            "update_goal_state",
            "save_to_scratchpad",
            "load_from_scratchpad",
            SELF_REFLECT_TOOL,
        ] {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[tokio::test]
    async fn test_update_goal_state_mutates_shared_state() {
        let (registry, _, goal) = setup();
        let tool = registry.get("update_goal_state").unwrap();
        tool.execute(json!({
            "plan": ["a", "b"],
            "finding_key": "total",
            "finding_value": 42,
        }))
        .await
        .unwrap();
        let goal = goal.lock().unwrap();
        assert_eq!(goal.plan, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(goal.key_findings.get("total"), Some(&"42".to_string()));
    }

    #[tokio::test]
    async fn test_scratchpad_roundtrip_via_tools() {
        let (registry, _, _) = setup();
        let save = registry.get("save_to_scratchpad").unwrap();
        let out = save.execute(json!({"value": [1, 2, 3]})).await.unwrap();
        let key = out["key"].as_str().unwrap().to_string();

        let load = registry.get("load_from_scratchpad").unwrap();
        let value = load.execute(json!({ "key": key })).await.unwrap();
        assert_eq!(value, json!([1, 2, 3]));

        let missing = load.execute(json!({"key": "sp_00000000"})).await;
        assert!(missing.is_err());
    }
}
