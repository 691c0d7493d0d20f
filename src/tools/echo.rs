//! Echo 工具：回显输入文本，用于演示与连通性检查

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{ParamSpec, Tool};

pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo back the given text."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required("text", "string")]
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let text = args
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing text".to_string())?;
        Ok(Value::String(text.to_string()))
    }
}
