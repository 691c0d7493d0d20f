//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(name, args) 做名称解析、参数校验、限时执行，
//! 把各种失败映射为结构化 ToolError（UnknownTool / InvalidArguments / ExecutionFailed / Timeout）；
//! 每次调用输出结构化审计日志（JSON）。单个工具的内部故障在这里被捕获转换，绝不中止循环。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::ToolError;
use crate::tools::ToolRegistry;

/// 工具执行器：对每次调用施加超时，并将结果映射为 ToolError
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// 执行指定工具；未注册返回 UnknownTool，缺参返回 InvalidArguments，
    /// 超时返回 Timeout，工具自身失败转为 ExecutionFailed；输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: Value) -> Result<Value, ToolError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);

        let result = self.run(tool_name, args).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(_) => (true, "ok"),
            Err(ToolError::Timeout(_)) => (false, "timeout"),
            Err(ToolError::UnknownTool(_)) => (false, "unknown_tool"),
            Err(ToolError::InvalidArguments { .. }) => (false, "invalid_arguments"),
            Err(ToolError::ExecutionFailed(_)) => (false, "error"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }

    async fn run(&self, tool_name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;

        ToolRegistry::validate_args(tool.as_ref(), &args).map_err(|reason| {
            ToolError::InvalidArguments {
                tool: tool_name.to_string(),
                reason,
            }
        })?;

        match timeout(self.timeout, tool.execute(args)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ToolError::ExecutionFailed(e)),
            Err(_) => Err(ToolError::Timeout(tool_name.to_string())),
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ParamSpec, Tool};
    use async_trait::async_trait;
    use serde_json::json;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps forever"
        }
        async fn execute(&self, _args: Value) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn parameters(&self) -> Vec<ParamSpec> {
            vec![ParamSpec::required("input", "string")]
        }
        async fn execute(&self, _args: Value) -> Result<Value, String> {
            Err("boom".to_string())
        }
    }

    fn executor_with(tool: impl Tool + 'static, timeout_secs: u64) -> ToolExecutor {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(tool);
        ToolExecutor::new(registry, timeout_secs)
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let executor = executor_with(FailingTool, 5);
        let err = executor.execute("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_missing_argument() {
        let executor = executor_with(FailingTool, 5);
        let err = executor.execute("failing", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_execution_failure_wrapped() {
        let executor = executor_with(FailingTool, 5);
        let err = executor
            .execute("failing", json!({"input": "x"}))
            .await
            .unwrap_err();
        match err {
            ToolError::ExecutionFailed(msg) => assert_eq!(msg, "boom"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_yields_structured_error() {
        let executor = executor_with(SlowTool, 1);
        let err = executor.execute("slow", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
    }
}
