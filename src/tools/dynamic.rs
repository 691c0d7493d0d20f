//! 动态工具安装
//!
//! 运行时新增工具的受控注册路径：候选工具必须先通过随附的自测（固定参数 + 期望断言）
//! 才会进入注册表；自测失败不触碰注册表。候选以 Tool trait 对象交付，
//! 不存在任何提交代码并直接求值的通道。

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;

use crate::tools::{Tool, ToolRegistry};

/// 自测期望
#[derive(Debug, Clone)]
pub enum Expectation {
    /// 结果必须与给定值相等
    Equals(Value),
    /// 序列化结果必须包含子串
    Contains(String),
}

/// 随候选工具提交的自测：一组固定参数与对结果的断言
#[derive(Debug, Clone)]
pub struct SelfTest {
    pub args: Value,
    pub expect: Expectation,
}

impl SelfTest {
    fn check(&self, value: &Value) -> Result<(), String> {
        match &self.expect {
            Expectation::Equals(expected) => {
                if value == expected {
                    Ok(())
                } else {
                    Err(format!("expected {expected}, got {value}"))
                }
            }
            Expectation::Contains(needle) => {
                let text = value.to_string();
                if text.contains(needle.as_str()) {
                    Ok(())
                } else {
                    Err(format!("result does not contain '{needle}'"))
                }
            }
        }
    }
}

/// 安装候选工具：限时运行自测，通过后注册（同名覆盖），失败时注册表保持原样
pub async fn install_tool(
    registry: &ToolRegistry,
    tool: Arc<dyn Tool>,
    test: SelfTest,
    test_timeout: Duration,
) -> Result<(), String> {
    let name = tool.name().to_string();
    let result = timeout(test_timeout, tool.execute(test.args.clone()))
        .await
        .map_err(|_| format!("self-test for '{name}' timed out"))?
        .map_err(|e| format!("self-test for '{name}' failed: {e}"))?;
    test.check(&result)
        .map_err(|e| format!("self-test for '{name}' failed: {e}"))?;

    registry.register_arc(tool);
    tracing::info!(tool = %name, "dynamic tool installed");
    Ok(())
}
