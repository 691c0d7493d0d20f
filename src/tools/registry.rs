//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters / execute），由 ToolRegistry 按名注册与查找。
//! 注册同名即覆盖（后注册者生效），并立即通过 describe_all 可见；动态安装路径在运行时注册，
//! 因此内部用 RwLock 提供 &self 注册。参数的 required/optional 是声明式元数据，
//! 类型字符串仅用于提示词文档，不做强制校验；值的转换由工具自身负责并以类型化错误失败。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::ToolSchema;

/// 工具参数声明：名称、提示词用类型标注、是否必填
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: &'static str,
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: &'static str, ty: &'static str) -> Self {
        Self {
            name,
            ty,
            required: true,
        }
    }

    pub fn optional(name: &'static str, ty: &'static str) -> Self {
        Self {
            name,
            ty,
            required: false,
        }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数声明、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 tool call 中的 "name" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数声明（有序）；默认无参数
    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    /// 执行工具；失败返回可读的错误描述，绝不 panic
    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，注册立即可见
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名覆盖（后注册者生效）
    pub fn register(&self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.write().unwrap().insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().unwrap().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().unwrap().contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// 校验参数对象：必须是 JSON 对象且包含所有必填参数；类型不做强制校验
    pub fn validate_args(tool: &dyn Tool, args: &Value) -> Result<(), String> {
        let obj = args
            .as_object()
            .ok_or_else(|| "arguments must be a JSON object".to_string())?;
        for param in tool.parameters() {
            if param.required && !obj.contains_key(param.name) {
                return Err(format!("missing required parameter '{}'", param.name));
            }
        }
        Ok(())
    }

    /// 生成提示词中的 Available tools 段落，按名称排序，标注每个参数的 required/optional
    pub fn describe_all(&self) -> String {
        let tools = self.tools.read().unwrap();
        if tools.is_empty() {
            return "No tools available.".to_string();
        }
        let mut names: Vec<&String> = tools.keys().collect();
        names.sort();
        let mut lines = vec!["Available tools:".to_string()];
        for name in names {
            let tool = &tools[name];
            lines.push(format!("\n- {}: {}", name, tool.description()));
            let params = tool.parameters();
            if !params.is_empty() {
                lines.push("  Parameters:".to_string());
                for p in params {
                    let required = if p.required { "required" } else { "optional" };
                    lines.push(format!("    - {} ({}): {}", p.name, p.ty, required));
                }
            }
        }
        lines.join("\n")
    }

    /// 为原生 function calling 生成工具 schema 列表
    pub fn to_llm_schemas(&self) -> Vec<ToolSchema> {
        let tools = self.tools.read().unwrap();
        let mut names: Vec<&String> = tools.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let tool = &tools[name];
                let mut properties = serde_json::Map::new();
                let mut required = Vec::new();
                for p in tool.parameters() {
                    properties.insert(p.name.to_string(), json!({ "type": p.ty }));
                    if p.required {
                        required.push(p.name.to_string());
                    }
                }
                ToolSchema {
                    name: name.clone(),
                    description: tool.description().to_string(),
                    parameters: json!({
                        "type": "object",
                        "properties": properties,
                        "required": required,
                    }),
                }
            })
            .collect()
    }
}
