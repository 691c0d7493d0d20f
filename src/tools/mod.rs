//! 工具箱：Tool trait、注册表、执行器、内置元工具与动态安装

pub mod builtin;
pub mod dynamic;
pub mod echo;
pub mod executor;
pub mod registry;
pub mod schema;

pub use builtin::register_builtin_tools;
pub use dynamic::{install_tool, Expectation, SelfTest};
pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use registry::{ParamSpec, Tool, ToolRegistry};
pub use schema::tool_call_schema_json;
