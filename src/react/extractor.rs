//! 工具调用抽取：从自由文本中恢复结构化调用请求
//!
//! 上游文本是「自然语言 + 数据」的混合体，不保证格式良好。抽取器按优先级尝试一串识别策略
//! （```json 围栏块 → 花括号平衡扫描 → 模型专有的标记分隔格式），每个候选块解析失败时
//! 先做有限的文本修复（去尾逗号、转义字符串内换行、重建数据查询调用）再各重试一次。
//! 什么都认不出来就返回空列表：抽取失败降级为「无工具调用」，绝不向上抛错。

use regex::Regex;
use serde_json::Value;

use crate::tools::ToolRegistry;

/// 抽取出的结构化调用请求（短生命周期：循环当轮消费）
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: format!("call_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
            name: name.into(),
            arguments,
        }
    }
}

/// 单个识别策略；按注册顺序尝试，首个给出结果者生效
pub trait ExtractStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, text: &str, registry: &ToolRegistry) -> Vec<ToolCallRequest>;
}

/// 策略链：围栏块 → 花括号扫描 → 标记分隔格式
pub struct ToolCallExtractor {
    strategies: Vec<Box<dyn ExtractStrategy>>,
}

impl Default for ToolCallExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolCallExtractor {
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Box::new(FencedBlockStrategy::new()),
                Box::new(BraceScanStrategy),
                Box::new(TaggedMarkerStrategy),
            ],
        }
    }

    /// 追加自定义识别策略（排在内置策略之后）
    pub fn with_strategy(mut self, strategy: Box<dyn ExtractStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// 依次尝试各策略；全部失败返回空列表（不是错误）
    pub fn extract(&self, text: &str, registry: &ToolRegistry) -> Vec<ToolCallRequest> {
        for strategy in &self.strategies {
            let requests = strategy.extract(text, registry);
            if !requests.is_empty() {
                tracing::debug!(
                    strategy = strategy.name(),
                    count = requests.len(),
                    "tool calls extracted"
                );
                return requests;
            }
        }
        Vec::new()
    }
}

/// 两种识别形状：{"tool_call": {"name", "arguments"}} 包装，或顶层 {"name", "arguments"}
fn recognize(value: &Value) -> Option<(String, Value)> {
    if let Some(tc) = value.get("tool_call") {
        let name = tc.get("name")?.as_str()?;
        let arguments = tc.get("arguments")?.clone();
        return Some((name.to_string(), arguments));
    }
    let name = value.get("name")?.as_str()?;
    let arguments = value.get("arguments")?.clone();
    Some((name.to_string(), arguments))
}

/// 解析一个候选块：直接解析失败后按序应用各修复并各重试一次
fn parse_candidate(block: &str) -> Option<(String, Value)> {
    if let Ok(v) = serde_json::from_str::<Value>(block) {
        if let Some(found) = recognize(&v) {
            return Some(found);
        }
        return None; // 合法 JSON 但不是工具调用形状
    }

    let mut repaired_forms = vec![
        repair::strip_trailing_commas(block),
        repair::escape_newlines_in_strings(block),
        repair::strip_trailing_commas(&repair::escape_newlines_in_strings(block)),
    ];
    if let Some(rebuilt) = repair::rebuild_query_call(block) {
        repaired_forms.push(rebuilt);
    }

    for form in repaired_forms {
        if let Ok(v) = serde_json::from_str::<Value>(&form) {
            if let Some(found) = recognize(&v) {
                tracing::debug!("tool call recovered after textual repair");
                return Some(found);
            }
        }
    }
    None
}

/// 策略 1：```json 围栏块（支持一条回复内多个块）
struct FencedBlockStrategy {
    fence_re: Regex,
}

impl FencedBlockStrategy {
    fn new() -> Self {
        Self {
            fence_re: Regex::new(r"(?is)```json\s*(\{.*?\})\s*```").expect("fence regex"),
        }
    }
}

impl ExtractStrategy for FencedBlockStrategy {
    fn name(&self) -> &'static str {
        "fenced_block"
    }

    fn extract(&self, text: &str, _registry: &ToolRegistry) -> Vec<ToolCallRequest> {
        self.fence_re
            .captures_iter(text)
            .filter_map(|cap| parse_candidate(cap.get(1).unwrap().as_str()))
            .map(|(name, arguments)| ToolCallRequest::new(name, arguments))
            .collect()
    }
}

/// 策略 2：全文平衡花括号扫描（模型省略围栏时的兜底）
struct BraceScanStrategy;

impl ExtractStrategy for BraceScanStrategy {
    fn name(&self) -> &'static str {
        "brace_scan"
    }

    fn extract(&self, text: &str, _registry: &ToolRegistry) -> Vec<ToolCallRequest> {
        balanced_objects(text)
            .into_iter()
            .filter_map(parse_candidate)
            .map(|(name, arguments)| ToolCallRequest::new(name, arguments))
            .collect()
    }
}

/// DeepSeek 风格的推理/工具分隔标记
const TOOL_CALL_BEGIN: &str = "<｜tool▁call▁begin｜>";
const TOOL_CALL_END: &str = "<｜tool▁call▁end｜>";
const TOOL_SEP: &str = "<｜tool▁sep｜>";

/// 策略 3：标记分隔格式 `<｜tool▁call▁begin｜>kind<｜tool▁sep｜>name\n<payload><｜tool▁call▁end｜>`；
/// 名称 token 需已注册才视为工具调用，payload 即参数对象本身
struct TaggedMarkerStrategy;

impl ExtractStrategy for TaggedMarkerStrategy {
    fn name(&self) -> &'static str {
        "tagged_marker"
    }

    fn extract(&self, text: &str, registry: &ToolRegistry) -> Vec<ToolCallRequest> {
        let mut requests = Vec::new();
        for segment in text.split(TOOL_CALL_BEGIN).skip(1) {
            let body = segment.split(TOOL_CALL_END).next().unwrap_or(segment);
            let Some(after_sep) = body.split(TOOL_SEP).nth(1) else {
                continue;
            };
            let name = after_sep
                .lines()
                .next()
                .unwrap_or("")
                .trim()
                .trim_matches('`');
            if name.is_empty() || !registry.contains(name) {
                continue;
            }
            let payload = &after_sep[after_sep.find('\n').map(|i| i + 1).unwrap_or(0)..];
            let Some(block) = balanced_objects(payload).into_iter().next() else {
                continue;
            };
            // payload 可能是参数对象本身，也可能套了一层识别形状
            if let Some((inner_name, arguments)) = parse_candidate(block) {
                requests.push(ToolCallRequest::new(inner_name, arguments));
            } else if let Ok(arguments) = serde_json::from_str::<Value>(block) {
                requests.push(ToolCallRequest::new(name, arguments));
            } else if let Ok(arguments) =
                serde_json::from_str::<Value>(&repair::strip_trailing_commas(
                    &repair::escape_newlines_in_strings(block),
                ))
            {
                requests.push(ToolCallRequest::new(name, arguments));
            }
        }
        requests
    }
}

/// 找出文本中所有顶层的平衡 {...} 片段（跳过字符串内的花括号）
fn balanced_objects(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find('{') {
        let start = search_from + rel;
        match matching_brace(text, start) {
            Some(end) => {
                out.push(&text[start..=end]);
                search_from = end + 1;
            }
            None => search_from = start + 1,
        }
    }
    out
}

fn matching_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// 有限文本修复：每种修复只做一次、只重试一次解析
mod repair {
    use regex::Regex;
    use std::sync::OnceLock;

    /// 去掉 } 或 ] 前的尾逗号
    pub fn strip_trailing_commas(block: &str) -> String {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| Regex::new(r",\s*([}\]])").expect("comma regex"));
        re.replace_all(block, "$1").into_owned()
    }

    /// 把字符串值内部的裸换行转为 \n 转义
    pub fn escape_newlines_in_strings(block: &str) -> String {
        let mut out = String::with_capacity(block.len());
        let mut in_string = false;
        let mut escaped = false;
        for c in block.chars() {
            if in_string {
                if escaped {
                    escaped = false;
                    out.push(c);
                    continue;
                }
                match c {
                    '\\' => {
                        escaped = true;
                        out.push(c);
                    }
                    '"' => {
                        in_string = false;
                        out.push(c);
                    }
                    '\n' => out.push_str("\\n"),
                    '\r' => {}
                    _ => out.push(c),
                }
            } else {
                if c == '"' {
                    in_string = true;
                }
                out.push(c);
            }
        }
        out
    }

    /// 数据查询调用的专用重建：多行 query 参数把块撑坏时，
    /// 取 "query": " 之后到块内最后一个引号为值（丢弃闭引号后的残片），重发为规范块
    pub fn rebuild_query_call(block: &str) -> Option<String> {
        static NAME_RE: OnceLock<Regex> = OnceLock::new();
        static QUERY_RE: OnceLock<Regex> = OnceLock::new();
        let name_re =
            NAME_RE.get_or_init(|| Regex::new(r#""name"\s*:\s*"([A-Za-z0-9_]+)""#).expect("name regex"));
        let query_re =
            QUERY_RE.get_or_init(|| Regex::new(r#""query"\s*:\s*""#).expect("query regex"));

        let name = name_re.captures(block)?.get(1)?.as_str().to_string();
        let value_start = query_re.find(block)?.end();
        let rest = &block[value_start..];
        let value_end = rest.rfind('"')?;
        let raw = &rest[..value_end];

        let escaped = raw
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
            .replace('\r', "");
        Some(format!(
            r#"{{"name": "{}", "arguments": {{"query": "{}"}}}}"#,
            name, escaped
        ))
    }
}
