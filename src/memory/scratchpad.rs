//! Scratchpad：带 TTL 的键值暂存
//!
//! 工具产出的大结果不直接进入对话历史，而是存入 Scratchpad 并以短指针文本替代，
//! 使发回补全服务的上下文与工具输出规模无关。键由随机后缀生成（sp_ + uuid 前 8 位），
//! 条目写入后不再修改，并发 store 不会冲突。过期条目在读取时惰性清除，不做主动扫描。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

struct ScratchEntry {
    value: Value,
    expires_at: Option<Instant>,
}

/// 带 TTL 的键值暂存；store 总是成功并返回全新键，load 对过期条目表现为不存在
#[derive(Default)]
pub struct ScratchPad {
    entries: Mutex<HashMap<String, ScratchEntry>>,
}

impl ScratchPad {
    pub fn new() -> Self {
        Self::default()
    }

    /// 存入并返回新键；ttl 为 None 表示不过期
    pub fn store(&self, value: Value, ttl: Option<Duration>) -> String {
        let key = format!("sp_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let entry = ScratchEntry {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        self.entries.lock().unwrap().insert(key.clone(), entry);
        key
    }

    /// 读取；不存在或已过期返回 None（过期条目顺带清除）
    pub fn load(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().unwrap();
        let expired = match entries.get(key) {
            Some(e) => matches!(e.expires_at, Some(t) if t < Instant::now()),
            None => return None,
        };
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|e| e.value.clone())
    }

    /// 显式清空（如会话重置）
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 大结果判定策略：序列元素数或序列化字符数超限即转存
#[derive(Debug, Clone)]
pub struct OffloadPolicy {
    pub max_seq_elements: usize,
    pub max_serialized_chars: usize,
    pub offload_ttl: Duration,
}

impl Default for OffloadPolicy {
    fn default() -> Self {
        Self {
            max_seq_elements: 10,
            max_serialized_chars: 1000,
            offload_ttl: Duration::from_secs(300),
        }
    }
}

impl OffloadPolicy {
    /// 是否应转存：数组超过 max_seq_elements 个元素，或序列化超过 max_serialized_chars 字符
    pub fn is_large(&self, value: &Value) -> bool {
        if let Some(arr) = value.as_array() {
            if arr.len() > self.max_seq_elements {
                return true;
            }
        }
        serde_json::to_string(value)
            .map(|s| s.len() > self.max_serialized_chars)
            .unwrap_or(false)
    }
}
