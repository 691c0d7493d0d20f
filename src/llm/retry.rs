//! 重试装饰器
//!
//! 包装任意 CompletionClient，对瞬时错误（限流 / 连接失败）按指数退避重试有限次数；
//! 每次均为全新请求，不续接部分响应。非瞬时错误立即上抛。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{Completion, CompletionClient, LlmError, ToolSchema};
use crate::memory::Message;

/// 重试参数：尝试次数上限与退避基数（第 n 次失败后等待 base * 2^n）
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

/// 重试客户端：组合在具体后端之外，循环内所有 LLM 调用经由它发出
pub struct RetryingClient {
    inner: Arc<dyn CompletionClient>,
    config: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn CompletionClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl CompletionClient for RetryingClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
    ) -> Result<Completion, LlmError> {
        let mut last_err = LlmError::Other("no attempts made".to_string());
        for attempt in 0..self.config.max_attempts {
            match self.inner.complete(messages, tools).await {
                Ok(completion) => return Ok(completion),
                Err(e) if e.is_transient() => {
                    let delay = self.config.base_delay_ms * (1u64 << attempt.min(16));
                    tracing::warn!(attempt, delay_ms = delay, error = %e, "llm transient error, backing off");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    last_err = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// 前 fail_times 次返回瞬时错误，之后成功
    struct FlakyClient {
        fail_times: u32,
        calls: AtomicU32,
        error: LlmError,
    }

    #[async_trait]
    impl CompletionClient for FlakyClient {
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: Option<&[ToolSchema]>,
        ) -> Result<Completion, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(self.error.clone())
            } else {
                Ok(Completion::text("ok"))
            }
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let flaky = Arc::new(FlakyClient {
            fail_times: 2,
            calls: AtomicU32::new(0),
            error: LlmError::RateLimited,
        });
        let client = RetryingClient::new(
            flaky.clone(),
            RetryConfig {
                max_attempts: 3,
                base_delay_ms: 1,
            },
        );
        let out = client.complete(&[], None).await.unwrap();
        assert_eq!(out.content, "ok");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_surface_last_error() {
        let flaky = Arc::new(FlakyClient {
            fail_times: 10,
            calls: AtomicU32::new(0),
            error: LlmError::Connection("refused".to_string()),
        });
        let client = RetryingClient::new(
            flaky.clone(),
            RetryConfig {
                max_attempts: 2,
                base_delay_ms: 1,
            },
        );
        let err = client.complete(&[], None).await.unwrap_err();
        assert!(matches!(err, LlmError::Connection(_)));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_transient_not_retried() {
        let flaky = Arc::new(FlakyClient {
            fail_times: 10,
            calls: AtomicU32::new(0),
            error: LlmError::ToolsUnsupported,
        });
        let client = RetryingClient::new(flaky.clone(), RetryConfig::default());
        let err = client.complete(&[], None).await.unwrap_err();
        assert!(matches!(err, LlmError::ToolsUnsupported));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }
}
