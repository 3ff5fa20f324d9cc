//! 带重试的补全网关装饰器
//!
//! 用 RetryPolicy 包装任意 LlmClient：瞬时故障按固定间隔重试，非法请求立即返回。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::RetryPolicy;
use crate::llm::{CompletionOptions, LlmClient, LlmError};
use crate::memory::Message;

/// 重试配置（来自 [llm] 段）
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            delay: policy.delay,
        }
    }
}

pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    policy: RetryPolicy,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self {
            inner,
            policy: RetryPolicy::new(config.max_attempts, config.delay),
        }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message], options: &CompletionOptions) -> Result<String, LlmError> {
        self.policy
            .run_with_hook(
                || self.inner.complete(messages, options),
                |err, attempt| {
                    tracing::warn!(route = %options.route, attempt, error = %err, "completion failed, retrying");
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_error("planning", LlmError::Network("reset".into()))
            .push_response("planning", "ok");
        let client = RetryingLlmClient::new(
            mock.clone(),
            RetryConfig {
                max_attempts: 3,
                delay: Duration::from_millis(50),
            },
        );
        let out = client
            .complete(&[Message::user("x")], &CompletionOptions::route("planning"))
            .await
            .unwrap();
        assert_eq!(out, "ok");
        assert_eq!(mock.call_count("planning"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_not_retried() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_error("planning", LlmError::InvalidRequest("bad".into()));
        let client = RetryingLlmClient::new(mock.clone(), RetryConfig::default());
        let err = client
            .complete(&[Message::user("x")], &CompletionOptions::route("planning"))
            .await
            .unwrap_err();
        assert_eq!(err, LlmError::InvalidRequest("bad".into()));
        assert_eq!(mock.call_count("planning"), 1);
    }
}
