//! 补全网关抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：complete(messages, options)。
//! LlmError 区分瞬时故障与非法请求，供 RetryPolicy 判断是否重试。

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::core::Retriable;
use crate::memory::Message;

/// 补全网关错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// 请求本身非法（参数、schema、鉴权），重试无意义
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),
}

impl Retriable for LlmError {
    fn is_retriable(&self) -> bool {
        !matches!(self, LlmError::InvalidRequest(_))
    }
}

/// 单次补全的选项
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompletionOptions {
    /// 调用路由（planning / classify / requirements），用于日志与后端选择
    pub route: String,
    /// 结构化输出的 JSON Schema
    pub schema: Option<serde_json::Value>,
    pub temperature: Option<f32>,
    /// 覆盖后端默认模型
    pub model: Option<String>,
}

impl CompletionOptions {
    pub fn route(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            ..Self::default()
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// 补全网关 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message], options: &CompletionOptions) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_invalid_request_is_final() {
        assert!(!LlmError::InvalidRequest("bad schema".into()).is_retriable());
        assert!(LlmError::RateLimited { retry_after_ms: 500 }.is_retriable());
        assert!(LlmError::Network("reset".into()).is_retriable());
        assert!(LlmError::Api("500".into()).is_retriable());
    }

    #[test]
    fn test_options_builder() {
        let opts = CompletionOptions::route("planning")
            .with_temperature(0.2)
            .with_model("gpt-4o-mini");
        assert_eq!(opts.route, "planning");
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.model.as_deref(), Some("gpt-4o-mini"));
        assert!(opts.schema.is_none());
    }
}
