//! OpenAI 兼容 API 补全网关
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。
//! 结构化输出的 schema 以附加 system 消息的形式注入，兼容不支持 response_format 的后端。

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{CompletionOptions, LlmClient, LlmError};
use crate::memory::{Message, Role};

/// OpenAI 兼容客户端：持有 Client 与默认 model 名
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    fn to_openai_messages(messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        messages
            .iter()
            .map(|m| {
                Ok(match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()?
                        .into(),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()?
                        .into(),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()?
                        .into(),
                })
            })
            .collect()
    }
}

fn map_openai_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::InvalidArgument(msg) => LlmError::InvalidRequest(msg),
        OpenAIError::ApiError(api) => LlmError::Api(api.message),
        other => LlmError::Network(other.to_string()),
    }
}

/// schema 存在时追加一条约束输出格式的 system 消息
fn with_schema_instruction(messages: &[Message], options: &CompletionOptions) -> Vec<Message> {
    let mut out = messages.to_vec();
    if let Some(schema) = &options.schema {
        out.push(Message::system(format!(
            "Respond with a single JSON value matching this JSON Schema, and nothing else:\n{schema}"
        )));
    }
    out
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message], options: &CompletionOptions) -> Result<String, LlmError> {
        let prepared = with_schema_instruction(messages, options);
        let model = options.model.as_deref().unwrap_or(&self.model);

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(model)
            .messages(Self::to_openai_messages(&prepared).map_err(map_openai_error)?);
        if let Some(temperature) = options.temperature {
            args.temperature(temperature);
        }
        let request = args.build().map_err(map_openai_error)?;

        tracing::debug!(route = %options.route, model, "completion request");
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                route = %options.route,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion usage"
            );
        }

        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_instruction_appended() {
        let opts = CompletionOptions::route("requirements")
            .with_schema(serde_json::json!({"type": "object"}));
        let out = with_schema_instruction(&[Message::user("goal")], &opts);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].role, Role::System);
        assert!(out[1].content.contains("\"type\":\"object\""));
    }

    #[test]
    fn test_no_schema_leaves_messages() {
        let out = with_schema_instruction(&[Message::user("goal")], &CompletionOptions::route("planning"));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_invalid_argument_maps_to_invalid_request() {
        let err = map_openai_error(OpenAIError::InvalidArgument("no model".into()));
        assert_eq!(err, LlmError::InvalidRequest("no model".into()));
    }
}
