//! 补全网关层：客户端抽象与实现（OpenAI 兼容 / Mock / 重试装饰器）

pub mod mock;
pub mod openai;
pub mod retrying;
pub mod traits;

pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use retrying::{RetryConfig, RetryingLlmClient};
pub use traits::{CompletionOptions, LlmClient, LlmError};
