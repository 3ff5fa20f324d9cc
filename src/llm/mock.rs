//! Mock 补全网关（用于测试与离线演练，无需 API）
//!
//! 按 route 预置应答队列；队列耗尽后返回该 route 的默认应答，没有默认应答时返回 "[]"。
//! 每次调用都会被记录，便于断言调用次数与提示内容。

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::llm::{CompletionOptions, LlmClient, LlmError};
use crate::memory::Message;

/// 一次被记录的调用
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub route: String,
    pub messages: Vec<Message>,
}

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<Result<String, LlmError>>>,
    defaults: HashMap<String, String>,
    calls: Vec<RecordedCall>,
}

/// 脚本化的 Mock 客户端
#[derive(Default)]
pub struct MockLlmClient {
    script: Mutex<Script>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 追加一条应答（按调用顺序消费）
    pub fn push_response(&self, route: &str, content: impl Into<String>) -> &Self {
        self.script()
            .queued
            .entry(route.to_string())
            .or_default()
            .push_back(Ok(content.into()));
        self
    }

    pub fn push_error(&self, route: &str, err: LlmError) -> &Self {
        self.script()
            .queued
            .entry(route.to_string())
            .or_default()
            .push_back(Err(err));
        self
    }

    /// 队列耗尽后的默认应答
    pub fn set_default(&self, route: &str, content: impl Into<String>) -> &Self {
        self.script()
            .defaults
            .insert(route.to_string(), content.into());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.script().calls.clone()
    }

    pub fn call_count(&self, route: &str) -> usize {
        self.script().calls.iter().filter(|c| c.route == route).count()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message], options: &CompletionOptions) -> Result<String, LlmError> {
        let mut script = self.script();
        script.calls.push(RecordedCall {
            route: options.route.clone(),
            messages: messages.to_vec(),
        });
        if let Some(next) = script
            .queued
            .get_mut(&options.route)
            .and_then(|q| q.pop_front())
        {
            return next;
        }
        Ok(script
            .defaults
            .get(&options.route)
            .cloned()
            .unwrap_or_else(|| "[]".to_string()))
    }
}
