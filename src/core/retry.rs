//! 有界重试策略
//!
//! 所有走网络的调用（LLM 补全、步骤生成）统一经过 RetryPolicy：固定间隔、最多 N 次；
//! 不可重试的错误（请求本身非法）立即返回，不消耗剩余次数。

use std::future::Future;
use std::time::Duration;

/// 错误是否值得重试（瞬时故障 vs 请求非法）
pub trait Retriable {
    fn is_retriable(&self) -> bool;
}

/// 固定间隔的有界重试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        E: Retriable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_with_hook(operation, |_, _| {}).await
    }

    /// 同 run；on_error(err, attempt) 在每次重试等待前调用，仅用于观测，不影响控制流
    pub async fn run_with_hook<T, E, F, Fut, H>(&self, mut operation: F, mut on_error: H) -> Result<T, E>
    where
        E: Retriable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        H: FnMut(&E, u32),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retriable() || attempt >= max_attempts => return Err(err),
                Err(err) => {
                    on_error(&err, attempt);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// 函数形式：retry(max_attempts, delay, operation, on_error)
pub async fn retry<T, E, F, Fut>(
    max_attempts: u32,
    delay: Duration,
    operation: F,
    on_error: Option<&mut (dyn FnMut(&E, u32) + Send)>,
) -> Result<T, E>
where
    E: Retriable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let policy = RetryPolicy::new(max_attempts, delay);
    match on_error {
        Some(hook) => policy.run_with_hook(operation, |e, n| hook(e, n)).await,
        None => policy.run(operation).await,
    }
}
