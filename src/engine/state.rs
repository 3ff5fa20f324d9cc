//! 动作引擎的数据模型：动作闭包、排队项、执行状态、执行结果

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::sync::oneshot;

type ActionBody = dyn Fn() -> BoxFuture<'static, Result<String, String>> + Send + Sync;

/// 零参数的副作用操作；可重复调用（恢复时会再次执行同一闭包）
#[derive(Clone)]
pub struct ActionFn(Arc<ActionBody>);

impl ActionFn {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        Self(Arc::new(move || -> BoxFuture<'static, Result<String, String>> { Box::pin(f()) }))
    }

    pub(crate) fn call(&self) -> BoxFuture<'static, Result<String, String>> {
        (self.0)()
    }

    pub(crate) fn downgrade(&self) -> Weak<ActionBody> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn is(&self, weak: &Weak<ActionBody>) -> bool {
        Weak::ptr_eq(weak, &Arc::downgrade(&self.0))
    }
}

impl std::fmt::Debug for ActionFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ActionFn(..)")
    }
}

/// run_action 的选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionOptions {
    /// 零表示不设截止时间
    pub timeout: Duration,
    /// 是否记入恢复槽，供之后恢复
    pub resume: bool,
}

impl ActionOptions {
    pub fn timeout_minutes(minutes: u64) -> Self {
        Self {
            timeout: Duration::from_secs(minutes.saturating_mul(60)),
            resume: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn resumable(mut self) -> Self {
        self.resume = true;
        self
    }
}

/// 队列中的一个待执行动作
pub struct QueuedAction {
    pub label: String,
    pub func: ActionFn,
    pub timeout: Duration,
    pub resume: bool,
    pub(crate) responder: oneshot::Sender<ActionResult>,
}

/// 被记住的可恢复动作
#[derive(Debug, Clone)]
pub struct ResumeSlot {
    pub label: String,
    pub func: ActionFn,
}

/// 引擎内部执行状态；每次终态迁移后执行字段复位，恢复槽单独管理
#[derive(Debug, Default)]
pub struct ExecutionState {
    pub executing: bool,
    pub current_label: Option<String>,
    /// 仅诊断用
    pub current_fn: Option<Weak<ActionBody>>,
    pub timed_out: bool,
    pub resume_slot: Option<ResumeSlot>,
}

impl ExecutionState {
    pub(crate) fn begin(&mut self, label: &str, func: &ActionFn) {
        self.executing = true;
        self.current_label = Some(label.to_string());
        self.current_fn = Some(func.downgrade());
        self.timed_out = false;
    }

    /// 复位执行字段，返回本次是否超时
    pub(crate) fn finish(&mut self) -> bool {
        let timed_out = self.timed_out;
        self.executing = false;
        self.current_label = None;
        self.current_fn = None;
        self.timed_out = false;
        timed_out
    }
}

/// 可序列化的状态快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSnapshot {
    pub executing: bool,
    pub current_label: Option<String>,
    pub timed_out: bool,
    pub resume_label: Option<String>,
    pub pending: usize,
}

/// 单个动作的执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: Option<String>,
    pub timed_out: bool,
    pub interrupted: bool,
}

impl ActionResult {
    pub fn success(output: impl Into<String>, timed_out: bool, interrupted: bool) -> Self {
        Self {
            success: true,
            message: Some(output.into()),
            timed_out,
            interrupted,
        }
    }

    pub fn failure(message: impl Into<String>, timed_out: bool, interrupted: bool) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            timed_out,
            interrupted,
        }
    }

    /// 未开始即被 stop() 或前序失败丢弃
    pub fn discarded(label: &str) -> Self {
        Self::failure(format!("{label} discarded before it started"), false, true)
    }

    /// 恢复条件不满足：什么都没执行（区别于真正的失败，message 为空）
    pub fn not_resumed() -> Self {
        Self {
            success: false,
            message: None,
            timed_out: false,
            interrupted: false,
        }
    }
}
