//! 动作执行引擎
//!
//! 单飞：任意时刻最多一个动作在执行。run_action 把动作放进 FIFO 队列，由唯一的 worker 任务
//! 依次取出执行；调用方通过 oneshot 只等待自己那一个动作的结果，不轮询。
//!
//! 取消只有协作式：stop() 拉起中断信号并丢弃尚未开始的排队动作，正在执行的动作不会被强杀，
//! 需要动作体自己观察信号退出。截止时间到达同样只是「请求」停止，不保证按时结束。
//!
//! 失败策略：动作体报错即为该动作终态（引擎不重试），同时清空恢复槽并丢弃同批次的其余排队动作。

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core::{AgentEvent, EventSink};
use crate::engine::state::{
    ActionFn, ActionOptions, ActionResult, ExecutionSnapshot, ExecutionState, QueuedAction, ResumeSlot,
};
use crate::world::InterruptSignal;

struct EngineInner {
    queue: Mutex<VecDeque<QueuedAction>>,
    state: Mutex<ExecutionState>,
    wake: Notify,
    interrupt: InterruptSignal,
    events: EventSink,
}

impl EngineInner {
    fn queue(&self) -> MutexGuard<'_, VecDeque<QueuedAction>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> MutexGuard<'_, ExecutionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 拉起中断并丢弃所有未开始的动作
    fn stop(&self) {
        self.interrupt.raise();
        let discarded: Vec<QueuedAction> = self.queue().drain(..).collect();
        if discarded.is_empty() {
            return;
        }
        warn!(count = discarded.len(), "discarding queued actions");
        self.events.emit(AgentEvent::ActionsDiscarded {
            count: discarded.len(),
        });
        for action in discarded {
            let _ = action.responder.send(ActionResult::discarded(&action.label));
        }
    }

    fn on_timeout(&self, label: &str, timeout: Duration) {
        self.state().timed_out = true;
        warn!(label, timeout_secs = timeout.as_secs(), "action timed out, requesting stop");
        self.events.emit(AgentEvent::ActionTimedOut {
            label: label.to_string(),
            timeout_secs: timeout.as_secs(),
        });
        self.stop();
    }

    async fn execute(&self, label: &str, func: &ActionFn, timeout: Duration) -> ActionResult {
        self.interrupt.clear();
        self.state().begin(label, func);
        self.events.emit(AgentEvent::ActionStarted {
            label: label.to_string(),
        });
        info!(label, "executing action");

        let body = AssertUnwindSafe(func.call()).catch_unwind();
        tokio::pin!(body);
        let outcome = if timeout.is_zero() {
            body.await
        } else {
            tokio::select! {
                out = &mut body => out,
                _ = tokio::time::sleep(timeout) => {
                    self.on_timeout(label, timeout);
                    body.await
                }
            }
        };
        let outcome = outcome.unwrap_or_else(|panic| Err(panic_message(panic)));

        let timed_out = self.state().finish();
        let interrupted = self.interrupt.is_raised();
        let result = match outcome {
            Ok(output) => {
                info!(label, timed_out, "action finished");
                ActionResult::success(output, timed_out, interrupted)
            }
            Err(err) => {
                warn!(label, error = %err, "action failed");
                self.state().resume_slot = None;
                self.stop();
                ActionResult::failure(format!("{label} failed: {err}"), timed_out, interrupted)
            }
        };
        self.events.emit(AgentEvent::ActionFinished {
            label: label.to_string(),
            success: result.success,
        });
        result
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

async fn run_worker(inner: Arc<EngineInner>) {
    loop {
        let next = inner.queue().pop_front();
        match next {
            Some(QueuedAction {
                label,
                func,
                timeout,
                responder,
                ..
            }) => {
                let result = inner.execute(&label, &func, timeout).await;
                let _ = responder.send(result);
            }
            None => inner.wake.notified().await,
        }
    }
}

/// 单飞动作引擎；创建时在当前 tokio 运行时上启动 worker，drop 时停止
pub struct ActionEngine {
    inner: Arc<EngineInner>,
    worker: JoinHandle<()>,
}

impl ActionEngine {
    pub fn new(interrupt: InterruptSignal) -> Self {
        Self::with_events(interrupt, EventSink::default())
    }

    pub fn with_events(interrupt: InterruptSignal, events: EventSink) -> Self {
        let inner = Arc::new(EngineInner {
            queue: Mutex::new(VecDeque::new()),
            state: Mutex::new(ExecutionState::default()),
            wake: Notify::new(),
            interrupt,
            events,
        });
        let worker = tokio::spawn(run_worker(inner.clone()));
        Self { inner, worker }
    }

    pub fn interrupt(&self) -> &InterruptSignal {
        &self.inner.interrupt
    }

    /// 排队执行一个动作，等到它本身被执行（或被丢弃）后返回
    pub async fn run_action(&self, label: impl Into<String>, func: ActionFn, options: ActionOptions) -> ActionResult {
        let label = label.into();
        if options.resume {
            return self.resume_action(Some((label, func)), options).await;
        }
        self.enqueue(label, func, options).await
    }

    /// 恢复动作：传入的 (label, func) 覆盖恢复槽；只有恢复槽存在且本次确实传入了新闭包才执行，
    /// 否则什么都不做并返回 {success:false, message:None}
    pub async fn resume_action(&self, work: Option<(String, ActionFn)>, options: ActionOptions) -> ActionResult {
        let fresh = work.is_some();
        let slot = {
            let mut state = self.inner.state();
            if let Some((label, func)) = work {
                state.resume_slot = Some(ResumeSlot { label, func });
            }
            state.resume_slot.clone()
        };
        match slot {
            Some(slot) if fresh => {
                let options = ActionOptions {
                    resume: true,
                    ..options
                };
                self.enqueue(slot.label, slot.func, options).await
            }
            _ => ActionResult::not_resumed(),
        }
    }

    async fn enqueue(&self, label: String, func: ActionFn, options: ActionOptions) -> ActionResult {
        let (responder, rx) = oneshot::channel();
        self.inner.queue().push_back(QueuedAction {
            label,
            func,
            timeout: options.timeout,
            resume: options.resume,
            responder,
        });
        self.inner.wake.notify_one();
        rx.await
            .unwrap_or_else(|_| ActionResult::failure("action engine shut down", false, true))
    }

    /// 请求当前动作停止并清空未开始的排队动作
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn cancel_resume(&self) {
        self.inner.state().resume_slot = None;
    }

    pub fn is_executing(&self) -> bool {
        self.inner.state().executing
    }

    pub fn current_label(&self) -> Option<String> {
        self.inner.state().current_label.clone()
    }

    /// func 是否正是当前在执行的那个闭包
    pub fn is_current(&self, func: &ActionFn) -> bool {
        self.inner
            .state()
            .current_fn
            .as_ref()
            .is_some_and(|weak| func.is(weak))
    }

    pub fn resume_label(&self) -> Option<String> {
        self.inner
            .state()
            .resume_slot
            .as_ref()
            .map(|slot| slot.label.clone())
    }

    pub fn pending_len(&self) -> usize {
        self.inner.queue().len()
    }

    pub fn snapshot(&self) -> ExecutionSnapshot {
        let pending = self.pending_len();
        let state = self.inner.state();
        ExecutionSnapshot {
            executing: state.executing,
            current_label: state.current_label.clone(),
            timed_out: state.timed_out,
            resume_label: state.resume_slot.as_ref().map(|s| s.label.clone()),
            pending,
        }
    }
}

impl Drop for ActionEngine {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
