//! 协作式中断信号
//!
//! stop() 拉起信号，动作体自行轮询 is_raised() 或 await raised() 后尽快退出。
//! 没有强制终止：不配合的动作可以越过截止时间继续运行。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    raised: AtomicBool,
    raise_count: AtomicU64,
    notify: Notify,
}

/// 可克隆的共享中断标志；引擎与环境持有同一个实例
#[derive(Debug, Clone, Default)]
pub struct InterruptSignal {
    inner: Arc<Inner>,
}

impl InterruptSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.inner.raised.store(true, Ordering::SeqCst);
        self.inner.raise_count.fetch_add(1, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn clear(&self) {
        self.inner.raised.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// 累计拉起次数（诊断用）
    pub fn raise_count(&self) -> u64 {
        self.inner.raise_count.load(Ordering::SeqCst)
    }

    /// 等待信号被拉起；已拉起时立即返回
    pub async fn raised(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}
