//! 核心层：错误类型、有界重试、失败恢复表、事件信封

pub mod error;
pub mod events;
pub mod recovery;
pub mod retry;

pub use error::{AgentError, PlanError};
pub use events::{event_channel, AgentEvent, Envelope, EventReceiver, EventSender, EventSink};
pub use recovery::{FailureKind, RecoveryEngine};
pub use retry::{retry, Retriable, RetryPolicy};
