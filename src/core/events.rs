//! 组件间事件：显式消息信封 {sender, payload}
//!
//! 引擎与规划器通过 mpsc 推送 AgentEvent，由上层（聊天、UI、日志）消费。

use serde::Serialize;
use tokio::sync::mpsc;

use crate::planner::PlanStatus;

/// 消息信封
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub sender: String,
    pub payload: T,
}

/// 控制层过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    ActionStarted { label: String },
    ActionFinished { label: String, success: bool },
    /// 截止时间到达，已请求中断
    ActionTimedOut { label: String, timeout_secs: u64 },
    /// 未开始的排队动作被丢弃
    ActionsDiscarded { count: usize },
    PlanStatusChanged { goal: String, status: PlanStatus },
    StepStarted { index: usize, tool: String },
    StepFailed { tool: String, feedback: String },
    /// 失败后生成了调整计划
    PlanAdjusted { goal: String, retry_count: u32, recovery_steps: usize },
}

pub type EventSender = mpsc::UnboundedSender<Envelope<AgentEvent>>;
pub type EventReceiver = mpsc::UnboundedReceiver<Envelope<AgentEvent>>;

/// 可选事件出口；未配置时静默丢弃
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: String,
    tx: Option<EventSender>,
}

impl EventSink {
    pub fn new(sender: impl Into<String>, tx: Option<EventSender>) -> Self {
        Self {
            sender: sender.into(),
            tx,
        }
    }

    pub fn emit(&self, payload: AgentEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Envelope {
                sender: self.sender.clone(),
                payload,
            });
        }
    }
}

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
