//! 动作执行引擎：单飞队列、协作式取消、截止时间、恢复槽

pub mod action_engine;
pub mod state;

pub use action_engine::ActionEngine;
pub use state::{ActionFn, ActionOptions, ActionResult, ExecutionSnapshot, ExecutionState, QueuedAction, ResumeSlot};
