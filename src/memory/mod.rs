//! 记忆层：对话消息、操作员对话历史、计划缓存

pub mod conversation;
pub mod plan_cache;

pub use conversation::{ConversationMemory, Message, Role};
pub use plan_cache::{InMemoryPlanMemory, NoopPlanMemory, PlanMemory};
