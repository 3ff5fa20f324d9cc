//! 错误类型
//!
//! 动作层失败折叠进 ActionResult，不在这里；计划层失败（生成失败、重试耗尽、非法状态迁移）
//! 以 PlanError 返回给调用方；AgentError 是对外的顶层错误。

use thiserror::Error;

use crate::core::retry::Retriable;
use crate::llm::LlmError;
use crate::planner::{Plan, PlanStatus};

/// 规划流水线错误
#[derive(Error, Debug)]
pub enum PlanError {
    /// 步骤生成失败（补全网关重试耗尽或请求非法），计划直接失败
    #[error("Step generation failed: {0}")]
    Generation(#[from] LlmError),

    /// 模型输出无法解析为步骤列表；可重试
    #[error("Malformed plan output: {0}")]
    MalformedSteps(String),

    #[error("Invalid plan transition: {from:?} -> {to:?}")]
    InvalidTransition { from: PlanStatus, to: PlanStatus },

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// 操作员中途 stop()；计划已标记为 failed，不再重试
    #[error("Plan for '{}' was stopped", plan.goal)]
    Stopped { plan: Box<Plan> },

    /// 超过重试上限；携带已标记为 failed 的计划
    #[error("Plan for '{}' failed after {retry_count} retries: {feedback}", plan.goal)]
    RetriesExhausted {
        plan: Box<Plan>,
        retry_count: u32,
        feedback: String,
    },
}

impl Retriable for PlanError {
    fn is_retriable(&self) -> bool {
        match self {
            PlanError::Generation(e) => e.is_retriable(),
            PlanError::MalformedSteps(_) => true,
            _ => false,
        }
    }
}

/// Agent 顶层错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 前置条件不满足（如尚未注册任何动作）
    #[error("Agent not initialized: {0}")]
    NotInitialized(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl AgentError {
    /// 面向聊天的错误文案
    pub fn chat_message(&self) -> String {
        match self {
            AgentError::Plan(PlanError::RetriesExhausted {
                retry_count,
                feedback,
                ..
            }) => format!("I gave up after {retry_count} retries. Last problem: {feedback}"),
            AgentError::Plan(PlanError::Stopped { .. }) => "Stopped.".to_string(),
            AgentError::NotInitialized(what) => format!("I'm not ready yet ({what})."),
            other => format!("Something went wrong: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_retriable_follows_llm_error() {
        let transient = PlanError::Generation(LlmError::Network("reset".into()));
        assert!(transient.is_retriable());
        let invalid = PlanError::Generation(LlmError::InvalidRequest("bad".into()));
        assert!(!invalid.is_retriable());
        assert!(PlanError::MalformedSteps("x".into()).is_retriable());
    }

    #[test]
    fn test_chat_message_for_exhausted_plan() {
        let mut plan = Plan::new("collect wood", vec![]);
        plan.status = PlanStatus::Failed;
        let err = AgentError::from(PlanError::RetriesExhausted {
            plan: Box::new(plan),
            retry_count: 3,
            feedback: "inventory full".into(),
        });
        let msg = err.chat_message();
        assert!(msg.contains("3 retries"));
        assert!(msg.contains("inventory full"));
    }
}
