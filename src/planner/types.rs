//! 计划模型：Plan / PlanStep / PlanStatus / PlanContext
//!
//! 状态机：pending -> in_progress -> {completed | failed}；无需动作的计划直接创建为 completed。
//! 终态不可再迁移，重试得到的是同一目标下的新 Plan。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::actions::{validate_params, ActionRegistry};
use crate::core::PlanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Failed)
    }

    fn can_transition_to(&self, to: PlanStatus) -> bool {
        matches!(
            (self, to),
            (PlanStatus::Pending, PlanStatus::InProgress)
                | (PlanStatus::InProgress, PlanStatus::Completed)
                | (PlanStatus::InProgress, PlanStatus::Failed)
        )
    }
}

/// 一次动作调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanStep {
    /// 面向人的步骤说明
    #[serde(default)]
    pub description: String,
    /// 动作名，对应注册表中的 Action::name
    pub tool: String,
    /// 动作参数（JSON 对象）
    #[serde(default = "empty_params")]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

fn empty_params() -> Value {
    Value::Object(Default::default())
}

impl PlanStep {
    pub fn new(tool: impl Into<String>, description: impl Into<String>, params: Value) -> Self {
        Self {
            description: description.into(),
            tool: tool.into(),
            params,
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// 日志与引擎中使用的标签
    pub fn label(&self) -> String {
        if self.description.is_empty() {
            self.tool.clone()
        } else {
            format!("{} ({})", self.tool, self.description)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub goal: String,
    /// 种子步骤：先于生成器产出的步骤执行（恢复步骤、缓存复用的步骤）
    pub steps: Vec<PlanStep>,
    pub status: PlanStatus,
    pub requires_action: bool,
    /// 本计划所依据的失败反馈
    pub feedback: Option<String>,
    /// 种子步骤之后是否继续从生成器取步骤
    pub generate: bool,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// 待执行计划：种子步骤执行完后继续流式生成
    pub fn new(goal: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal: goal.into(),
            steps,
            status: PlanStatus::Pending,
            requires_action: true,
            feedback: None,
            generate: true,
            created_at: Utc::now(),
        }
    }

    /// 无需动作的目标（闲聊等），直接 completed
    pub fn no_action(goal: impl Into<String>) -> Self {
        Self {
            status: PlanStatus::Completed,
            requires_action: false,
            generate: false,
            ..Self::new(goal, Vec::new())
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }

    pub fn with_generate(mut self, generate: bool) -> Self {
        self.generate = generate;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn transition(&mut self, to: PlanStatus) -> Result<(), PlanError> {
        if !self.status.can_transition_to(to) {
            return Err(PlanError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), PlanError> {
        self.transition(PlanStatus::InProgress)
    }

    pub fn complete(&mut self) -> Result<(), PlanError> {
        self.transition(PlanStatus::Completed)
    }

    pub fn fail(&mut self) -> Result<(), PlanError> {
        self.transition(PlanStatus::Failed)
    }

    /// 每个步骤都指向已注册的动作，且参数满足该动作的参数表
    pub fn validate(&self, registry: &ActionRegistry) -> Result<(), PlanError> {
        for (i, step) in self.steps.iter().enumerate() {
            let action = registry
                .get(&step.tool)
                .ok_or_else(|| PlanError::InvalidPlan(format!("step {i}: unknown action '{}'", step.tool)))?;
            validate_params(&action.parameters(), &step.params)
                .map_err(|e| PlanError::InvalidPlan(format!("step {i} ({}): {e}", step.tool)))?;
        }
        Ok(())
    }
}

/// 一次计划执行的运行时上下文；跨重试保留（retry_count 单调不减）
///
/// 待执行步骤队列本身是执行器里的有界 mpsc 通道，生产者写、消费者读。
#[derive(Debug, Clone)]
pub struct PlanContext {
    pub current_step_index: usize,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub retry_count: u32,
    is_generating: Arc<AtomicBool>,
}

impl Default for PlanContext {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanContext {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            current_step_index: 0,
            start_time: now,
            last_update: now,
            retry_count: 0,
            is_generating: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_generating(&self) -> bool {
        self.is_generating.load(Ordering::SeqCst)
    }

    pub(crate) fn generating_flag(&self) -> Arc<AtomicBool> {
        self.is_generating.clone()
    }

    pub(crate) fn advance(&mut self) {
        self.current_step_index += 1;
        self.last_update = Utc::now();
    }
}
