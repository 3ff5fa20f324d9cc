//! 计划缓存：按目标记住已完成的计划
//!
//! create_plan 先 recall(goal)：无需动作的计划直接复用，仍有效的已完成计划作为种子步骤复用。

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::planner::Plan;

/// 计划记忆 trait
pub trait PlanMemory: Send + Sync {
    fn recall(&self, goal: &str) -> Option<Plan>;

    fn remember(&self, goal: &str, plan: &Plan);
}

/// 空实现：不缓存
#[derive(Clone, Default)]
pub struct NoopPlanMemory;

impl PlanMemory for NoopPlanMemory {
    fn recall(&self, _goal: &str) -> Option<Plan> {
        None
    }

    fn remember(&self, _goal: &str, _plan: &Plan) {}
}

/// 内存实现；键为规范化后的目标文本（去首尾空白、小写）
#[derive(Default)]
pub struct InMemoryPlanMemory {
    plans: RwLock<HashMap<String, Plan>>,
}

fn normalize(goal: &str) -> String {
    goal.trim().to_lowercase()
}

impl InMemoryPlanMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PlanMemory for InMemoryPlanMemory {
    fn recall(&self, goal: &str) -> Option<Plan> {
        self.plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize(goal))
            .cloned()
    }

    fn remember(&self, goal: &str, plan: &Plan) {
        self.plans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize(goal), plan.clone());
    }
}
