//! 目标需求与「目标已达成」判定
//!
//! 由补全网关从目标文本中抽取 {items, location, interactions}，之后对照 World 判断是否全部满足。
//! 生成器在每批之前调用判定，已满足则停止生成。

use std::sync::Arc;

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::llm::{CompletionOptions, LlmClient};
use crate::memory::Message;
use crate::planner::extract_json;
use crate::world::{Position, World};

/// 到达位置时允许的误差（方块）
const DEFAULT_TOLERANCE: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ItemRequirement {
    /// 物品名，如 oak_log
    pub name: String,
    /// 背包中至少需要的数量
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LocationRequirement {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub tolerance: Option<f64>,
}

/// 目标的可检验需求；全空表示无法判定（判定恒为 false）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GoalRequirements {
    #[serde(default)]
    pub items: Vec<ItemRequirement>,
    #[serde(default)]
    pub location: Option<LocationRequirement>,
    /// 需要交互过的目标（实体、方块、玩家）
    #[serde(default)]
    pub interactions: Vec<String>,
}

/// 生成器使用的判定闭包
pub type GoalPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

impl GoalRequirements {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.location.is_none() && self.interactions.is_empty()
    }

    pub fn is_satisfied(&self, world: &dyn World) -> bool {
        if self.is_empty() {
            return false;
        }
        let items_ok = self
            .items
            .iter()
            .all(|req| world.item_count(&req.name) >= req.count);
        let location_ok = self.location.as_ref().map_or(true, |loc| {
            let target = Position::new(loc.x, loc.y, loc.z);
            world.position().distance_to(&target) <= loc.tolerance.unwrap_or(DEFAULT_TOLERANCE)
        });
        let interactions_ok = self
            .interactions
            .iter()
            .all(|target| world.has_interacted(target));
        items_ok && location_ok && interactions_ok
    }

    /// 绑定到某个世界的判定；需求为空时返回 None
    pub fn predicate(self, world: Arc<dyn World>) -> Option<GoalPredicate> {
        if self.is_empty() {
            return None;
        }
        Some(Arc::new(move || self.is_satisfied(world.as_ref())))
    }

    pub fn schema_json() -> serde_json::Value {
        serde_json::to_value(schema_for!(GoalRequirements)).unwrap_or_default()
    }
}

/// 通过补全网关抽取目标需求；失败时退化为空需求（只靠短批次结束生成）
pub async fn extract_requirements(llm: &dyn LlmClient, goal: &str) -> GoalRequirements {
    let schema = GoalRequirements::schema_json();
    let messages = vec![
        Message::system(format!(
            "Extract the checkable requirements of a Minecraft goal. Reply with one JSON object matching this schema:\n{}\nUse empty lists when the goal has no such requirement.",
            serde_json::to_string_pretty(&schema).unwrap_or_default()
        )),
        Message::user(goal.to_string()),
    ];
    let options = CompletionOptions::route("requirements")
        .with_schema(schema)
        .with_temperature(0.0);
    match llm.complete(&messages, &options).await {
        Ok(raw) => match serde_json::from_str::<GoalRequirements>(extract_json(&raw, '{', '}')) {
            Ok(reqs) => reqs,
            Err(e) => {
                debug!(goal, error = %e, "no requirements extracted");
                GoalRequirements::default()
            }
        },
        Err(e) => {
            warn!(goal, error = %e, "requirement extraction failed");
            GoalRequirements::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::world::SandboxWorld;

    #[test]
    fn test_items_requirement() {
        let reqs = GoalRequirements {
            items: vec![ItemRequirement {
                name: "oak_log".into(),
                count: 2,
            }],
            ..Default::default()
        };
        let world = SandboxWorld::new().with_item("oak_log", 1);
        assert!(!reqs.is_satisfied(&world));
        let world = world.with_item("oak_log", 1);
        assert!(reqs.is_satisfied(&world));
    }

    #[test]
    fn test_location_and_interactions() {
        let reqs = GoalRequirements {
            location: Some(LocationRequirement {
                x: 10.0,
                y: 64.0,
                z: 0.0,
                tolerance: None,
            }),
            interactions: vec!["villager".into()],
            ..Default::default()
        };
        let world = SandboxWorld::new();
        world.go_to(Position::new(9.0, 64.0, 0.0)).unwrap();
        assert!(!reqs.is_satisfied(&world));
        world.interact("villager");
        assert!(reqs.is_satisfied(&world));
    }

    #[test]
    fn test_empty_requirements_never_satisfied() {
        let reqs = GoalRequirements::default();
        assert!(!reqs.is_satisfied(&SandboxWorld::new()));
        assert!(reqs.predicate(Arc::new(SandboxWorld::new())).is_none());
    }

    #[tokio::test]
    async fn test_extract_requirements_from_model() {
        let mock = MockLlmClient::new();
        mock.push_response(
            "requirements",
            "```json\n{\"items\": [{\"name\": \"oak_log\", \"count\": 3}]}\n```",
        );
        let reqs = extract_requirements(&mock, "collect 3 oak logs").await;
        assert_eq!(reqs.items.len(), 1);
        assert_eq!(reqs.items[0].count, 3);
        assert!(reqs.location.is_none());
    }

    #[tokio::test]
    async fn test_unparseable_output_gives_empty_requirements() {
        let mock = MockLlmClient::new();
        let reqs = extract_requirements(&mock, "dance").await;
        assert!(reqs.is_empty());
    }
}
