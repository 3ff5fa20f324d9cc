//! 沙箱动作：在 SandboxWorld 上执行的协作式动作
//!
//! 每个动作在操作前后会让出一段模拟耗时，期间监听中断信号；被中断时返回 "interrupted"。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::actions::{Action, ActionParam, ActionRegistry, ParamKind};
use crate::world::sandbox::DEFAULT_SEARCH_RANGE;
use crate::world::{Environment, Position, SandboxWorld};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SandboxOp {
    SearchForBlock,
    CollectBlocks,
    Discard,
    CraftRecipe,
    Equip,
    GoToPosition,
    MoveAway,
}

const ALL_OPS: [SandboxOp; 7] = [
    SandboxOp::SearchForBlock,
    SandboxOp::CollectBlocks,
    SandboxOp::Discard,
    SandboxOp::CraftRecipe,
    SandboxOp::Equip,
    SandboxOp::GoToPosition,
    SandboxOp::MoveAway,
];

pub struct SandboxAction {
    op: SandboxOp,
    world: Arc<SandboxWorld>,
    /// 每个单位操作的模拟耗时
    delay: Duration,
}

/// 把全部沙箱动作注册进 registry
pub fn register_sandbox_actions(registry: &mut ActionRegistry, world: Arc<SandboxWorld>, delay: Duration) {
    for op in ALL_OPS {
        registry.register(SandboxAction {
            op,
            world: world.clone(),
            delay,
        });
    }
}

/// 模拟耗时；期间被中断则返回 Err
async fn pause(env: &Environment, delay: Duration) -> Result<(), String> {
    if env.is_interrupted() {
        return Err("interrupted".to_string());
    }
    tokio::select! {
        _ = env.interrupt.raised() => Err("interrupted".to_string()),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str, String> {
    params[key]
        .as_str()
        .ok_or_else(|| format!("missing parameter '{key}'"))
}

fn f64_param(params: &Value, key: &str) -> Result<f64, String> {
    params[key]
        .as_f64()
        .ok_or_else(|| format!("missing parameter '{key}'"))
}

#[async_trait]
impl Action for SandboxAction {
    fn name(&self) -> &str {
        match self.op {
            SandboxOp::SearchForBlock => "searchForBlock",
            SandboxOp::CollectBlocks => "collectBlocks",
            SandboxOp::Discard => "discard",
            SandboxOp::CraftRecipe => "craftRecipe",
            SandboxOp::Equip => "equip",
            SandboxOp::GoToPosition => "goToPosition",
            SandboxOp::MoveAway => "moveAway",
        }
    }

    fn description(&self) -> &str {
        match self.op {
            SandboxOp::SearchForBlock => "Search the surroundings for the nearest block of a type and walk to it.",
            SandboxOp::CollectBlocks => "Mine and pick up blocks of the given type.",
            SandboxOp::Discard => "Drop items from the inventory. count -1 drops all of them.",
            SandboxOp::CraftRecipe => "Craft an item from inventory ingredients.",
            SandboxOp::Equip => "Hold an item from the inventory in hand.",
            SandboxOp::GoToPosition => "Walk to the given coordinates.",
            SandboxOp::MoveAway => "Move the given distance away from the current position.",
        }
    }

    fn parameters(&self) -> Vec<ActionParam> {
        use ParamKind::*;
        match self.op {
            SandboxOp::SearchForBlock => vec![
                ActionParam::required("blockType", String, "block to look for, e.g. oak_log"),
                ActionParam::optional("range", Integer, "search radius in blocks"),
            ],
            SandboxOp::CollectBlocks => vec![
                ActionParam::required("blockType", String, "block to collect"),
                ActionParam::optional("count", Integer, "how many to collect"),
            ],
            SandboxOp::Discard => vec![
                ActionParam::required("itemName", String, "item to drop"),
                ActionParam::optional("count", Integer, "how many, -1 for all"),
            ],
            SandboxOp::CraftRecipe => vec![
                ActionParam::required("recipeName", String, "item to craft"),
                ActionParam::optional("count", Integer, "how many to craft"),
            ],
            SandboxOp::Equip => vec![ActionParam::required("itemName", String, "item to hold")],
            SandboxOp::GoToPosition => vec![
                ActionParam::required("x", Number, "x coordinate"),
                ActionParam::required("y", Number, "y coordinate"),
                ActionParam::required("z", Number, "z coordinate"),
            ],
            SandboxOp::MoveAway => vec![ActionParam::required("distance", Number, "blocks to move")],
        }
    }

    async fn perform(&self, env: Environment, params: Value) -> Result<String, String> {
        pause(&env, self.delay).await?;
        let world = &self.world;
        match self.op {
            SandboxOp::SearchForBlock => {
                let range = params["range"].as_u64().unwrap_or(DEFAULT_SEARCH_RANGE);
                world.find_block(str_param(&params, "blockType")?, range)
            }
            SandboxOp::CollectBlocks => {
                let block = str_param(&params, "blockType")?;
                let count = params["count"].as_u64().unwrap_or(1).max(1);
                for _ in 1..count {
                    world.collect(block, 1)?;
                    pause(&env, self.delay).await?;
                }
                world.collect(block, 1)?;
                Ok(format!("Collected {count} {block}."))
            }
            SandboxOp::Discard => {
                let count = params["count"].as_i64().unwrap_or(-1);
                world.discard(str_param(&params, "itemName")?, count)
            }
            SandboxOp::CraftRecipe => {
                let count = u32::try_from(params["count"].as_u64().unwrap_or(1).max(1)).unwrap_or(u32::MAX);
                world.craft(str_param(&params, "recipeName")?, count)
            }
            SandboxOp::Equip => world.equip(str_param(&params, "itemName")?),
            SandboxOp::GoToPosition => {
                let target = Position::new(
                    f64_param(&params, "x")?,
                    f64_param(&params, "y")?,
                    f64_param(&params, "z")?,
                );
                world.go_to(target)
            }
            SandboxOp::MoveAway => world.move_away(f64_param(&params, "distance")?),
        }
    }
}
