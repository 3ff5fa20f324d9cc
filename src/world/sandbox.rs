//! 内存沙箱世界
//!
//! 用于离线演练和测试：背包、附近/远处方块、工具要求、配方、路径阻塞都在内存里模拟，
//! 失败时返回与真实运行时风格一致的文本（"not found"、"inventory full" 等），
//! 从而驱动恢复表。

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::world::{Position, World};

/// 默认搜索半径；更远的方块需要扩大搜索
pub const DEFAULT_SEARCH_RANGE: u64 = 32;
/// 远处方块需要的最小搜索半径
pub const FAR_RANGE: u64 = 64;

#[derive(Debug, Default)]
struct SandboxState {
    inventory: HashMap<String, u32>,
    inventory_limit: Option<u32>,
    nearby: HashMap<String, u32>,
    far: HashMap<String, u32>,
    tool_requirements: HashMap<String, String>,
    recipes: HashMap<String, Vec<(String, u32)>>,
    equipped: Option<String>,
    position: Position,
    interactions: HashSet<String>,
    path_blocked: bool,
}

impl SandboxState {
    fn total_items(&self) -> u32 {
        self.inventory.values().sum()
    }
}

#[derive(Debug, Default)]
pub struct SandboxWorld {
    state: Mutex<SandboxState>,
}

impl SandboxWorld {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SandboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_block_nearby(self, block: &str, count: u32) -> Self {
        self.state().nearby.insert(block.to_string(), count);
        self
    }

    pub fn with_block_far(self, block: &str, count: u32) -> Self {
        self.state().far.insert(block.to_string(), count);
        self
    }

    pub fn with_item(self, item: &str, count: u32) -> Self {
        *self.state().inventory.entry(item.to_string()).or_default() += count;
        self
    }

    pub fn with_inventory_limit(self, limit: u32) -> Self {
        self.state().inventory_limit = Some(limit);
        self
    }

    pub fn with_tool_requirement(self, block: &str, tool: &str) -> Self {
        self.state()
            .tool_requirements
            .insert(block.to_string(), tool.to_string());
        self
    }

    pub fn with_recipe(self, output: &str, ingredients: &[(&str, u32)]) -> Self {
        self.state().recipes.insert(
            output.to_string(),
            ingredients
                .iter()
                .map(|(item, n)| (item.to_string(), *n))
                .collect(),
        );
        self
    }

    pub fn with_blocked_path(self) -> Self {
        self.state().path_blocked = true;
        self
    }

    pub fn equipped(&self) -> Option<String> {
        self.state().equipped.clone()
    }

    /// 在 range 内寻找方块；远处方块在扩大搜索后变为「附近」
    pub fn find_block(&self, block: &str, range: u64) -> Result<String, String> {
        let mut state = self.state();
        if state.nearby.get(block).copied().unwrap_or(0) > 0 {
            return Ok(format!("Found {block} nearby."));
        }
        if range >= FAR_RANGE {
            if let Some(count) = state.far.remove(block) {
                state.nearby.insert(block.to_string(), count);
                return Ok(format!("Found {block} after searching {range} blocks."));
            }
        }
        Err(format!("{block} not found within {range} blocks"))
    }

    pub fn collect(&self, block: &str, count: u32) -> Result<String, String> {
        let mut state = self.state();
        let available = state.nearby.get(block).copied().unwrap_or(0);
        if available == 0 {
            return Err(format!("no {block} nearby"));
        }
        if let Some(tool) = state.tool_requirements.get(block) {
            if state.equipped.as_deref() != Some(tool.as_str()) {
                return Err(format!("need a {tool} to mine {block}"));
            }
        }
        let count = count.min(available);
        if let Some(limit) = state.inventory_limit {
            if state.total_items() + count > limit {
                return Err("inventory full".to_string());
            }
        }
        state.nearby.insert(block.to_string(), available - count);
        *state.inventory.entry(block.to_string()).or_default() += count;
        state.interactions.insert(block.to_string());
        Ok(format!("Collected {count} {block}."))
    }

    /// count 为负数时丢弃全部
    pub fn discard(&self, item: &str, count: i64) -> Result<String, String> {
        let mut state = self.state();
        let held = state.inventory.get(item).copied().unwrap_or(0);
        if held == 0 {
            return Err(format!("no {item} in inventory"));
        }
        let n = if count < 0 { held } else { u32::try_from(count).unwrap_or(u32::MAX).min(held) };
        state.inventory.insert(item.to_string(), held - n);
        Ok(format!("Discarded {n} {item}."))
    }

    pub fn craft(&self, recipe: &str, count: u32) -> Result<String, String> {
        let mut state = self.state();
        let ingredients = state
            .recipes
            .get(recipe)
            .cloned()
            .ok_or_else(|| format!("no recipe for {recipe}"))?;
        for (item, n) in &ingredients {
            let have = state.inventory.get(item).copied().unwrap_or(0);
            if have < n * count {
                return Err(format!("not enough {item} to craft {recipe}"));
            }
        }
        for (item, n) in &ingredients {
            if let Some(have) = state.inventory.get_mut(item) {
                *have -= n * count;
            }
        }
        *state.inventory.entry(recipe.to_string()).or_default() += count;
        Ok(format!("Crafted {count} {recipe}."))
    }

    pub fn equip(&self, item: &str) -> Result<String, String> {
        let mut state = self.state();
        if state.inventory.get(item).copied().unwrap_or(0) == 0 {
            return Err(format!("no {item} to equip"));
        }
        state.equipped = Some(item.to_string());
        Ok(format!("Equipped {item}."))
    }

    pub fn go_to(&self, target: Position) -> Result<String, String> {
        let mut state = self.state();
        if state.path_blocked {
            return Err("path blocked, cannot reach target".to_string());
        }
        state.position = target;
        Ok(format!("Arrived at ({}, {}, {}).", target.x, target.y, target.z))
    }

    /// 后撤一段距离并解除阻塞
    pub fn move_away(&self, distance: f64) -> Result<String, String> {
        let mut state = self.state();
        state.position.x += distance;
        state.path_blocked = false;
        Ok(format!("Moved {distance} blocks away."))
    }

    pub fn interact(&self, target: &str) {
        self.state().interactions.insert(target.to_string());
    }
}

impl World for SandboxWorld {
    fn item_count(&self, item: &str) -> u32 {
        self.state().inventory.get(item).copied().unwrap_or(0)
    }

    fn position(&self) -> Position {
        self.state().position
    }

    fn has_interacted(&self, target: &str) -> bool {
        self.state().interactions.contains(target)
    }
}
