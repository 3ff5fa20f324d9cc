//! 世界/机器人运行时边界
//!
//! 寻路、方块与背包操作、聊天传输都属于外部运行时；这里只定义控制层需要的查询面（World）
//! 与动作执行时拿到的环境（Environment = World + 中断信号）。SandboxWorld 是内存实现，
//! 供离线演练与测试使用。

pub mod interrupt;
pub mod sandbox;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use interrupt::InterruptSignal;
pub use sandbox::SandboxWorld;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2)).sqrt()
    }
}

/// 控制层对世界的只读查询（目标是否达成等）
pub trait World: Send + Sync {
    fn item_count(&self, item: &str) -> u32;

    fn position(&self) -> Position;

    /// 是否已与某个目标（实体、方块、玩家）交互过
    fn has_interacted(&self, target: &str) -> bool;
}

/// 动作执行环境：世界句柄 + 协作式中断信号
#[derive(Clone)]
pub struct Environment {
    pub world: Arc<dyn World>,
    pub interrupt: InterruptSignal,
}

impl Environment {
    pub fn new(world: Arc<dyn World>, interrupt: InterruptSignal) -> Self {
        Self { world, interrupt }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_raised()
    }
}
