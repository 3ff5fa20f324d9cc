//! Craftmind - 游戏智能体控制层
//!
//! 入口：加载配置、初始化日志，在内存沙箱世界里演练一个目标。
//!
//! 运行方式：
//! ```bash
//! cargo run -- collect 3 oak logs
//! ```
//! Ctrl+C 会像操作员一样打断当前计划。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use craftmind::actions::{register_sandbox_actions, ActionRegistry};
use craftmind::config::load_config;
use craftmind::core::event_channel;
use craftmind::world::{SandboxWorld, World};
use craftmind::{observability, Agent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let goal = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if goal.trim().is_empty() {
        anyhow::bail!("usage: craftmind <goal>");
    }

    let cfg = load_config(None).context("Failed to load config")?;

    let world = Arc::new(
        SandboxWorld::new()
            .with_block_nearby("oak_log", 16)
            .with_block_far("iron_ore", 8)
            .with_tool_requirement("iron_ore", "stone_pickaxe")
            .with_item("cobblestone", 16)
            .with_item("stick", 4)
            .with_recipe("stone_pickaxe", &[("cobblestone", 3), ("stick", 2)])
            .with_recipe("oak_planks", &[("oak_log", 1)])
            .with_inventory_limit(64),
    );
    let mut registry = ActionRegistry::new();
    register_sandbox_actions(
        &mut registry,
        world.clone(),
        Duration::from_millis(cfg.actions.sandbox_delay_ms),
    );

    let (events_tx, mut events_rx) = event_channel();
    let agent = Arc::new(
        Agent::builder(cfg)
            .registry(registry)
            .world(world.clone())
            .events(events_tx)
            .build()
            .context("Failed to create agent")?,
    );

    let printer = tokio::spawn(async move {
        while let Some(envelope) = events_rx.recv().await {
            let payload = serde_json::to_string(&envelope.payload).unwrap_or_default();
            println!("[{}] {}", envelope.sender, payload);
        }
    });

    let interrupter = {
        let agent = agent.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                agent.stop();
            }
        })
    };

    let reply = agent.handle_goal(&goal).await;
    println!("{}: {}", agent.name(), reply);
    tracing::info!(
        oak_log = world.item_count("oak_log"),
        iron_ore = world.item_count("iron_ore"),
        position = ?world.position(),
        "sandbox state"
    );

    interrupter.abort();
    drop(agent);
    let _ = tokio::time::timeout(Duration::from_millis(200), printer).await;
    Ok(())
}
