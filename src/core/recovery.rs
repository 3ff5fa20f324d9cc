//! 失败恢复引擎
//!
//! 根据失败反馈文本做确定性的模式匹配，给出恢复步骤（插入到重新生成的步骤之前），
//! 避免每次失败都绕一圈语言模型。同一反馈永远得到同样的步骤。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::json;

use crate::planner::PlanStep;

/// 扩大搜索时使用的半径
const BROADENED_SEARCH_RANGE: u64 = 128;
/// 背包满时丢弃的填充物
const FILLER_ITEM: &str = "cobblestone";
/// 被挡住时后撤的距离
const REPOSITION_DISTANCE: u64 = 8;
/// 缺工具且无法从反馈中识别时的默认工具
const DEFAULT_TOOL: &str = "wooden_pickaxe";

/// 反馈分类（按表顺序匹配，可同时命中多类）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    InventoryFull,
    Blocked,
    MissingTool,
}

struct Rule {
    kind: FailureKind,
    pattern: &'static str,
}

const RULES: &[Rule] = &[
    Rule {
        kind: FailureKind::NotFound,
        pattern: r"not found|could(?:n't| not) find|no \w+ nearby",
    },
    Rule {
        kind: FailureKind::InventoryFull,
        pattern: r"inventory (?:is )?full",
    },
    Rule {
        kind: FailureKind::Blocked,
        pattern: r"blocked|cannot reach|can't reach|no path",
    },
    Rule {
        kind: FailureKind::MissingTool,
        pattern: r"need(?:s)? (?:a |an )?(?:\w+ )?tool|need(?:s)? (?:a |an )?\w+_(?:pickaxe|axe|shovel|hoe|sword)|requires? (?:a |an )?\w+_(?:pickaxe|axe|shovel|hoe|sword)",
    },
];

fn compiled_rules() -> &'static [(FailureKind, Regex)] {
    static COMPILED: OnceLock<Vec<(FailureKind, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .filter_map(|r| {
                Regex::new(&format!("(?i){}", r.pattern))
                    .ok()
                    .map(|re| (r.kind, re))
            })
            .collect()
    })
}

fn tool_name_regex() -> &'static Option<Regex> {
    static TOOL: OnceLock<Option<Regex>> = OnceLock::new();
    TOOL.get_or_init(|| {
        Regex::new(r"(?i)\b((?:wooden|stone|iron|golden|diamond|netherite)_(?:pickaxe|axe|shovel|hoe|sword))\b").ok()
    })
}

/// 确定性恢复：反馈 -> 恢复步骤
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// 反馈命中的失败类别（按表顺序，去重）
    pub fn classify(&self, feedback: &str) -> Vec<FailureKind> {
        compiled_rules()
            .iter()
            .filter(|(_, re)| re.is_match(feedback))
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// 根据反馈与失败步骤给出恢复步骤；无匹配时返回空（仅靠带反馈的重新生成）
    pub fn recovery_steps(&self, feedback: &str, failed_step: Option<&PlanStep>) -> Vec<PlanStep> {
        self.classify(feedback)
            .into_iter()
            .flat_map(|kind| steps_for(kind, feedback, failed_step))
            .collect()
    }
}

fn steps_for(kind: FailureKind, feedback: &str, failed_step: Option<&PlanStep>) -> Vec<PlanStep> {
    match kind {
        FailureKind::NotFound => {
            let target = failed_step
                .and_then(|s| s.param_str("blockType").or_else(|| s.param_str("itemName")))
                .unwrap_or("any");
            vec![PlanStep::new(
                "searchForBlock",
                format!("Broaden the search for {target}"),
                json!({ "blockType": target, "range": BROADENED_SEARCH_RANGE }),
            )
            .with_reasoning("recovery: target not found nearby")]
        }
        FailureKind::InventoryFull => vec![PlanStep::new(
            "discard",
            format!("Discard {FILLER_ITEM} to free inventory space"),
            json!({ "itemName": FILLER_ITEM, "count": -1 }),
        )
        .with_reasoning("recovery: inventory full")],
        FailureKind::Blocked => vec![PlanStep::new(
            "moveAway",
            "Step away to find another path",
            json!({ "distance": REPOSITION_DISTANCE }),
        )
        .with_reasoning("recovery: path blocked")],
        FailureKind::MissingTool => {
            let tool = tool_name_regex()
                .as_ref()
                .and_then(|re| re.captures(feedback))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_lowercase())
                .unwrap_or_else(|| DEFAULT_TOOL.to_string());
            vec![
                PlanStep::new(
                    "craftRecipe",
                    format!("Craft a {tool}"),
                    json!({ "recipeName": tool, "count": 1 }),
                )
                .with_reasoning("recovery: missing tool"),
                PlanStep::new(
                    "equip",
                    format!("Equip the {tool}"),
                    json!({ "itemName": tool }),
                )
                .with_reasoning("recovery: missing tool"),
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_full_yields_discard() {
        let engine = RecoveryEngine::new();
        let steps = engine.recovery_steps("collectBlocks failed: inventory full", None);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].tool, "discard");
    }

    #[test]
    fn test_not_found_broadens_search_for_failed_target() {
        let engine = RecoveryEngine::new();
        let failed = PlanStep::new("searchForBlock", "find logs", json!({ "blockType": "oak_log" }));
        let steps = engine.recovery_steps("oak_log not found within 32 blocks", Some(&failed));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].tool, "searchForBlock");
        assert_eq!(steps[0].params["blockType"], "oak_log");
        assert_eq!(steps[0].params["range"], BROADENED_SEARCH_RANGE);
    }

    #[test]
    fn test_blocked_repositions() {
        let engine = RecoveryEngine::new();
        for feedback in ["path blocked by lava", "Cannot reach target"] {
            let steps = engine.recovery_steps(feedback, None);
            assert_eq!(steps[0].tool, "moveAway", "{feedback}");
        }
    }

    #[test]
    fn test_missing_tool_crafts_then_equips() {
        let engine = RecoveryEngine::new();
        let steps = engine.recovery_steps("need a stone_pickaxe to mine iron_ore", None);
        let tools: Vec<_> = steps.iter().map(|s| s.tool.as_str()).collect();
        assert_eq!(tools, vec!["craftRecipe", "equip"]);
        assert_eq!(steps[0].params["recipeName"], "stone_pickaxe");
        assert_eq!(steps[1].params["itemName"], "stone_pickaxe");
    }

    #[test]
    fn test_missing_tool_defaults_when_unnamed() {
        let engine = RecoveryEngine::new();
        let steps = engine.recovery_steps("you need a tool for that", None);
        assert_eq!(steps[0].params["recipeName"], DEFAULT_TOOL);
    }

    #[test]
    fn test_unknown_feedback_has_no_recovery() {
        let engine = RecoveryEngine::new();
        assert!(engine.recovery_steps("something odd happened", None).is_empty());
    }

    #[test]
    fn test_multiple_matches_follow_table_order() {
        let engine = RecoveryEngine::new();
        let kinds = engine.classify("inventory full and path blocked");
        assert_eq!(kinds, vec![FailureKind::InventoryFull, FailureKind::Blocked]);
    }

    #[test]
    fn test_same_feedback_same_steps() {
        let engine = RecoveryEngine::new();
        let a = engine.recovery_steps("inventory full", None);
        let b = engine.recovery_steps("inventory full", None);
        assert_eq!(a, b);
    }
}
