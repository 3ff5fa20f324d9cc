//! 目标分类：这句话需要动作吗？
//!
//! 先走规则快速匹配（寒暄、明确的动作动词），匹配不上再问补全网关。
//! 网关失败或输出无法解析时按「需要动作」处理，由后续规划兜底。

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::llm::{CompletionOptions, LlmClient};
use crate::memory::Message;
use crate::planner::extract_json;

const SMALL_TALK: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "yo",
    "thanks",
    "thank you",
    "good morning",
    "good night",
    "bye",
    "goodbye",
    "how are you",
    "who are you",
    "what's up",
    "lol",
    "你好",
    "谢谢",
];

const ACTION_VERBS: &[&str] = &[
    "collect", "mine", "gather", "get", "craft", "build", "make", "go", "come", "walk", "move",
    "find", "search", "bring", "give", "follow", "attack", "kill", "equip", "discard", "drop",
    "place", "dig", "chop", "smelt", "stop",
];

#[derive(Debug, Deserialize)]
struct Classification {
    requires_action: bool,
}

pub struct GoalClassifier {
    llm: Arc<dyn LlmClient>,
    /// 启用快速规则匹配（不调用 LLM）
    enable_fast_match: bool,
}

impl GoalClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            enable_fast_match: true,
        }
    }

    pub fn without_fast_match(mut self) -> Self {
        self.enable_fast_match = false;
        self
    }

    pub async fn requires_action(&self, goal: &str) -> bool {
        if self.enable_fast_match {
            if let Some(answer) = fast_match(goal) {
                debug!(goal, requires_action = answer, "goal classified by rules");
                return answer;
            }
        }
        self.llm_classify(goal).await.unwrap_or_else(|e| {
            warn!(goal, error = %e, "goal classification failed, assuming action is required");
            true
        })
    }

    async fn llm_classify(&self, goal: &str) -> Result<bool, String> {
        let messages = vec![
            Message::system(
                "You control a Minecraft bot. Decide whether the player's message asks the bot to do something in the world. Reply only with JSON: {\"requires_action\": true|false}",
            ),
            Message::user(goal.to_string()),
        ];
        let options = CompletionOptions::route("classify")
            .with_schema(serde_json::json!({
                "type": "object",
                "properties": { "requires_action": { "type": "boolean" } },
                "required": ["requires_action"]
            }))
            .with_temperature(0.0);
        let raw = self
            .llm
            .complete(&messages, &options)
            .await
            .map_err(|e| e.to_string())?;
        let parsed: Classification = serde_json::from_str(extract_json(&raw, '{', '}'))
            .map_err(|e| format!("{e}: {raw}"))?;
        Ok(parsed.requires_action)
    }
}

/// 快速规则匹配；None 表示规则无法判断
pub fn fast_match(goal: &str) -> Option<bool> {
    let lower = goal.trim().to_lowercase();
    let cleaned = lower.trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace() || c == '！' || c == '？');
    if cleaned.is_empty() {
        return Some(false);
    }
    if SMALL_TALK.iter().any(|p| cleaned == *p) {
        return Some(false);
    }
    let first = cleaned.split_whitespace().next().unwrap_or_default();
    if ACTION_VERBS.contains(&first) {
        return Some(true);
    }
    None
}
