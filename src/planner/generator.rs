//! 步骤生成器：目标（+ 失败反馈）-> 惰性的步骤批次流
//!
//! 每次 poll 才发起一次补全调用，得到至多 batch_size 个步骤。流在以下情况结束：
//! 批次短于 batch_size、目标判定已满足、达到 max_batches 上限、或生成出错（错误作为最后一项产出）。
//! 每次调用 generate_steps 都是一条全新的流。

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};

use crate::core::{PlanError, RetryPolicy};
use crate::llm::{CompletionOptions, LlmClient};
use crate::memory::Message;
use crate::planner::goal::GoalPredicate;
use crate::planner::{extract_json, PlanStep};

/// 生成器参数（来自 [planner] 段）
#[derive(Debug, Clone, Copy)]
pub struct GeneratorSettings {
    pub batch_size: usize,
    /// 单条流最多生成的批次数
    pub max_batches: u32,
    pub retry: RetryPolicy,
    pub temperature: Option<f32>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            batch_size: 3,
            max_batches: 16,
            retry: RetryPolicy::new(3, Duration::from_millis(1000)),
            temperature: Some(0.2),
        }
    }
}

pub type StepStream = BoxStream<'static, Result<Vec<PlanStep>, PlanError>>;

#[derive(Clone)]
pub struct StepGenerator {
    llm: Arc<dyn LlmClient>,
    /// 动作目录 JSON（ActionRegistry::to_schema_json）
    catalogue: Arc<str>,
    settings: GeneratorSettings,
}

impl StepGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, catalogue: impl Into<Arc<str>>, settings: GeneratorSettings) -> Self {
        Self {
            llm,
            catalogue: catalogue.into(),
            settings,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.settings.batch_size.max(1)
    }

    pub fn generate_steps(&self, goal: &str, feedback: Option<&str>, achieved: Option<GoalPredicate>) -> StepStream {
        let state = GenState {
            generator: self.clone(),
            goal: goal.to_string(),
            feedback: feedback.map(str::to_string),
            achieved,
            history: Vec::new(),
            batches: 0,
            done: false,
        };
        stream::unfold(state, |mut st| async move {
            if st.done {
                return None;
            }
            if st.batches >= st.generator.settings.max_batches {
                warn!(goal = %st.goal, batches = st.batches, "step generation hit batch cap");
                return None;
            }
            if st.achieved.as_ref().is_some_and(|achieved| (**achieved)()) {
                debug!(goal = %st.goal, "goal achieved, ending generation");
                return None;
            }
            match st.next_batch().await {
                Ok(batch) => {
                    st.batches += 1;
                    debug!(goal = %st.goal, batch = st.batches, steps = batch.len(), "generated step batch");
                    if batch.len() < st.generator.batch_size() {
                        st.done = true;
                    }
                    if batch.is_empty() {
                        return None;
                    }
                    st.history.extend(batch.iter().cloned());
                    Some((Ok(batch), st))
                }
                Err(e) => {
                    st.done = true;
                    Some((Err(e), st))
                }
            }
        })
        .boxed()
    }
}

struct GenState {
    generator: StepGenerator,
    goal: String,
    feedback: Option<String>,
    achieved: Option<GoalPredicate>,
    /// 本条流已产出的步骤，写入提示词避免重复
    history: Vec<PlanStep>,
    batches: u32,
    done: bool,
}

impl GenState {
    fn messages(&self) -> Vec<Message> {
        let batch_size = self.generator.batch_size();
        let system = format!(
            "You are the planner of a Minecraft bot. Available actions:\n{}\n\n\
             Reply with a JSON array of at most {batch_size} steps, each shaped like \
             {{\"description\": string, \"tool\": action name, \"params\": object, \"reasoning\": string}}. \
             Only use the actions listed above. Reply with [] when no more steps are needed.",
            self.generator.catalogue
        );
        let mut user = format!("Goal: {}", self.goal);
        if let Some(feedback) = &self.feedback {
            user.push_str(&format!("\nThe previous attempt failed: {feedback}"));
        }
        if !self.history.is_empty() {
            let history = serde_json::to_string(&self.history).unwrap_or_default();
            user.push_str(&format!("\nSteps already planned: {history}"));
        }
        user.push_str(&format!("\nGive the next {batch_size} steps."));
        vec![Message::system(system), Message::user(user)]
    }

    async fn next_batch(&self) -> Result<Vec<PlanStep>, PlanError> {
        let messages = self.messages();
        let mut options = CompletionOptions::route("planning");
        if let Some(t) = self.generator.settings.temperature {
            options = options.with_temperature(t);
        }
        let (messages, options) = (&messages, &options);
        let llm = &self.generator.llm;
        self.generator
            .settings
            .retry
            .run_with_hook(
                || async move {
                    let raw = llm.complete(messages, options).await?;
                    parse_steps(&raw)
                },
                |err, attempt| warn!(goal = %self.goal, attempt, error = %err, "step generation failed, retrying"),
            )
            .await
    }
}

/// 解析模型输出的步骤数组（允许 ```json 代码块或前后多余文本）
pub fn parse_steps(output: &str) -> Result<Vec<PlanStep>, PlanError> {
    let json_str = extract_json(output, '[', ']');
    serde_json::from_str::<Vec<PlanStep>>(json_str)
        .map_err(|e| PlanError::MalformedSteps(format!("{e}: {json_str}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn settings() -> GeneratorSettings {
        GeneratorSettings {
            retry: RetryPolicy::new(3, Duration::from_millis(10)),
            ..Default::default()
        }
    }

    const FULL_BATCH: &str = r#"[
        {"description": "find logs", "tool": "searchForBlock", "params": {"blockType": "oak_log"}},
        {"description": "chop", "tool": "collectBlocks", "params": {"blockType": "oak_log", "count": 1}},
        {"description": "chop more", "tool": "collectBlocks", "params": {"blockType": "oak_log", "count": 2}}
    ]"#;

    #[test]
    fn test_parse_steps_accepts_code_fence() {
        let steps = parse_steps("Here you go:\n```json\n[{\"tool\": \"moveAway\", \"params\": {\"distance\": 4}}]\n```").unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].tool, "moveAway");
        assert!(matches!(parse_steps("no idea"), Err(PlanError::MalformedSteps(_))));
    }

    #[tokio::test]
    async fn test_short_batch_ends_stream() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_response("planning", FULL_BATCH)
            .push_response("planning", r#"[{"tool": "equip", "params": {"itemName": "oak_log"}}]"#);
        let generator = StepGenerator::new(mock.clone(), "[]", settings());
        let batches: Vec<_> = generator.generate_steps("collect wood", None, None).collect().await;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].as_ref().unwrap().len(), 3);
        assert_eq!(batches[1].as_ref().unwrap()[0].tool, "equip");
        assert_eq!(mock.call_count("planning"), 2);
    }

    #[tokio::test]
    async fn test_lazy_one_call_per_poll() {
        let mock = Arc::new(MockLlmClient::new());
        mock.set_default("planning", FULL_BATCH);
        let generator = StepGenerator::new(mock.clone(), "[]", settings());
        let mut stream = generator.generate_steps("build a house", None, None);
        assert_eq!(mock.call_count("planning"), 0);
        stream.next().await.unwrap().unwrap();
        assert_eq!(mock.call_count("planning"), 1);
        stream.next().await.unwrap().unwrap();
        assert_eq!(mock.call_count("planning"), 2);
    }

    #[tokio::test]
    async fn test_batch_cap_bounds_endless_model() {
        let mock = Arc::new(MockLlmClient::new());
        mock.set_default("planning", FULL_BATCH);
        let generator = StepGenerator::new(
            mock.clone(),
            "[]",
            GeneratorSettings {
                max_batches: 4,
                ..settings()
            },
        );
        let count = generator.generate_steps("build", None, None).count().await;
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_goal_predicate_stops_generation() {
        let mock = Arc::new(MockLlmClient::new());
        mock.set_default("planning", FULL_BATCH);
        let generator = StepGenerator::new(mock.clone(), "[]", settings());
        let achieved = Arc::new(AtomicBool::new(false));
        let flag = achieved.clone();
        let mut stream = generator.generate_steps(
            "collect wood",
            None,
            Some(Arc::new(move || flag.load(Ordering::SeqCst))),
        );
        assert!(stream.next().await.is_some());
        achieved.store(true, Ordering::SeqCst);
        assert!(stream.next().await.is_none());
        assert_eq!(mock.call_count("planning"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_output_retried_then_error_ends_stream() {
        let mock = Arc::new(MockLlmClient::new());
        mock.set_default("planning", "I cannot plan that");
        let generator = StepGenerator::new(mock.clone(), "[]", settings());
        let items: Vec<_> = generator.generate_steps("collect wood", None, None).collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(PlanError::MalformedSteps(_))));
        assert_eq!(mock.call_count("planning"), 3);
    }

    #[tokio::test]
    async fn test_invalid_request_not_retried() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_error("planning", LlmError::InvalidRequest("schema rejected".into()));
        let generator = StepGenerator::new(mock.clone(), "[]", settings());
        let items: Vec<_> = generator.generate_steps("collect wood", None, None).collect().await;
        assert!(matches!(items[0], Err(PlanError::Generation(LlmError::InvalidRequest(_)))));
        assert_eq!(mock.call_count("planning"), 1);
    }

    #[tokio::test]
    async fn test_prompt_carries_feedback_and_history() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_response("planning", FULL_BATCH).push_response("planning", "[]");
        let generator = StepGenerator::new(mock.clone(), r#"[{"name": "collectBlocks"}]"#, settings());
        let _: Vec<_> = generator
            .generate_steps("collect wood", Some("inventory full"), None)
            .collect()
            .await;
        let calls = mock.calls();
        assert!(calls[0].messages[0].content.contains("collectBlocks"));
        assert!(calls[0].messages[1].content.contains("inventory full"));
        assert!(!calls[0].messages[1].content.contains("already planned"));
        assert!(calls[1].messages[1].content.contains("already planned"));
    }
}
