//! Agent 上下文对象
//!
//! 由顶层进程显式构造并持有：动作注册表、动作引擎、计划执行器、计划缓存、操作员对话历史。
//! 没有全局单例，测试里每个用例都可以构造一个全新的 Agent。

use std::sync::{Arc, Mutex, PoisonError};

use crate::actions::ActionRegistry;
use crate::config::AppConfig;
use crate::core::{AgentError, EventSender, EventSink};
use crate::engine::{ActionEngine, ExecutionSnapshot};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient, RetryingLlmClient};
use crate::memory::{ConversationMemory, InMemoryPlanMemory, Message, PlanMemory};
use crate::planner::{PlanExecutor, PlanOutcome};
use crate::world::{Environment, InterruptSignal, World};

/// 按配置创建补全网关：openai 且有 OPENAI_API_KEY 时用 OpenAI 兼容端点（带重试），否则用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let api_key = std::env::var("OPENAI_API_KEY").ok();
    match (provider.as_str(), api_key) {
        ("openai", Some(key)) => {
            tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
            let client = OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, Some(&key));
            Arc::new(RetryingLlmClient::new(Arc::new(client), cfg.llm.retry_config()))
        }
        ("mock", _) => Arc::new(MockLlmClient::new()),
        _ => {
            tracing::warn!("No API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
    }
}

pub struct AgentBuilder {
    config: AppConfig,
    registry: ActionRegistry,
    world: Option<Arc<dyn World>>,
    llm: Option<Arc<dyn LlmClient>>,
    memory: Option<Arc<dyn PlanMemory>>,
    events: Option<EventSender>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            registry: ActionRegistry::new(),
            world: None,
            llm: None,
            memory: None,
            events: None,
        }
    }

    pub fn registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn world(mut self, world: Arc<dyn World>) -> Self {
        self.world = Some(world);
        self
    }

    /// 未设置时按 [llm] 段创建
    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 未设置时使用进程内缓存
    pub fn memory(mut self, memory: Arc<dyn PlanMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn events(mut self, tx: EventSender) -> Self {
        self.events = Some(tx);
        self
    }

    /// 需在 tokio 运行时内调用（动作引擎会启动 worker 任务）
    pub fn build(self) -> Result<Agent, AgentError> {
        let world = self
            .world
            .ok_or_else(|| AgentError::NotInitialized("no world attached".to_string()))?;
        let llm = self
            .llm
            .unwrap_or_else(|| create_llm_from_config(&self.config));
        let memory = self
            .memory
            .unwrap_or_else(|| Arc::new(InMemoryPlanMemory::new()));

        let interrupt = InterruptSignal::new();
        let engine = Arc::new(ActionEngine::with_events(
            interrupt.clone(),
            EventSink::new("engine", self.events.clone()),
        ));
        let executor = PlanExecutor::new(engine, self.registry, Environment::new(world, interrupt), llm)
            .with_memory(memory)
            .with_settings(self.config.executor_settings())
            .with_generator_settings(self.config.generator_settings())
            .with_events(EventSink::new("planner", self.events));

        Ok(Agent {
            name: self.config.agent.name.clone(),
            executor,
            history: Mutex::new(ConversationMemory::new(self.config.agent.max_history_turns)),
        })
    }
}

pub struct Agent {
    name: String,
    executor: PlanExecutor,
    history: Mutex<ConversationMemory>,
}

impl Agent {
    pub fn builder(config: AppConfig) -> AgentBuilder {
        AgentBuilder::new(config)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn executor(&self) -> &PlanExecutor {
        &self.executor
    }

    /// 目标 -> 计划 -> 执行；失败超过重试上限时返回 Err
    pub async fn run_goal(&self, goal: &str) -> Result<PlanOutcome, AgentError> {
        if self.executor.registry().is_empty() {
            return Err(AgentError::NotInitialized("no actions registered".to_string()));
        }
        let plan = self.executor.create_plan(goal).await?;
        Ok(self.executor.execute_plan(plan).await?)
    }

    /// 面向聊天的入口：总是返回一句人能读懂的回复，并记入对话历史
    pub async fn handle_goal(&self, goal: &str) -> String {
        let reply = match self.run_goal(goal).await {
            Ok(outcome) => self.summarize(&outcome),
            Err(e) => {
                tracing::warn!(goal, error = %e, "goal failed");
                e.chat_message()
            }
        };
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_turn(goal, reply.clone());
        reply
    }

    fn summarize(&self, outcome: &PlanOutcome) -> String {
        if !outcome.plan.requires_action {
            return format!("{} here. Nothing to do for \"{}\".", self.name, outcome.plan.goal);
        }
        let steps = outcome.context.current_step_index;
        match outcome.context.retry_count {
            0 => format!("Done: {} ({steps} steps).", outcome.plan.goal),
            retries => format!("Done: {} ({steps} steps, {retries} retries).", outcome.plan.goal),
        }
    }

    /// 操作员打断：停止当前动作、丢弃排队动作，当前计划不再重试
    pub fn stop(&self) {
        tracing::info!("operator stop requested");
        self.executor.stop();
    }

    pub fn cancel_resume(&self) {
        self.executor.engine().cancel_resume();
    }

    pub fn snapshot(&self) -> ExecutionSnapshot {
        self.executor.engine().snapshot()
    }

    pub fn history(&self) -> Vec<Message> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .messages()
            .to_vec()
    }
}
