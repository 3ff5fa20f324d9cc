//! 计划执行器
//!
//! create_plan：查计划缓存 -> 目标分类 -> 生成 pending 计划（或直接 completed 的无动作计划）。
//! execute_plan：生产者（步骤生成器）与消费者（逐步提交给动作引擎）在同一任务上 join，
//! 中间是有界 mpsc 通道，消费者停下时生产者也会停在 send 上。
//! 某一步失败时：取消生产者、丢弃通道里未执行的步骤、用恢复表生成调整计划并重新执行，
//! 直到成功或 retry_count 达到 max_retries。
//! 操作员 stop() 后不再提交新步骤，计划以 PlanError::Stopped 结束，不重试。

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actions::{validate_params, ActionRegistry};
use crate::core::{AgentEvent, EventSink, PlanError, RecoveryEngine};
use crate::engine::{ActionEngine, ActionFn, ActionOptions};
use crate::llm::LlmClient;
use crate::memory::{NoopPlanMemory, PlanMemory};
use crate::planner::goal::{extract_requirements, GoalPredicate};
use crate::planner::{GeneratorSettings, GoalClassifier, Plan, PlanContext, PlanStatus, PlanStep, StepGenerator};
use crate::world::Environment;

/// 执行器参数（来自 [planner] / [actions] 段）
#[derive(Debug, Clone, Copy)]
pub struct ExecutorSettings {
    pub max_retries: u32,
    /// 缓存中已完成计划可复用的时长；零表示不复用
    pub cache_ttl: Duration,
    /// 待执行步骤通道容量
    pub step_channel_capacity: usize,
    /// 每一步的截止时间；零表示不设
    pub action_timeout: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            cache_ttl: Duration::from_secs(3600),
            step_channel_capacity: 8,
            action_timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// 执行结束时的计划与上下文
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: Plan,
    pub context: PlanContext,
}

enum PassOutcome {
    /// 本轮执行过的全部步骤
    Completed(Vec<PlanStep>),
    StepFailed { step: PlanStep, feedback: String },
    GenerationFailed(PlanError),
    Stopped,
}

enum Consumed {
    Done(Vec<PlanStep>),
    Failed { step: PlanStep, feedback: String },
    Stopped,
}

pub struct PlanExecutor {
    engine: Arc<ActionEngine>,
    registry: ActionRegistry,
    env: Environment,
    llm: Arc<dyn LlmClient>,
    memory: Arc<dyn PlanMemory>,
    classifier: GoalClassifier,
    generator: StepGenerator,
    recovery: RecoveryEngine,
    settings: ExecutorSettings,
    events: EventSink,
    /// 操作员 stop() 时取消，下一次 create_plan 时换新
    halt: Mutex<CancellationToken>,
}

impl PlanExecutor {
    pub fn new(engine: Arc<ActionEngine>, registry: ActionRegistry, env: Environment, llm: Arc<dyn LlmClient>) -> Self {
        let generator = StepGenerator::new(llm.clone(), registry.to_schema_json(), GeneratorSettings::default());
        Self {
            engine,
            classifier: GoalClassifier::new(llm.clone()),
            generator,
            registry,
            env,
            llm,
            memory: Arc::new(NoopPlanMemory),
            recovery: RecoveryEngine::new(),
            settings: ExecutorSettings::default(),
            events: EventSink::default(),
            halt: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn PlanMemory>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_generator_settings(mut self, settings: GeneratorSettings) -> Self {
        self.generator = StepGenerator::new(self.llm.clone(), self.registry.to_schema_json(), settings);
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn engine(&self) -> &Arc<ActionEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// 操作员打断：当前计划不再提交步骤也不再重试，正在执行的动作收到中断信号
    pub fn stop(&self) {
        self.halt_token().cancel();
        self.engine.stop();
    }

    fn halt_token(&self) -> CancellationToken {
        self.halt.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn reset_halt(&self) {
        let mut halt = self.halt.lock().unwrap_or_else(PoisonError::into_inner);
        if halt.is_cancelled() {
            *halt = CancellationToken::new();
        }
    }

    pub async fn create_plan(&self, goal: &str) -> Result<Plan, PlanError> {
        self.reset_halt();
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(PlanError::InvalidPlan("goal is empty".to_string()));
        }

        if let Some(cached) = self.memory.recall(goal) {
            if !cached.requires_action {
                debug!(goal, "reusing cached no-action plan");
                return Ok(cached);
            }
            if self.is_reusable(&cached) {
                info!(goal, steps = cached.steps.len(), "reusing cached plan steps");
                return Ok(Plan::new(goal, cached.steps).with_generate(false));
            }
        }

        if !self.classifier.requires_action(goal).await {
            let plan = Plan::no_action(goal);
            self.memory.remember(goal, &plan);
            return Ok(plan);
        }
        Ok(Plan::new(goal, Vec::new()))
    }

    fn is_reusable(&self, cached: &Plan) -> bool {
        if cached.status != PlanStatus::Completed || cached.steps.is_empty() || self.settings.cache_ttl.is_zero() {
            return false;
        }
        let fresh = (chrono::Utc::now() - cached.created_at)
            .to_std()
            .map_or(true, |age| age <= self.settings.cache_ttl);
        if !fresh {
            return false;
        }
        match cached.validate(&self.registry) {
            Ok(()) => true,
            Err(e) => {
                debug!(goal = %cached.goal, error = %e, "cached plan no longer valid");
                false
            }
        }
    }

    /// 失败反馈 -> 新的 pending 计划：恢复步骤在前，之后继续带反馈生成
    pub fn adjust_plan(&self, plan: &Plan, feedback: &str) -> Plan {
        self.adjust_plan_after(plan, feedback, None)
    }

    /// 同 adjust_plan；已知失败步骤时，恢复步骤可沿用它的目标（如要找的方块）
    pub fn adjust_plan_after(&self, plan: &Plan, feedback: &str, failed_step: Option<&PlanStep>) -> Plan {
        let recovery = self.recovery.recovery_steps(feedback, failed_step);
        Plan::new(plan.goal.clone(), recovery).with_feedback(feedback)
    }

    pub async fn execute_plan(&self, plan: Plan) -> Result<PlanOutcome, PlanError> {
        let mut context = PlanContext::new();
        if !plan.requires_action {
            debug!(goal = %plan.goal, "plan requires no action");
            return Ok(PlanOutcome { plan, context });
        }
        let halt = self.halt_token();

        let achieved = extract_requirements(self.llm.as_ref(), &plan.goal)
            .await
            .predicate(self.env.world.clone());

        let mut plan = plan;
        loop {
            plan.start()?;
            self.emit_status(&plan);
            info!(
                goal = %plan.goal,
                plan_id = %plan.id,
                seeded = plan.steps.len(),
                retry_count = context.retry_count,
                "executing plan"
            );

            match self.run_pass(&plan, &mut context, achieved.clone(), &halt).await {
                PassOutcome::Completed(executed) => {
                    plan.steps = executed;
                    plan.complete()?;
                    self.emit_status(&plan);
                    info!(goal = %plan.goal, steps = context.current_step_index, "plan completed");
                    self.memory.remember(&plan.goal, &plan);
                    return Ok(PlanOutcome { plan, context });
                }
                PassOutcome::GenerationFailed(err) => {
                    plan.fail()?;
                    self.emit_status(&plan);
                    warn!(goal = %plan.goal, error = %err, "step generation failed, plan failed");
                    return Err(err);
                }
                PassOutcome::Stopped => {
                    plan.fail()?;
                    self.emit_status(&plan);
                    warn!(goal = %plan.goal, "plan stopped by operator");
                    return Err(PlanError::Stopped { plan: Box::new(plan) });
                }
                PassOutcome::StepFailed { step, feedback } => {
                    plan.fail()?;
                    self.emit_status(&plan);
                    if context.retry_count >= self.settings.max_retries {
                        warn!(goal = %plan.goal, retry_count = context.retry_count, %feedback, "retries exhausted");
                        return Err(PlanError::RetriesExhausted {
                            plan: Box::new(plan),
                            retry_count: context.retry_count,
                            feedback,
                        });
                    }
                    context.retry_count += 1;
                    let adjusted = self.adjust_plan_after(&plan, &feedback, Some(&step));
                    info!(
                        goal = %plan.goal,
                        retry_count = context.retry_count,
                        recovery_steps = adjusted.steps.len(),
                        "adjusted plan after failure"
                    );
                    self.events.emit(AgentEvent::PlanAdjusted {
                        goal: plan.goal.clone(),
                        retry_count: context.retry_count,
                        recovery_steps: adjusted.steps.len(),
                    });
                    plan = adjusted;
                }
            }
        }
    }

    /// 一轮执行：种子步骤，然后是生成器产出的步骤
    async fn run_pass(
        &self,
        plan: &Plan,
        context: &mut PlanContext,
        achieved: Option<GoalPredicate>,
        halt: &CancellationToken,
    ) -> PassOutcome {
        let (tx, mut rx) = mpsc::channel::<PlanStep>(self.settings.step_channel_capacity.max(1));
        let cancel = halt.child_token();
        let generating = context.generating_flag();
        generating.store(plan.generate, Ordering::SeqCst);

        let producer = async {
            let tx = tx;
            if !plan.generate {
                return None;
            }
            let mut batches = self
                .generator
                .generate_steps(&plan.goal, plan.feedback.as_deref(), achieved);
            let mut error = None;
            'produce: loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = batches.next() => next,
                };
                match next {
                    Some(Ok(batch)) => {
                        for step in batch {
                            tokio::select! {
                                _ = cancel.cancelled() => break 'produce,
                                sent = tx.send(step) => if sent.is_err() {
                                    break 'produce;
                                },
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error = Some(e);
                        break;
                    }
                    None => break,
                }
            }
            generating.store(false, Ordering::SeqCst);
            error
        };

        let consumer = async {
            let mut executed = Vec::new();
            let mut seeded = plan.steps.iter().cloned();
            loop {
                if halt.is_cancelled() {
                    abandon_pending(&cancel, &mut rx);
                    return Consumed::Stopped;
                }
                let step = match seeded.next() {
                    Some(step) => step,
                    None => {
                        let received = tokio::select! {
                            _ = halt.cancelled() => {
                                abandon_pending(&cancel, &mut rx);
                                return Consumed::Stopped;
                            }
                            received = rx.recv() => received,
                        };
                        match received {
                            Some(step) => step,
                            None => return Consumed::Done(executed),
                        }
                    }
                };
                if let Err(feedback) = self.run_step(&step, context).await {
                    abandon_pending(&cancel, &mut rx);
                    if halt.is_cancelled() {
                        return Consumed::Stopped;
                    }
                    self.events.emit(AgentEvent::StepFailed {
                        tool: step.tool.clone(),
                        feedback: feedback.clone(),
                    });
                    return Consumed::Failed { step, feedback };
                }
                executed.push(step);
            }
        };

        let (generation_error, consumed) = tokio::join!(producer, consumer);
        if halt.is_cancelled() {
            return PassOutcome::Stopped;
        }
        match consumed {
            Consumed::Failed { step, feedback } => PassOutcome::StepFailed { step, feedback },
            Consumed::Stopped => PassOutcome::Stopped,
            Consumed::Done(executed) => match generation_error {
                Some(err) => PassOutcome::GenerationFailed(err),
                None => PassOutcome::Completed(executed),
            },
        }
    }

    /// 把一个步骤交给动作引擎；失败时返回反馈文本
    async fn run_step(&self, step: &PlanStep, context: &mut PlanContext) -> Result<(), String> {
        self.events.emit(AgentEvent::StepStarted {
            index: context.current_step_index,
            tool: step.tool.clone(),
        });
        let action = self
            .registry
            .get(&step.tool)
            .ok_or_else(|| format!("{} failed: unknown action", step.tool))?;
        validate_params(&action.parameters(), &step.params).map_err(|e| format!("{} failed: {e}", step.tool))?;

        let env = self.env.clone();
        let params = step.params.clone();
        let func = ActionFn::new(move || {
            let (action, env, params) = (action.clone(), env.clone(), params.clone());
            async move { action.perform(env, params).await }
        });
        let options = ActionOptions::default().with_timeout(self.settings.action_timeout);
        let result = self.engine.run_action(step.label(), func, options).await;
        if result.success {
            context.advance();
            debug!(tool = %step.tool, index = context.current_step_index, "step done");
            Ok(())
        } else {
            Err(result
                .message
                .unwrap_or_else(|| format!("{} failed", step.label())))
        }
    }

    fn emit_status(&self, plan: &Plan) {
        self.events.emit(AgentEvent::PlanStatusChanged {
            goal: plan.goal.clone(),
            status: plan.status,
        });
    }
}

/// 取消生产者并丢弃通道里尚未执行的步骤
fn abandon_pending(cancel: &CancellationToken, rx: &mut mpsc::Receiver<PlanStep>) {
    cancel.cancel();
    rx.close();
    let mut discarded = 0;
    while rx.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        debug!(discarded, "discarded pending plan steps");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{register_sandbox_actions, FnAction};
    use crate::core::RetryPolicy;
    use crate::llm::{CompletionOptions, LlmError, MockLlmClient};
    use crate::memory::{InMemoryPlanMemory, Message};
    use crate::world::{InterruptSignal, SandboxWorld};
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn executor(world: SandboxWorld, mock: Arc<MockLlmClient>) -> PlanExecutor {
        let world = Arc::new(world);
        let interrupt = InterruptSignal::new();
        let mut registry = ActionRegistry::new();
        register_sandbox_actions(&mut registry, world.clone(), Duration::ZERO);
        let engine = Arc::new(ActionEngine::new(interrupt.clone()));
        let env = Environment::new(world, interrupt);
        PlanExecutor::new(engine, registry, env, mock).with_generator_settings(GeneratorSettings {
            retry: RetryPolicy::new(1, Duration::ZERO),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_small_talk_is_no_action_plan() {
        let mock = Arc::new(MockLlmClient::new());
        let executor = executor(SandboxWorld::new(), mock.clone());
        let plan = executor.create_plan("hello").await.unwrap();
        assert!(!plan.requires_action);
        assert_eq!(plan.status, PlanStatus::Completed);
        let outcome = executor.execute_plan(plan).await.unwrap();
        assert_eq!(outcome.context.current_step_index, 0);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_goal_rejected() {
        let executor = executor(SandboxWorld::new(), Arc::new(MockLlmClient::new()));
        assert!(matches!(executor.create_plan("  ").await, Err(PlanError::InvalidPlan(_))));
    }

    #[tokio::test]
    async fn test_seeded_steps_run_before_generated() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_response("planning", r#"[{"tool": "collectBlocks", "params": {"blockType": "oak_log"}}]"#);
        let executor = executor(SandboxWorld::new().with_block_far("oak_log", 2), mock);
        let seeded = vec![PlanStep::new("searchForBlock", "look far", json!({ "blockType": "oak_log", "range": 128 }))];
        let outcome = executor.execute_plan(Plan::new("collect wood", seeded)).await.unwrap();
        let tools: Vec<_> = outcome.plan.steps.iter().map(|s| s.tool.as_str()).collect();
        assert_eq!(tools, vec!["searchForBlock", "collectBlocks"]);
        assert_eq!(outcome.plan.status, PlanStatus::Completed);
        assert_eq!(outcome.context.current_step_index, 2);
    }

    #[tokio::test]
    async fn test_cached_plan_reused_without_planning_call() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_response(
            "planning",
            r#"[{"tool": "collectBlocks", "params": {"blockType": "oak_log", "count": 1}}]"#,
        );
        let memory = Arc::new(InMemoryPlanMemory::new());
        let executor = executor(SandboxWorld::new().with_block_nearby("oak_log", 4), mock.clone())
            .with_memory(memory.clone());

        let plan = executor.create_plan("collect wood").await.unwrap();
        executor.execute_plan(plan).await.unwrap();
        assert_eq!(mock.call_count("planning"), 1);
        assert_eq!(memory.len(), 1);

        let again = executor.create_plan("collect wood").await.unwrap();
        assert!(!again.generate);
        assert_eq!(again.steps.len(), 1);
        assert_eq!(again.status, PlanStatus::Pending);
        let outcome = executor.execute_plan(again).await.unwrap();
        assert_eq!(outcome.plan.status, PlanStatus::Completed);
        assert_eq!(mock.call_count("planning"), 1);
    }

    #[tokio::test]
    async fn test_cache_ttl_zero_disables_reuse() {
        let mock = Arc::new(MockLlmClient::new());
        let memory = Arc::new(InMemoryPlanMemory::new());
        let mut done = Plan::new("collect wood", vec![PlanStep::new("moveAway", "", json!({ "distance": 1 }))]);
        done.start().unwrap();
        done.complete().unwrap();
        memory.remember("collect wood", &done);
        let executor = executor(SandboxWorld::new(), mock)
            .with_memory(memory)
            .with_settings(ExecutorSettings {
                cache_ttl: Duration::ZERO,
                ..Default::default()
            });
        let plan = executor.create_plan("collect wood").await.unwrap();
        assert!(plan.generate);
        assert!(plan.steps.is_empty());
    }

    #[tokio::test]
    async fn test_adjust_plan_is_deterministic() {
        let executor = executor(SandboxWorld::new(), Arc::new(MockLlmClient::new()));
        let failed = Plan::new("collect wood", vec![]);
        let a = executor.adjust_plan(&failed, "collectBlocks failed: inventory full");
        let b = executor.adjust_plan(&failed, "collectBlocks failed: inventory full");
        assert_eq!(a.steps, b.steps);
        assert_eq!(a.steps[0].tool, "discard");
        assert_eq!(a.status, PlanStatus::Pending);
        assert!(a.generate);
        assert_eq!(a.feedback.as_deref(), Some("collectBlocks failed: inventory full"));
        assert_ne!(a.id, failed.id);
    }

    #[tokio::test]
    async fn test_generation_failure_fails_plan_without_retry() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_error("planning", LlmError::InvalidRequest("bad schema".into()));
        let executor = executor(SandboxWorld::new(), mock);
        let err = executor
            .execute_plan(Plan::new("collect wood", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::Generation(LlmError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_terminal_plan_cannot_be_executed() {
        let executor = executor(SandboxWorld::new(), Arc::new(MockLlmClient::new()));
        let mut plan = Plan::new("collect wood", vec![]);
        plan.start().unwrap();
        plan.fail().unwrap();
        assert!(matches!(
            executor.execute_plan(plan).await,
            Err(PlanError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_tool_feeds_back_into_retry() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_response("planning", r#"[{"tool": "teleport", "params": {}}]"#)
            .push_response("planning", "[]");
        let executor = executor(SandboxWorld::new(), mock.clone());
        let outcome = executor
            .execute_plan(Plan::new("go home", vec![]))
            .await
            .unwrap();
        assert_eq!(outcome.context.retry_count, 1);
        let calls = mock.calls();
        let retry_prompt = &calls.last().unwrap().messages[1].content;
        assert!(retry_prompt.contains("teleport failed: unknown action"));
    }

    /// 接受操作员打断的执行器：registry 由用例提供
    fn stoppable(registry: ActionRegistry, llm: Arc<dyn LlmClient>) -> (Arc<PlanExecutor>, Arc<ActionEngine>) {
        let interrupt = InterruptSignal::new();
        let engine = Arc::new(ActionEngine::new(interrupt.clone()));
        let env = Environment::new(Arc::new(SandboxWorld::new()), interrupt);
        let executor = Arc::new(PlanExecutor::new(engine.clone(), registry, env, llm));
        (executor, engine)
    }

    fn counting_dig(registry: &mut ActionRegistry) -> Arc<AtomicUsize> {
        let dug = Arc::new(AtomicUsize::new(0));
        let counter = dug.clone();
        registry.register(FnAction::new("dig", "dig down", vec![], move |_: Environment, _: Value| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("dug".to_string())
            }
        }));
        dug
    }

    /// planning 路由永不返回，其它路由立即返回空对象
    #[derive(Default)]
    struct StallingPlanner {
        planning_started: Notify,
    }

    #[async_trait::async_trait]
    impl LlmClient for StallingPlanner {
        async fn complete(&self, _messages: &[Message], options: &CompletionOptions) -> Result<String, LlmError> {
            if options.route == "planning" {
                self.planning_started.notify_one();
                std::future::pending::<()>().await;
            }
            Ok("{}".to_string())
        }
    }

    fn assert_stopped(result: Result<PlanOutcome, PlanError>) {
        match result {
            Err(PlanError::Stopped { plan }) => assert_eq!(plan.status, PlanStatus::Failed),
            Err(other) => panic!("unexpected {other}"),
            Ok(outcome) => panic!("plan kept running: {:?}", outcome.plan.status),
        }
    }

    #[tokio::test]
    async fn test_stop_ends_plan_without_retry() {
        let mut registry = ActionRegistry::new();
        registry.register(FnAction::new("follow", "follow a player", vec![], |env: Environment, _: Value| async move {
            env.interrupt.raised().await;
            Err("interrupted".to_string())
        }));
        let mock = Arc::new(MockLlmClient::new());
        mock.push_response("planning", r#"[{"tool": "follow"}]"#);
        let (executor, engine) = stoppable(registry, mock.clone());

        let running = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute_plan(Plan::new("follow me", vec![])).await })
        };
        while !engine.is_executing() {
            tokio::task::yield_now().await;
        }
        executor.stop();
        assert_stopped(running.await.unwrap());
        assert_eq!(mock.call_count("planning"), 1);
    }

    #[tokio::test]
    async fn test_stop_after_clean_exit_skips_remaining_steps() {
        let mut registry = ActionRegistry::new();
        registry.register(FnAction::new("follow", "follow a player", vec![], |env: Environment, _: Value| async move {
            env.interrupt.raised().await;
            Ok("stopped following".to_string())
        }));
        let dug = counting_dig(&mut registry);
        let (executor, engine) = stoppable(registry, Arc::new(MockLlmClient::new()));

        let seeded = vec![
            PlanStep::new("follow", "", json!({})),
            PlanStep::new("dig", "", json!({})),
        ];
        let running = {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .execute_plan(Plan::new("follow then dig", seeded).with_generate(false))
                    .await
            })
        };
        while !engine.is_executing() {
            tokio::task::yield_now().await;
        }
        executor.stop();
        assert_stopped(running.await.unwrap());
        assert_eq!(dug.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_during_generation_ends_plan() {
        let mut registry = ActionRegistry::new();
        let dug = counting_dig(&mut registry);
        let llm = Arc::new(StallingPlanner::default());
        let (executor, _engine) = stoppable(registry, llm.clone());

        let running = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute_plan(Plan::new("dig a hole", vec![])).await })
        };
        llm.planning_started.notified().await;
        executor.stop();
        let result = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("stop did not end a generating plan")
            .unwrap();
        assert_stopped(result);
        assert_eq!(dug.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_before_execute_is_kept_until_next_create_plan() {
        let mut registry = ActionRegistry::new();
        let dug = counting_dig(&mut registry);
        let mock = Arc::new(MockLlmClient::new());
        mock.set_default("planning", r#"[{"tool": "dig"}]"#);
        let (executor, _engine) = stoppable(registry, mock);

        let plan = executor.create_plan("dig a hole").await.unwrap();
        executor.stop();
        assert_stopped(executor.execute_plan(plan).await);
        assert_eq!(dug.load(Ordering::SeqCst), 0);

        let plan = executor.create_plan("dig a hole").await.unwrap();
        let outcome = executor.execute_plan(plan).await.unwrap();
        assert_eq!(outcome.plan.status, PlanStatus::Completed);
        assert_eq!(dug.load(Ordering::SeqCst), 1);
    }
}
