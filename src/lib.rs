//! Craftmind - 游戏智能体控制层
//!
//! 模块划分：
//! - **actions**: 动作 trait、注册表、沙箱动作
//! - **agent**: Agent 上下文对象（显式构造，无全局单例）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、有界重试、失败恢复表、事件信封
//! - **engine**: 单飞动作执行引擎（排队、协作式取消、截止时间、恢复槽）
//! - **llm**: 补全网关抽象与实现（OpenAI 兼容 / Mock / 重试装饰器）
//! - **memory**: 对话消息、计划缓存
//! - **observability**: 日志初始化
//! - **planner**: 计划模型、目标分类、步骤生成器、计划执行器
//! - **world**: 世界查询面、中断信号、内存沙箱世界

pub mod actions;
pub mod agent;
pub mod config;
pub mod core;
pub mod engine;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod planner;
pub mod world;

pub use agent::{Agent, AgentBuilder};
pub use engine::{ActionEngine, ActionFn, ActionOptions, ActionResult};
pub use planner::{Plan, PlanExecutor, PlanStatus, PlanStep};
