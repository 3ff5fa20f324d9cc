//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CRAFTMIND__*` 覆盖（双下划线表示嵌套，如 `CRAFTMIND__LLM__PROVIDER=openai`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::RetryPolicy;
use crate::llm::RetryConfig;
use crate::planner::{ExecutorSettings, GeneratorSettings};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub actions: ActionsSection,
    pub planner: PlannerSection,
}

/// [agent] 段：机器人名、对话轮数上限
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_agent_name")]
    pub name: String,
    /// 操作员对话保留轮数
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            max_history_turns: default_max_history_turns(),
        }
    }
}

fn default_agent_name() -> String {
    "craftmind".to_string()
}

fn default_max_history_turns() -> usize {
    20
}

/// [llm] 段：后端选择与重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / mock；openai 需要 OPENAI_API_KEY，否则退回 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// 重试间隔（毫秒）
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl LlmSection {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// [actions] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ActionsSection {
    /// 单个动作的截止时间（分钟），0 表示不设
    #[serde(default = "default_timeout_minutes")]
    pub default_timeout_minutes: u64,
    /// 沙箱动作的模拟耗时（毫秒）
    #[serde(default = "default_sandbox_delay_ms")]
    pub sandbox_delay_ms: u64,
}

impl Default for ActionsSection {
    fn default() -> Self {
        Self {
            default_timeout_minutes: default_timeout_minutes(),
            sandbox_delay_ms: default_sandbox_delay_ms(),
        }
    }
}

fn default_timeout_minutes() -> u64 {
    10
}

fn default_sandbox_delay_ms() -> u64 {
    200
}

/// [planner] 段：批大小、批次上限、重试上限、缓存有效期、步骤通道容量
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerSection {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_batches")]
    pub max_batches: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_step_channel_capacity")]
    pub step_channel_capacity: usize,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_batches: default_max_batches(),
            max_retries: default_max_retries(),
            cache_ttl_secs: default_cache_ttl_secs(),
            step_channel_capacity: default_step_channel_capacity(),
        }
    }
}

fn default_batch_size() -> usize {
    3
}

fn default_max_batches() -> u32 {
    16
}

fn default_max_retries() -> u32 {
    3
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_step_channel_capacity() -> usize {
    8
}

impl AppConfig {
    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            batch_size: self.planner.batch_size,
            max_batches: self.planner.max_batches,
            retry: RetryPolicy::new(self.llm.retry_attempts, Duration::from_millis(self.llm.retry_delay_ms)),
            temperature: Some(self.llm.temperature),
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            max_retries: self.planner.max_retries,
            cache_ttl: Duration::from_secs(self.planner.cache_ttl_secs),
            step_channel_capacity: self.planner.step_channel_capacity,
            action_timeout: Duration::from_secs(self.actions.default_timeout_minutes.saturating_mul(60)),
        }
    }
}

/// 从 config 目录加载配置，环境变量 CRAFTMIND__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CRAFTMIND__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CRAFTMIND")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
