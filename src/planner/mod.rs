//! 规划流水线：计划模型、目标需求、目标分类、步骤生成器、计划执行器

pub mod classifier;
pub mod executor;
pub mod generator;
pub mod goal;
pub mod types;

pub use classifier::GoalClassifier;
pub use executor::{ExecutorSettings, PlanExecutor, PlanOutcome};
pub use generator::{parse_steps, GeneratorSettings, StepGenerator, StepStream};
pub use goal::{extract_requirements, GoalPredicate, GoalRequirements};
pub use types::{Plan, PlanContext, PlanStatus, PlanStep};

/// 从模型输出中截取 JSON 片段：优先 ```json 代码块，否则取第一个 open 到最后一个 close；
/// 都没有时原样返回（交给调用方的解析报错）
pub(crate) fn extract_json(output: &str, open: char, close: char) -> &str {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
    }
    match (trimmed.find(open), trimmed.rfind(close)) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}
