//! 动作注册表
//!
//! 所有动作实现 Action trait（name / description / parameters / perform），由 ActionRegistry
//! 按名注册与查找。注册表由 Agent 显式构造并按引用传递，没有全局单例。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::world::Environment;

/// 参数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Number => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
        }
    }
}

/// 有序参数表中的一项
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionParam {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
}

impl ActionParam {
    pub fn required(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// 按参数表校验一组实参（JSON 对象）
pub fn validate_params(schema: &[ActionParam], params: &Value) -> Result<(), String> {
    let empty = serde_json::Map::new();
    let obj = match params {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => return Err(format!("params must be an object, got {other}")),
    };
    for param in schema {
        match obj.get(&param.name) {
            None | Some(Value::Null) if param.required => {
                return Err(format!("missing required parameter '{}'", param.name));
            }
            Some(value) if !value.is_null() && !param.kind.accepts(value) => {
                return Err(format!(
                    "parameter '{}' should be {:?}, got {value}",
                    param.name, param.kind
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// 动作 trait：名称、描述（供 LLM 理解）、参数表、在环境中执行
#[async_trait]
pub trait Action: Send + Sync {
    /// 唯一键（计划步骤中的 "tool" 字段）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ActionParam> {
        Vec::new()
    }

    /// 执行动作；实现应在 env.interrupt 被拉起后尽快返回
    async fn perform(&self, env: Environment, params: Value) -> Result<String, String>;
}

/// 闭包动作：便于嵌入方与测试直接注册
pub struct FnAction<F> {
    name: String,
    description: String,
    params: Vec<ActionParam>,
    f: F,
}

impl<F, Fut> FnAction<F>
where
    F: Fn(Environment, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, String>> + Send + 'static,
{
    pub fn new(name: &str, description: &str, params: Vec<ActionParam>, f: F) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            params,
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> Action for FnAction<F>
where
    F: Fn(Environment, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, String>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Vec<ActionParam> {
        self.params.clone()
    }

    async fn perform(&self, env: Environment, params: Value) -> Result<String, String> {
        (self.f)(env, params).await
    }
}

/// 动作注册表：保持注册顺序，便于生成稳定的提示词
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
    order: Vec<String>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名动作会被替换（保留原顺序位置）
    pub fn register(&mut self, action: impl Action + 'static) {
        let name = action.name().to_string();
        if !self.actions.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.actions.insert(name, Arc::new(action));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 动作目录 JSON（名称、描述、参数表），注入规划提示词
    pub fn to_schema_json(&self) -> String {
        let actions: Vec<Value> = self
            .order
            .iter()
            .filter_map(|name| self.actions.get(name))
            .map(|action| {
                serde_json::json!({
                    "name": action.name(),
                    "description": action.description(),
                    "parameters": action.parameters(),
                })
            })
            .collect();
        serde_json::to_string_pretty(&actions).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{InterruptSignal, SandboxWorld};
    use serde_json::json;

    fn echo_action() -> FnAction<impl Fn(Environment, Value) -> futures_util::future::Ready<Result<String, String>> + Send + Sync> {
        FnAction::new(
            "say",
            "Say something in chat",
            vec![ActionParam::required("text", ParamKind::String, "what to say")],
            |_env, params| futures_util::future::ready(Ok(params["text"].as_str().unwrap_or("").to_string())),
        )
    }

    #[tokio::test]
    async fn test_register_and_perform() {
        let mut registry = ActionRegistry::new();
        registry.register(echo_action());
        let action = registry.get("say").unwrap();
        let env = Environment::new(std::sync::Arc::new(SandboxWorld::new()), InterruptSignal::new());
        let out = action.perform(env, json!({ "text": "hi" })).await.unwrap();
        assert_eq!(out, "hi");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_schema_json_lists_parameters_in_order() {
        let mut registry = ActionRegistry::new();
        registry.register(echo_action());
        registry.register(echo_action());
        assert_eq!(registry.len(), 1);
        let schema: Value = serde_json::from_str(&registry.to_schema_json()).unwrap();
        assert_eq!(schema[0]["name"], "say");
        assert_eq!(schema[0]["parameters"][0]["kind"], "string");
        assert_eq!(schema[0]["parameters"][0]["required"], true);
    }

    #[test]
    fn test_validate_params() {
        let schema = vec![
            ActionParam::required("blockType", ParamKind::String, "block"),
            ActionParam::optional("count", ParamKind::Integer, "how many"),
        ];
        assert!(validate_params(&schema, &json!({ "blockType": "oak_log" })).is_ok());
        assert!(validate_params(&schema, &json!({ "blockType": "oak_log", "count": 2 })).is_ok());
        let missing = validate_params(&schema, &json!({ "count": 2 })).unwrap_err();
        assert!(missing.contains("blockType"));
        let wrong = validate_params(&schema, &json!({ "blockType": "oak_log", "count": "two" })).unwrap_err();
        assert!(wrong.contains("count"));
        assert!(validate_params(&schema, &json!([1])).is_err());
    }
}
