//! 动作层：动作契约、注册表、参数校验与沙箱动作

pub mod registry;
pub mod sandbox;

pub use registry::{validate_params, Action, ActionParam, ActionRegistry, FnAction, ParamKind};
pub use sandbox::register_sandbox_actions;
