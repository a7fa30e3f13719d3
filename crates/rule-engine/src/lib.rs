//! 积分规则引擎
//!
//! 规则由条件树与动作列表组成，均以 JSON 存储。本 crate 负责：
//! - 将条件 JSON 解析为封闭的条件类型（未知条件在解析阶段拒绝）
//! - 将动作 JSON 解析为固定目录中的动作（未知动作在解析阶段拒绝）
//! - 基于上下文与预取事实的纯函数式条件求值
//!
//! 需要访问数据库的条件（首购、年度发放、奖励台账）先通过
//! [`ConditionNode::requirements`] 声明依赖，由调用方预取为 [`Facts`]。

pub mod action;
pub mod condition;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod operators;

pub use action::{ActionSpec, RewardRef, parse_actions};
pub use condition::{Condition, ConditionNode};
pub use error::{Result, RuleError};
pub use evaluator::ConditionEvaluator;
pub use models::{CustomerSnapshot, EvaluationContext, FactRequirements, Facts, get_path};
pub use operators::CompareOp;
