//! 规则引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("未知的条件类型: {0}")]
    UnknownCondition(String),

    #[error("条件格式无效: {0}")]
    InvalidCondition(String),

    #[error("未知的动作类型: {0}")]
    UnknownAction(String),

    #[error("动作定义无效: {0}")]
    InvalidAction(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;
