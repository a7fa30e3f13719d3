//! 积分引擎错误类型
//!
//! 按处理方式分为五类：参数校验、业务规则失败、引擎失败、调度失败、调度表达式错误。
//! 业务规则失败只影响当前规则（记录为 FAILED 执行行），引擎失败会使整笔交易 FAILED。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rule_engine::RuleError;
use serde_json::json;
use thiserror::Error;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    BusinessRule,
    Engine,
    Scheduler,
    Schedule,
}

/// 积分引擎错误
#[derive(Debug, Error)]
pub enum EngineError {
    // === 参数校验 ===
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("客户资料事件不能通过事件接口提交: {0}")]
    ProfileEventRejected(String),

    #[error("规则定义无效: {0}")]
    Rule(#[from] RuleError),

    #[error("动作参数无效: {0}")]
    InvalidActionParams(String),

    // === 业务规则 ===
    #[error("积分不足: 需要 {required}, 可用 {available}")]
    InsufficientPoints { required: i64, available: i64 },

    #[error("奖励不存在或未启用: {0}")]
    RewardNotFound(String),

    #[error("未知的奖励键: {0}")]
    UnknownBonusKey(String),

    #[error("奖励 {bonus_key} 不适用于品牌 {brand}")]
    BonusBrandMismatch { bonus_key: String, brand: String },

    #[error("不支持的发放策略: {0}")]
    UnsupportedAwardPolicy(String),

    #[error("等级不存在: {0}")]
    TierNotFound(String),

    // === 引擎 ===
    #[error("客户不存在: brand={brand}, profile_id={profile_id}")]
    CustomerNotFound { brand: String, profile_id: String },

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),

    // === 调度 ===
    #[error("任务不存在: {0}")]
    JobNotFound(String),

    #[error("任务未启用: {0}")]
    JobInactive(String),

    #[error("选择器无效: {0}")]
    InvalidSelector(String),

    #[error("事件类型 {0} 不是当前品牌启用的内部事件类型")]
    EventTypeNotInternal(String),

    #[error("请求品牌 {payload} 与调用方品牌 {caller} 不一致")]
    BrandMismatch { payload: String, caller: String },

    #[error("调度配置无效: {0}")]
    InvalidSchedule(String),
}

/// 积分引擎 Result 类型别名
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// 错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_)
            | Self::ProfileEventRejected(_)
            | Self::Rule(_)
            | Self::InvalidActionParams(_)
            | Self::BrandMismatch { .. }
            | Self::EventTypeNotInternal(_)
            | Self::InvalidSelector(_) => ErrorKind::Validation,

            Self::InsufficientPoints { .. }
            | Self::RewardNotFound(_)
            | Self::UnknownBonusKey(_)
            | Self::BonusBrandMismatch { .. }
            | Self::UnsupportedAwardPolicy(_)
            | Self::TierNotFound(_) => ErrorKind::BusinessRule,

            Self::CustomerNotFound { .. }
            | Self::Database(_)
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorKind::Engine,

            Self::JobNotFound(_) | Self::JobInactive(_) => ErrorKind::Scheduler,

            Self::InvalidSchedule(_) => ErrorKind::Schedule,
        }
    }

    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_) | Self::Serialization(_) | Self::Internal(_)
        )
    }

    /// 获取错误码（用于 API 响应与交易诊断）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ProfileEventRejected(_) => "PROFILE_EVENT_REJECTED",
            Self::Rule(RuleError::UnknownAction(_)) => "UNKNOWN_ACTION",
            Self::Rule(RuleError::UnknownCondition(_)) => "UNKNOWN_CONDITION",
            Self::Rule(_) => "INVALID_RULE",
            Self::InvalidActionParams(_) => "INVALID_ACTION_PARAMS",
            Self::InsufficientPoints { .. } => "INSUFFICIENT_POINTS",
            Self::RewardNotFound(_) => "REWARD_NOT_FOUND",
            Self::UnknownBonusKey(_) => "UNKNOWN_BONUS_KEY",
            Self::BonusBrandMismatch { .. } => "BONUS_BRAND_MISMATCH",
            Self::UnsupportedAwardPolicy(_) => "UNSUPPORTED_AWARD_POLICY",
            Self::TierNotFound(_) => "TIER_NOT_FOUND",
            Self::CustomerNotFound { .. } => "CUSTOMER_NOT_FOUND",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::JobNotFound(_) => "JOB_NOT_FOUND",
            Self::JobInactive(_) => "JOB_INACTIVE",
            Self::InvalidSelector(_) => "INVALID_SELECTOR",
            Self::EventTypeNotInternal(_) => "EVENT_TYPE_NOT_INTERNAL",
            Self::BrandMismatch { .. } => "BRAND_MISMATCH",
            Self::InvalidSchedule(_) => "INVALID_SCHEDULE",
        }
    }

    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::JobNotFound(_) | Self::CustomerNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Serialization(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ if self.kind() == ErrorKind::BusinessRule => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Serialization(e) => {
                tracing::error!(error = %e, "序列化失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            EngineError::Validation("brand".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            EngineError::InsufficientPoints {
                required: 100,
                available: 10
            }
            .kind(),
            ErrorKind::BusinessRule
        );
        assert_eq!(
            EngineError::CustomerNotFound {
                brand: "acme".into(),
                profile_id: "p1".into()
            }
            .kind(),
            ErrorKind::Engine
        );
        assert_eq!(
            EngineError::JobInactive("j".into()).kind(),
            ErrorKind::Scheduler
        );
        assert_eq!(
            EngineError::InvalidSchedule("bad".into()).kind(),
            ErrorKind::Schedule
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            EngineError::Rule(RuleError::UnknownAction("send_email".into())).error_code(),
            "UNKNOWN_ACTION"
        );
        assert_eq!(
            EngineError::UnknownBonusKey("WELCOME".into()).error_code(),
            "UNKNOWN_BONUS_KEY"
        );
        assert_eq!(
            EngineError::Database(sqlx::Error::RowNotFound).error_code(),
            "DATABASE_ERROR"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            EngineError::ProfileEventRejected("CUSTOMER_PROFILE".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EngineError::JobNotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            EngineError::RewardNotFound("r".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            EngineError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_business_and_retryable() {
        assert!(EngineError::TierNotFound("GOLD".into()).is_business_error());
        assert!(!EngineError::Internal("x".into()).is_business_error());
        assert!(EngineError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!EngineError::Validation("x".into()).is_retryable());
    }
}
