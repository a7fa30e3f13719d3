//! 积分引擎枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};
use std::fmt;

/// 交易状态
///
/// 只能向前流转：PENDING → PROCESSED / PROCESSED_WITH_ERRORS / FAILED；BLOCKED 为终态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Processed,
    ProcessedWithErrors,
    Failed,
    /// 缺少必填字段，不进入规则引擎
    Blocked,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processed => "PROCESSED",
            Self::ProcessedWithErrors => "PROCESSED_WITH_ERRORS",
            Self::Failed => "FAILED",
            Self::Blocked => "BLOCKED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条规则的执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionResult {
    Success,
    Skipped,
    Failed,
}

impl ExecutionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Skipped => "SKIPPED",
            Self::Failed => "FAILED",
        }
    }
}

/// 积分流水类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Earn,
    Burn,
}

/// 事件类型来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventOrigin {
    /// 外部系统推送
    External,
    /// 引擎内部产生（等级变化、定时任务）
    Internal,
}

/// 交易来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionSource {
    Api,
    Import,
    /// 等级变化等引擎内部事件
    System,
    /// 定时任务产生的事件
    InternalJob,
}

impl TransactionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "API",
            Self::Import => "IMPORT",
            Self::System => "SYSTEM",
            Self::InternalJob => "INTERNAL_JOB",
        }
    }
}

/// 客户奖励状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomerRewardStatus {
    #[default]
    Issued,
    Used,
    Expired,
}

/// 定时任务最近一次运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobRunStatus {
    Success,
    Failed,
}

impl JobRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

/// 等级变化原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TierChangeReason {
    EarnPoints,
    Reset,
    Inactivity,
}

impl TierChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EarnPoints => "EARN_POINTS",
            Self::Reset => "RESET",
            Self::Inactivity => "INACTIVITY",
        }
    }
}

/// 等级变化方向，对应内部事件类型 TIER_UPGRADED / TIER_DOWNGRADED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierDirection {
    Upgraded,
    Downgraded,
}

impl TierDirection {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Upgraded => "TIER_UPGRADED",
            Self::Downgraded => "TIER_DOWNGRADED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_status_serde_names() {
        let json = serde_json::to_string(&TransactionStatus::ProcessedWithErrors).unwrap();
        assert_eq!(json, "\"PROCESSED_WITH_ERRORS\"");
        assert_eq!(TransactionStatus::ProcessedWithErrors.to_string(), "PROCESSED_WITH_ERRORS");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Blocked.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_source_names() {
        let json = serde_json::to_string(&TransactionSource::InternalJob).unwrap();
        assert_eq!(json, "\"INTERNAL_JOB\"");
    }
}
