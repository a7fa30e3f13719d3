//! 奖励定义与发放记录

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 发放策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AwardPolicy {
    OnceEver,
    OncePerYear,
    OncePerMonth,
    OncePerWeek,
    OncePerDay,
}

impl AwardPolicy {
    /// 忽略首尾空白与大小写
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ONCE_EVER" => Some(Self::OnceEver),
            "ONCE_PER_YEAR" => Some(Self::OncePerYear),
            "ONCE_PER_MONTH" => Some(Self::OncePerMonth),
            "ONCE_PER_WEEK" => Some(Self::OncePerWeek),
            "ONCE_PER_DAY" => Some(Self::OncePerDay),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnceEver => "ONCE_EVER",
            Self::OncePerYear => "ONCE_PER_YEAR",
            Self::OncePerMonth => "ONCE_PER_MONTH",
            Self::OncePerWeek => "ONCE_PER_WEEK",
            Self::OncePerDay => "ONCE_PER_DAY",
        }
    }

    /// 周期键；ONCE_EVER 为 None
    ///
    /// 周使用 ISO 周年与周序号，如 2025-01-01 属于 "2025-W01"，2024-12-30 也属于 "2025-W01"
    pub fn period_key(&self, now: DateTime<Utc>) -> Option<String> {
        match self {
            Self::OnceEver => None,
            Self::OncePerYear => Some(format!("{:04}", now.year())),
            Self::OncePerMonth => Some(format!("{:04}-{:02}", now.year(), now.month())),
            Self::OncePerWeek => {
                let week = now.iso_week();
                Some(format!("{:04}-W{:02}", week.year(), week.week()))
            }
            Self::OncePerDay => Some(now.format("%Y-%m-%d").to_string()),
        }
    }
}

/// 奖励定义
///
/// bonus_key 全局唯一；brand 为空表示所有品牌通用
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BonusDefinition {
    pub id: Uuid,
    pub bonus_key: String,
    pub brand: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub award_policy: String,
    pub policy_params: Option<Value>,
    pub active: bool,
}

impl BonusDefinition {
    /// 定义是否适用于该品牌
    pub fn applies_to(&self, brand: &str) -> bool {
        self.brand.as_deref().is_none_or(|b| b == brand)
    }
}

/// 一次奖励发放
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BonusAward {
    pub id: Uuid,
    pub bonus_key: String,
    pub brand: String,
    pub profile_id: String,
    pub period_key: Option<String>,
    pub event_id: Option<String>,
    pub transaction_id: Option<Uuid>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}
