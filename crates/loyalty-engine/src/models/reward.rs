//! 奖励目录与客户奖励

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::CustomerRewardStatus;

/// 可兑换/可发放的奖励
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: Uuid,
    pub brand: String,
    pub name: String,
    pub description: Option<String>,
    /// 为空或 0 表示免费
    pub cost_points: Option<i64>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub reward_type: String,
    pub validity_days: Option<i32>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Reward {
    /// 兑换需要扣减的积分，免费奖励为 0
    pub fn cost(&self) -> i64 {
        self.cost_points.unwrap_or(0).max(0)
    }

    /// 按有效天数计算过期时间
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.validity_days
            .map(|days| issued_at + Duration::days(i64::from(days)))
    }
}

/// 客户持有的奖励
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CustomerReward {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub reward_id: Uuid,
    pub status: CustomerRewardStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub used_at: Option<DateTime<Utc>>,
    pub source_transaction_id: Option<Uuid>,
}
