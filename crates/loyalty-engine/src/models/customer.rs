//! 客户实体

use chrono::{DateTime, NaiveDate, Utc};
use rule_engine::CustomerSnapshot;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 等级目录为空时客户的 loyalty_status
pub const UNCONFIGURED_TIER: &str = "UNCONFIGURED";

/// 品牌下的会员
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    pub brand: String,
    pub profile_id: String,
    pub gender: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub status: String,
    /// 当前等级 key，或 UNCONFIGURED
    pub loyalty_status: Option<String>,
    pub lifetime_points: i64,
    /// 决定等级的积分，与可用余额、累计积分分开统计
    pub status_points: i64,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub status_points_reset_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// 转为条件求值使用的快照
    pub fn snapshot(&self) -> CustomerSnapshot {
        CustomerSnapshot {
            brand: self.brand.clone(),
            profile_id: self.profile_id.clone(),
            gender: self.gender.clone(),
            birthdate: self.birthdate,
            status: self.status.clone(),
            loyalty_status: self.loyalty_status.clone(),
            lifetime_points: self.lifetime_points,
            status_points: self.status_points,
            last_activity_at: self.last_activity_at,
            created_at: Some(self.created_at),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_customer() -> Customer {
    let now = Utc::now();
    Customer {
        id: Uuid::new_v4(),
        brand: "acme".into(),
        profile_id: "p1".into(),
        gender: None,
        birthdate: None,
        status: "ACTIVE".into(),
        loyalty_status: None,
        lifetime_points: 0,
        status_points: 0,
        last_activity_at: None,
        status_points_reset_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_copies_points_and_status() {
        let mut customer = sample_customer();
        customer.status_points = 150;
        customer.loyalty_status = Some("SILVER".into());

        let snapshot = customer.snapshot();
        assert_eq!(snapshot.status_points, 150);
        assert_eq!(snapshot.loyalty_status.as_deref(), Some("SILVER"));
        assert_eq!(snapshot.created_at, Some(customer.created_at));
    }
}
