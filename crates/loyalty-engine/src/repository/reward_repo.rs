//! 奖励仓储

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CustomerReward, CustomerRewardStatus, Reward};

/// 奖励仓储
pub struct RewardRepository;

impl RewardRepository {
    /// 客户品牌下启用的奖励
    pub async fn find_active_in_tx(conn: &mut PgConnection, id: Uuid, brand: &str) -> Result<Option<Reward>> {
        let reward = sqlx::query_as::<_, Reward>(
            r#"
            SELECT id, brand, name, description, cost_points, type, validity_days, active, created_at
            FROM rewards
            WHERE id = $1 AND brand = $2 AND active = TRUE
            "#,
        )
        .bind(id)
        .bind(brand)
        .fetch_optional(conn)
        .await?;

        Ok(reward)
    }

    /// 发放客户奖励（状态 ISSUED）
    pub async fn issue_in_tx(
        conn: &mut PgConnection,
        customer_id: Uuid,
        reward: &Reward,
        source_transaction_id: Uuid,
        issued_at: DateTime<Utc>,
    ) -> Result<CustomerReward> {
        let issued = sqlx::query_as::<_, CustomerReward>(
            r#"
            INSERT INTO customer_rewards (id, customer_id, reward_id, status, issued_at, expires_at, source_transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, customer_id, reward_id, status, issued_at, expires_at, used_at, source_transaction_id
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(customer_id)
        .bind(reward.id)
        .bind(CustomerRewardStatus::Issued)
        .bind(issued_at)
        .bind(reward.expires_at(issued_at))
        .bind(source_transaction_id)
        .fetch_one(conn)
        .await?;

        Ok(issued)
    }
}
