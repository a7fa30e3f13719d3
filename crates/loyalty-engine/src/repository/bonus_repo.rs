//! 奖励台账仓储
//!
//! (bonus_key, brand, profile_id, period_key) 上的唯一索引是"已发放"判断的唯一依据

use serde_json::Value;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::BonusDefinition;

/// 奖励台账仓储
pub struct BonusRepository;

impl BonusRepository {
    /// 查询启用的奖励定义：品牌专属优先，其次通用定义
    ///
    /// 返回的定义可能属于其他品牌，由调用方校验适用范围
    pub async fn find_definition_in_tx(
        conn: &mut PgConnection,
        bonus_key: &str,
        brand: &str,
    ) -> Result<Option<BonusDefinition>> {
        let definition = sqlx::query_as::<_, BonusDefinition>(
            r#"
            SELECT id, bonus_key, brand, name, description, award_policy, policy_params, active
            FROM bonus_definitions
            WHERE bonus_key = $1 AND active = TRUE
            ORDER BY CASE WHEN brand = $2 THEN 0 WHEN brand IS NULL THEN 1 ELSE 2 END
            LIMIT 1
            "#,
        )
        .bind(bonus_key)
        .bind(brand)
        .fetch_optional(conn)
        .await?;

        Ok(definition)
    }

    /// 当前周期是否已发放
    pub async fn award_exists_in_tx(
        conn: &mut PgConnection,
        bonus_key: &str,
        brand: &str,
        profile_id: &str,
        period_key: Option<&str>,
    ) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM bonus_awards
                WHERE bonus_key = $1 AND brand = $2 AND profile_id = $3
                  AND COALESCE(period_key, '') = COALESCE($4, '')
            ) AS found
            "#,
        )
        .bind(bonus_key)
        .bind(brand)
        .bind(profile_id)
        .bind(period_key)
        .fetch_one(conn)
        .await?;

        Ok(row.get("found"))
    }

    /// 不存在时插入发放记录，返回是否新插入
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_award_if_absent_in_tx(
        conn: &mut PgConnection,
        bonus_key: &str,
        brand: &str,
        profile_id: &str,
        period_key: Option<&str>,
        event_id: Option<&str>,
        transaction_id: Option<Uuid>,
        metadata: &Value,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO bonus_awards (id, bonus_key, brand, profile_id, period_key, event_id, transaction_id, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(bonus_key)
        .bind(brand)
        .bind(profile_id)
        .bind(period_key)
        .bind(event_id)
        .bind(transaction_id)
        .bind(metadata)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
