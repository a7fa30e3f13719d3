//! 积分流水仓储
//!
//! 余额在查询时按过期日过滤，不依赖后台清理任务

use chrono::{NaiveDate, TimeZone, Utc};
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::MovementType;

/// 积分流水仓储
pub struct PointMovementRepository {
    pool: PgPool,
}

impl PointMovementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在事务中追加一条流水，返回流水 ID
    pub async fn insert_in_tx(
        conn: &mut PgConnection,
        customer_id: Uuid,
        points: i64,
        movement_type: MovementType,
        source_transaction_id: Option<Uuid>,
        expires_at: Option<NaiveDate>,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO point_movements (customer_id, points, type, source_transaction_id, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(customer_id)
        .bind(points)
        .bind(movement_type)
        .bind(source_transaction_id)
        .bind(expires_at)
        .fetch_one(conn)
        .await?;

        Ok(row.get("id"))
    }

    /// 可用余额：未过期（过期日为空或不早于 today）流水之和
    pub async fn balance_in_tx(conn: &mut PgConnection, customer_id: Uuid, today: NaiveDate) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(points), 0)::BIGINT AS balance
            FROM point_movements
            WHERE customer_id = $1
              AND (expires_at IS NULL OR expires_at >= $2)
            "#,
        )
        .bind(customer_id)
        .bind(today)
        .fetch_one(conn)
        .await?;

        Ok(row.get("balance"))
    }

    pub async fn balance(&self, customer_id: Uuid, today: NaiveDate) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::balance_in_tx(&mut conn, customer_id, today).await
    }

    /// 是否存在任何 EARN 流水
    pub async fn has_earn_in_tx(conn: &mut PgConnection, customer_id: Uuid) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM point_movements WHERE customer_id = $1 AND type = $2
            ) AS found
            "#,
        )
        .bind(customer_id)
        .bind(MovementType::Earn)
        .fetch_one(conn)
        .await?;

        Ok(row.get("found"))
    }

    /// 指定 UTC 年度内 EARN 流水的不同积分值
    pub async fn earn_points_in_year_in_tx(
        conn: &mut PgConnection,
        customer_id: Uuid,
        year: i32,
    ) -> Result<Vec<i64>> {
        let start = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single();
        let end = Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).single();
        let (Some(start), Some(end)) = (start, end) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT DISTINCT points
            FROM point_movements
            WHERE customer_id = $1 AND type = $2
              AND created_at >= $3 AND created_at < $4
            "#,
        )
        .bind(customer_id)
        .bind(MovementType::Earn)
        .bind(start)
        .bind(end)
        .fetch_all(conn)
        .await?;

        Ok(rows.iter().map(|r| r.get("points")).collect())
    }
}

/// EARN 流水的过期日：获得当日起 365 天
pub fn earn_expiry(today: NaiveDate) -> NaiveDate {
    today + chrono::Duration::days(365)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earn_expiry_is_365_days() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(earn_expiry(today), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        let today = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        assert_eq!(earn_expiry(today), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }
}
