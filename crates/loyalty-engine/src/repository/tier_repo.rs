//! 等级目录仓储

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{LoyaltyTier, validate_catalog};

/// 等级目录仓储
pub struct TierRepository {
    pool: PgPool,
}

impl TierRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 品牌下启用的等级，按 rank 升序
    pub async fn list_active_in_tx(conn: &mut PgConnection, brand: &str) -> Result<Vec<LoyaltyTier>> {
        let tiers = sqlx::query_as::<_, LoyaltyTier>(
            r#"
            SELECT id, brand, key, name, min_status_points, rank, active, created_at, updated_at
            FROM loyalty_tiers
            WHERE brand = $1 AND active = TRUE
            ORDER BY rank ASC
            "#,
        )
        .bind(brand)
        .fetch_all(conn)
        .await?;

        Ok(tiers)
    }

    pub async fn list(&self, brand: &str) -> Result<Vec<LoyaltyTier>> {
        let tiers = sqlx::query_as::<_, LoyaltyTier>(
            r#"
            SELECT id, brand, key, name, min_status_points, rank, active, created_at, updated_at
            FROM loyalty_tiers
            WHERE brand = $1
            ORDER BY rank ASC
            "#,
        )
        .bind(brand)
        .fetch_all(&self.pool)
        .await?;

        Ok(tiers)
    }

    /// 新增等级
    ///
    /// 连同已有等级一起校验：rank 0 ⇔ 门槛 0，门槛随 rank 严格递增
    pub async fn create(
        &self,
        brand: &str,
        key: &str,
        name: &str,
        min_status_points: i64,
        rank: i32,
    ) -> Result<LoyaltyTier> {
        let mut catalog = self.list(brand).await?;
        let now = chrono::Utc::now();
        catalog.push(LoyaltyTier {
            id: Uuid::now_v7(),
            brand: brand.to_string(),
            key: key.to_string(),
            name: name.to_string(),
            min_status_points,
            rank,
            active: true,
            created_at: now,
            updated_at: now,
        });
        validate_catalog(&catalog).map_err(EngineError::Validation)?;

        let tier = sqlx::query_as::<_, LoyaltyTier>(
            r#"
            INSERT INTO loyalty_tiers (id, brand, key, name, min_status_points, rank)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, brand, key, name, min_status_points, rank, active, created_at, updated_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(brand)
        .bind(key)
        .bind(name)
        .bind(min_status_points)
        .bind(rank)
        .fetch_one(&self.pool)
        .await?;

        Ok(tier)
    }
}
