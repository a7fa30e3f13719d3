//! 事件类型目录仓储

use sqlx::{PgConnection, PgPool, Row};

use crate::error::Result;
use crate::models::EventOrigin;

/// 事件类型目录仓储
pub struct EventTypeRepository {
    pool: PgPool,
}

impl EventTypeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 事件类型在品牌下是否以指定来源启用
    pub async fn is_active_in_tx(
        conn: &mut PgConnection,
        brand: &str,
        key: &str,
        origin: EventOrigin,
    ) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM event_types
                WHERE brand = $1 AND key = $2 AND origin = $3 AND active = TRUE
            ) AS found
            "#,
        )
        .bind(brand)
        .bind(key)
        .bind(origin)
        .fetch_one(conn)
        .await?;

        Ok(row.get("found"))
    }

    pub async fn is_active(&self, brand: &str, key: &str, origin: EventOrigin) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Self::is_active_in_tx(&mut conn, brand, key, origin).await
    }
}
