//! 客户标签仓储

use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::Result;

/// 客户标签仓储
pub struct TagRepository;

impl TagRepository {
    /// 添加标签，返回是否新增（已存在时为 false）
    pub async fn add_in_tx(conn: &mut PgConnection, customer_id: Uuid, tag: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO customer_tags (id, customer_id, tag)
            VALUES ($1, $2, $3)
            ON CONFLICT (customer_id, tag) DO NOTHING
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(customer_id)
        .bind(tag)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
