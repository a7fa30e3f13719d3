//! 规则仓储

use sqlx::PgConnection;

use crate::error::Result;
use crate::models::Rule;

/// 规则仓储
pub struct RuleRepository;

impl RuleRepository {
    /// 品牌 + 事件类型下启用的规则，按 (priority, id) 升序
    pub async fn list_active_in_tx(
        conn: &mut PgConnection,
        brand: &str,
        event_type: &str,
    ) -> Result<Vec<Rule>> {
        let rules = sqlx::query_as::<_, Rule>(
            r#"
            SELECT id, brand, event_type, name, priority, conditions, actions, active, created_at, updated_at
            FROM rules
            WHERE brand = $1 AND event_type = $2 AND active = TRUE
            ORDER BY priority ASC, id ASC
            "#,
        )
        .bind(brand)
        .bind(event_type)
        .fetch_all(conn)
        .await?;

        Ok(rules)
    }
}
