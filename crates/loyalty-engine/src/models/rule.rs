//! 规则实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 品牌 + 事件类型下的条件 → 动作映射
///
/// 按 (priority, id) 升序执行
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: i64,
    pub brand: String,
    pub event_type: String,
    pub name: String,
    pub priority: i32,
    pub conditions: Option<Value>,
    pub actions: Option<Value>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
