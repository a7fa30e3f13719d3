//! 规则求值领域模型

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashMap, HashSet};

/// 按点分路径读取 JSON 字段
///
/// 支持对象键和数组下标，如 "items.0.sku"。任一段缺失返回 None。
pub fn get_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for part in path.split('.') {
        match current {
            Value::Object(map) => {
                current = map.get(part)?;
            }
            Value::Array(arr) => {
                let index: usize = part.parse().ok()?;
                current = arr.get(index)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// 求值时所需的客户快照
#[derive(Debug, Clone, Default)]
pub struct CustomerSnapshot {
    pub brand: String,
    pub profile_id: String,
    pub gender: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub status: String,
    pub loyalty_status: Option<String>,
    pub lifetime_points: i64,
    pub status_points: i64,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl CustomerSnapshot {
    /// `customer_cmp` 的字段读取，未知字段返回 None
    pub fn field(&self, name: &str) -> Option<Value> {
        let value = match name {
            "brand" => json!(self.brand),
            "profile_id" => json!(self.profile_id),
            "gender" => json!(self.gender.as_ref()?),
            "birthdate" => json!(self.birthdate?.to_string()),
            "status" => json!(self.status),
            "loyalty_status" => json!(self.loyalty_status.as_ref()?),
            "lifetime_points" => json!(self.lifetime_points),
            "status_points" => json!(self.status_points),
            "last_activity_at" => json!(self.last_activity_at?.to_rfc3339()),
            "created_at" => json!(self.created_at?.to_rfc3339()),
            _ => return None,
        };
        Some(value)
    }
}

/// 评估上下文
///
/// `now` 由调用方注入，保证同一次求值中所有时间相关条件看到同一时刻。
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub payload: Value,
    pub customer: CustomerSnapshot,
    pub now: DateTime<Utc>,
}

impl EvaluationContext {
    pub fn new(payload: Value, customer: CustomerSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            payload,
            customer,
            now,
        }
    }

    pub fn payload_field(&self, path: &str) -> Option<&Value> {
        get_path(&self.payload, path)
    }
}

/// 条件树对数据库事实的依赖声明
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactRequirements {
    /// 是否存在历史 EARN 流水（first_purchase）
    pub prior_earn: bool,
    /// 本年度 EARN 流水的积分值（birthday / earn_points_awarded_this_year）
    pub earn_this_year: bool,
    /// 需要检查奖励台账的 bonusKey
    pub bonus_keys: BTreeSet<String>,
}

impl FactRequirements {
    pub fn merge(&mut self, other: FactRequirements) {
        self.prior_earn |= other.prior_earn;
        self.earn_this_year |= other.earn_this_year;
        self.bonus_keys.extend(other.bonus_keys);
    }

    pub fn is_empty(&self) -> bool {
        !self.prior_earn && !self.earn_this_year && self.bonus_keys.is_empty()
    }
}

/// 预取的数据库事实
#[derive(Debug, Clone, Default)]
pub struct Facts {
    pub has_prior_earn: bool,
    /// 本年度已发放 EARN 流水的不同积分值
    pub earn_points_this_year: HashSet<i64>,
    /// bonusKey -> 当前周期是否已发放；定义不存在时不放入
    pub bonus_awarded: HashMap<String, bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_path_nested_and_index() {
        let data = json!({"order": {"items": [{"sku": "A1"}, {"sku": "B2"}]}});
        assert_eq!(get_path(&data, "order.items.1.sku"), Some(&json!("B2")));
        assert_eq!(get_path(&data, "order.items.5.sku"), None);
        assert_eq!(get_path(&data, "order.total"), None);
    }

    #[test]
    fn test_customer_field_lookup() {
        let customer = CustomerSnapshot {
            status: "ACTIVE".into(),
            lifetime_points: 1200,
            ..Default::default()
        };
        assert_eq!(customer.field("status"), Some(json!("ACTIVE")));
        assert_eq!(customer.field("lifetime_points"), Some(json!(1200)));
        assert_eq!(customer.field("gender"), None);
        assert_eq!(customer.field("password"), None);
    }

    #[test]
    fn test_requirements_merge() {
        let mut a = FactRequirements {
            prior_earn: true,
            ..Default::default()
        };
        let mut b = FactRequirements::default();
        b.bonus_keys.insert("WELCOME".into());
        a.merge(b);
        assert!(a.prior_earn);
        assert!(a.bonus_keys.contains("WELCOME"));
        assert!(!a.is_empty());
    }
}
