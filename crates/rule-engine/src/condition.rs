//! 条件 DSL 解析
//!
//! 条件以 JSON 树存储，节点为以下之一：
//! - `{"all": [...]}` / `{"any": [...]}` / `{"not": {...}}` 组合节点
//! - 一个或多个叶子键组成的对象，多个键之间为 AND
//! - 数组，等价于 `all`
//!
//! 解析结果为封闭的 [`ConditionNode`]。未知键返回 [`RuleError::UnknownCondition`]，
//! 规则在执行任何动作之前即失败；叶子参数格式错误则解析为
//! [`Condition::Malformed`]，求值恒为 false。

use serde_json::Value;

use crate::error::{Result, RuleError};
use crate::models::FactRequirements;
use crate::operators::CompareOp;

/// 条件树节点
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    All(Vec<ConditionNode>),
    Any(Vec<ConditionNode>),
    Not(Box<ConditionNode>),
    Leaf(Condition),
}

/// 叶子条件
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// payload 路径等值匹配
    PayloadEquals(Vec<(String, Value)>),
    /// payload 路径存在且非空
    PayloadPresent(Vec<String>),
    /// payload 路径取值属于列表
    PayloadIn(Vec<(String, Vec<Value>)>),
    /// payload 字符串包含子串，或数组包含元素
    PayloadContains(Vec<(String, Value)>),
    PayloadCompare {
        path: String,
        op: CompareOp,
        value: Value,
    },
    AmountGte(i64),
    PointsGte(i64),
    CustomerStatusIn(Vec<String>),
    CustomerLoyaltyStatusIn(Vec<String>),
    CustomerLifetimePointsGte(i64),
    CustomerCreatedDaysGte(i64),
    CustomerLastActivityDaysGte(i64),
    CustomerCompare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    /// UTC 星期，周一为 0
    WeekdayIn(Vec<u32>),
    FirstPurchase,
    Birthday {
        bonus_points: Option<i64>,
    },
    EarnPointsAwardedThisYear(i64),
    BonusAwarded(String),
    /// 参数不合法的叶子，求值恒为 false
    Malformed(String),
}

const LEAF_KEYS: &[&str] = &[
    "payload",
    "payload_present",
    "payload_in",
    "payload_contains",
    "payload_cmp",
    "amount_gte",
    "points_gte",
    "customer_status_in",
    "customer_loyalty_status_in",
    "customer_lifetime_points_gte",
    "customer_created_days_gte",
    "customer_last_activity_days_gte",
    "customer_cmp",
    "weekday_in",
    "first_purchase",
    "birthday",
    "birthday_bonus_points",
    "earn_points_awarded_this_year",
    "bonus_awarded",
];

impl ConditionNode {
    /// 恒为真的空条件
    pub fn always() -> Self {
        Self::All(Vec::new())
    }

    /// 从规则存储的 JSON 解析条件树
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Null | Value::Bool(false) => Ok(Self::always()),
            Value::Array(items) => items
                .iter()
                .map(Self::parse)
                .collect::<Result<Vec<_>>>()
                .map(Self::All),
            Value::Object(map) if map.is_empty() => Ok(Self::always()),
            Value::Object(map) => {
                // 组合键优先级：all > any > not，与其他键并存时其他键被忽略
                if let Some(items) = map.get("all") {
                    return Self::parse_list(items).map(Self::All);
                }
                if let Some(items) = map.get("any") {
                    return Self::parse_list(items).map(Self::Any);
                }
                if let Some(inner) = map.get("not") {
                    return Ok(Self::Not(Box::new(Self::parse(inner)?)));
                }
                Self::parse_leaves(map)
            }
            other => Ok(Self::Leaf(Condition::Malformed(format!(
                "条件节点必须为对象或数组: {}",
                other
            )))),
        }
    }

    fn parse_list(items: &Value) -> Result<Vec<Self>> {
        match items {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items.iter().map(Self::parse).collect(),
            _ => Ok(vec![Self::Leaf(Condition::Malformed(
                "组合节点的子项必须为数组".to_string(),
            ))]),
        }
    }

    fn parse_leaves(map: &serde_json::Map<String, Value>) -> Result<Self> {
        if let Some(unknown) = map.keys().find(|k| !LEAF_KEYS.contains(&k.as_str())) {
            return Err(RuleError::UnknownCondition(unknown.clone()));
        }

        let mut leaves = Vec::new();
        for (key, value) in map {
            if let Some(leaf) = parse_leaf(key, value, map) {
                leaves.push(Self::Leaf(leaf));
            }
        }

        if leaves.len() == 1 {
            Ok(leaves.remove(0))
        } else {
            Ok(Self::All(leaves))
        }
    }

    /// 收集条件树需要预取的数据库事实
    pub fn requirements(&self) -> FactRequirements {
        let mut req = FactRequirements::default();
        self.collect_requirements(&mut req);
        req
    }

    fn collect_requirements(&self, req: &mut FactRequirements) {
        match self {
            Self::All(children) | Self::Any(children) => {
                for child in children {
                    child.collect_requirements(req);
                }
            }
            Self::Not(inner) => inner.collect_requirements(req),
            Self::Leaf(Condition::FirstPurchase) => req.prior_earn = true,
            Self::Leaf(Condition::Birthday { .. })
            | Self::Leaf(Condition::EarnPointsAwardedThisYear(_)) => req.earn_this_year = true,
            Self::Leaf(Condition::BonusAwarded(key)) => {
                req.bonus_keys.insert(key.clone());
            }
            Self::Leaf(_) => {}
        }
    }
}

/// 解析单个叶子键；返回 None 表示该键不构成约束（值为空或为假）
fn parse_leaf(key: &str, value: &Value, siblings: &serde_json::Map<String, Value>) -> Option<Condition> {
    if value.is_null() {
        return None;
    }

    let malformed = || Condition::Malformed(format!("{}: 参数格式无效", key));

    let leaf = match key {
        "payload" => match value.as_object() {
            Some(m) if m.is_empty() => return None,
            Some(m) => Condition::PayloadEquals(m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            None => malformed(),
        },
        "payload_present" => match value.as_array() {
            Some(items) if items.is_empty() => return None,
            Some(items) => match strings(items) {
                Some(paths) => Condition::PayloadPresent(paths),
                None => malformed(),
            },
            None if value == &Value::Bool(false) => return None,
            None => malformed(),
        },
        "payload_in" => match value.as_object() {
            Some(m) => {
                let mut entries = Vec::with_capacity(m.len());
                for (path, allowed) in m {
                    match allowed.as_array() {
                        Some(list) if !list.is_empty() => entries.push((path.clone(), list.clone())),
                        _ => return Some(malformed()),
                    }
                }
                Condition::PayloadIn(entries)
            }
            None => malformed(),
        },
        "payload_contains" => match value.as_object() {
            Some(m) => Condition::PayloadContains(m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            None => malformed(),
        },
        "payload_cmp" => parse_compare(value, "path")
            .map(|(path, op, value)| Condition::PayloadCompare { path, op, value })
            .unwrap_or_else(malformed),
        "customer_cmp" => parse_compare(value, "field")
            .map(|(field, op, value)| Condition::CustomerCompare { field, op, value })
            .unwrap_or_else(malformed),
        "amount_gte" => int_param(value).map(Condition::AmountGte).unwrap_or_else(malformed),
        "points_gte" => int_param(value).map(Condition::PointsGte).unwrap_or_else(malformed),
        "customer_lifetime_points_gte" => int_param(value)
            .map(Condition::CustomerLifetimePointsGte)
            .unwrap_or_else(malformed),
        "customer_created_days_gte" => int_param(value)
            .map(Condition::CustomerCreatedDaysGte)
            .unwrap_or_else(malformed),
        "customer_last_activity_days_gte" => int_param(value)
            .map(Condition::CustomerLastActivityDaysGte)
            .unwrap_or_else(malformed),
        "customer_status_in" => value
            .as_array()
            .and_then(|items| strings(items))
            .map(Condition::CustomerStatusIn)
            .unwrap_or_else(malformed),
        "customer_loyalty_status_in" => value
            .as_array()
            .and_then(|items| strings(items))
            .map(Condition::CustomerLoyaltyStatusIn)
            .unwrap_or_else(malformed),
        "weekday_in" => value
            .as_array()
            .and_then(|items| {
                items
                    .iter()
                    .map(|v| int_param(v).and_then(|d| u32::try_from(d).ok()))
                    .collect::<Option<Vec<_>>>()
            })
            .map(Condition::WeekdayIn)
            .unwrap_or_else(malformed),
        "first_purchase" => {
            if !truthy(value) {
                return None;
            }
            Condition::FirstPurchase
        }
        "birthday" => {
            if !truthy(value) {
                return None;
            }
            match siblings.get("birthday_bonus_points") {
                None | Some(Value::Null) => Condition::Birthday { bonus_points: None },
                Some(v) => match int_param(v) {
                    Some(points) => Condition::Birthday {
                        bonus_points: Some(points),
                    },
                    None => malformed(),
                },
            }
        }
        // 仅作为 birthday 的参数
        "birthday_bonus_points" => return None,
        "earn_points_awarded_this_year" => {
            let points = match value {
                Value::Object(m) => m.get("points").and_then(int_param),
                other => int_param(other),
            };
            points
                .map(Condition::EarnPointsAwardedThisYear)
                .unwrap_or_else(malformed)
        }
        "bonus_awarded" => {
            let bonus_key = match value {
                Value::String(s) => Some(s.clone()),
                Value::Object(m) => m
                    .get("bonusKey")
                    .or_else(|| m.get("bonus_key"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            };
            match bonus_key {
                Some(k) if !k.trim().is_empty() => Condition::BonusAwarded(k),
                _ => malformed(),
            }
        }
        _ => malformed(),
    };

    Some(leaf)
}

fn parse_compare(value: &Value, key_field: &str) -> Option<(String, CompareOp, Value)> {
    let m = value.as_object()?;
    let key = m.get(key_field)?.as_str().filter(|s| !s.is_empty())?;
    let op = CompareOp::parse(m.get("op")?.as_str()?)?;
    let expected = m.get("value").cloned().unwrap_or(Value::Null);
    Some((key.to_string(), op, expected))
}

/// 整数参数：接受整数、可整除的浮点数与数字字符串
pub(crate) fn int_param(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn strings(items: &[Value]) -> Option<Vec<String>> {
    items
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
