//! 客户选择器
//!
//! 定时任务用选择器树挑选目标客户。组合子 `all` / `any` 嵌套叶子谓词；
//! 同一对象中的多个键按 AND 组合，空对象不过滤。
//!
//! ```json
//! {"any": [{"birthdate_today": true}, {"all": [{"status_in": ["ACTIVE"]}, {"inactive_days_gte": 90}]}]}
//! ```

use chrono::{DateTime, Datelike, Duration, Utc};
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};

use crate::error::{EngineError, Result};

/// 解析后的选择器
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// 不过滤
    Everyone,
    All(Vec<Selector>),
    Any(Vec<Selector>),
    /// 生日（月、日）为今天
    BirthdateToday,
    /// 注册纪念日（月、日）为今天
    CreatedAnniversaryToday,
    /// 最近活跃时间早于 N 天前；从未活跃的客户不命中
    InactiveDaysGte(i64),
    StatusIn(Vec<String>),
    LoyaltyStatusIn(Vec<String>),
    LifetimePointsGte(i64),
}

impl Selector {
    pub fn parse(value: &Value) -> Result<Self> {
        let obj = match value {
            Value::Null => return Ok(Self::Everyone),
            Value::Object(obj) => obj,
            _ => return Err(invalid("选择器必须为对象")),
        };

        let mut parts = Vec::new();
        for (key, param) in obj {
            let part = match key.as_str() {
                "all" => Self::All(parse_children(key, param)?),
                "any" => Self::Any(parse_children(key, param)?),
                "birthdate_today" => match flag(key, param)? {
                    true => Self::BirthdateToday,
                    false => continue,
                },
                "created_anniversary_today" => match flag(key, param)? {
                    true => Self::CreatedAnniversaryToday,
                    false => continue,
                },
                "inactive_days_gte" => match integer(key, param)? {
                    Some(days) if Duration::try_days(days).is_none() => {
                        return Err(invalid(&format!("{} 超出范围: {}", key, days)));
                    }
                    Some(days) => Self::InactiveDaysGte(days),
                    None => continue,
                },
                "lifetime_points_gte" => match integer(key, param)? {
                    Some(points) => Self::LifetimePointsGte(points),
                    None => continue,
                },
                "status_in" => match string_list(key, param)? {
                    Some(list) => Self::StatusIn(list),
                    None => continue,
                },
                "loyalty_status_in" => match string_list(key, param)? {
                    Some(list) => Self::LoyaltyStatusIn(list),
                    None => continue,
                },
                other => return Err(invalid(&format!("未知的选择器: {}", other))),
            };
            if !part.is_empty() {
                parts.push(part);
            }
        }

        Ok(match parts.len() {
            0 => Self::Everyone,
            1 => parts.remove(0),
            _ => Self::All(parts),
        })
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Everyone => true,
            Self::All(children) | Self::Any(children) => children.iter().all(Selector::is_empty),
            _ => false,
        }
    }

    /// 追加 SQL 谓词（不含前导 AND）
    ///
    /// "今天" 取 `now` 的 UTC 日期
    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Postgres>, now: DateTime<Utc>) {
        let today = now.date_naive();
        match self {
            Self::Everyone => {
                qb.push("TRUE");
            }
            Self::All(children) => push_group(qb, children, " AND ", now),
            Self::Any(children) => push_group(qb, children, " OR ", now),
            Self::BirthdateToday => {
                qb.push("(birthdate IS NOT NULL AND EXTRACT(MONTH FROM birthdate)::int = ");
                qb.push_bind(today.month() as i32);
                qb.push(" AND EXTRACT(DAY FROM birthdate)::int = ");
                qb.push_bind(today.day() as i32);
                qb.push(")");
            }
            Self::CreatedAnniversaryToday => {
                qb.push("(EXTRACT(MONTH FROM created_at AT TIME ZONE 'UTC')::int = ");
                qb.push_bind(today.month() as i32);
                qb.push(" AND EXTRACT(DAY FROM created_at AT TIME ZONE 'UTC')::int = ");
                qb.push_bind(today.day() as i32);
                qb.push(")");
            }
            Self::InactiveDaysGte(days) => {
                let cutoff = Duration::try_days(*days).and_then(|d| now.checked_sub_signed(d));
                match cutoff {
                    Some(cutoff) => {
                        qb.push("(last_activity_at IS NOT NULL AND last_activity_at <= ");
                        qb.push_bind(cutoff);
                        qb.push(")");
                    }
                    // 截止时间早于可表示范围，没有客户能命中
                    None => {
                        qb.push("FALSE");
                    }
                }
            }
            Self::StatusIn(list) => {
                qb.push("status = ANY(");
                qb.push_bind(list.clone());
                qb.push(")");
            }
            Self::LoyaltyStatusIn(list) => {
                qb.push("loyalty_status = ANY(");
                qb.push_bind(list.clone());
                qb.push(")");
            }
            Self::LifetimePointsGte(points) => {
                qb.push("lifetime_points >= ");
                qb.push_bind(*points);
            }
        }
    }
}

fn push_group(
    qb: &mut QueryBuilder<'_, Postgres>,
    children: &[Selector],
    separator: &str,
    now: DateTime<Utc>,
) {
    let active: Vec<&Selector> = children.iter().filter(|c| !c.is_empty()).collect();
    if active.is_empty() {
        qb.push("TRUE");
        return;
    }
    qb.push("(");
    for (i, child) in active.into_iter().enumerate() {
        if i > 0 {
            qb.push(separator);
        }
        child.push_sql(qb, now);
    }
    qb.push(")");
}

fn invalid(msg: &str) -> EngineError {
    EngineError::InvalidSelector(msg.to_string())
}

fn parse_children(key: &str, param: &Value) -> Result<Vec<Selector>> {
    match param {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.iter().map(Selector::parse).collect(),
        _ => Err(invalid(&format!("{} 必须为数组", key))),
    }
}

fn flag(key: &str, param: &Value) -> Result<bool> {
    match param {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        _ => Err(invalid(&format!("{} 必须为布尔值", key))),
    }
}

fn integer(key: &str, param: &Value) -> Result<Option<i64>> {
    let parsed = match param {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| invalid(&format!("{} 必须为整数", key)))
}

fn string_list(key: &str, param: &Value) -> Result<Option<Vec<String>>> {
    match param {
        Value::Null => Ok(None),
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                _ => Err(invalid(&format!("{} 只能包含字符串", key))),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some),
        _ => Err(invalid(&format!("{} 必须为非空数组", key))),
    }
}
