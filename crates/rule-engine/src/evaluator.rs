//! 条件评估器
//!
//! 纯函数求值：只读取 [`EvaluationContext`] 与预取的 [`Facts`]。
//! 所有叶子严格求值，类型不符或缺失字段一律返回 false，不会报错。

use chrono::{DateTime, Datelike, Duration, Utc};
use serde_json::Value;
use tracing::trace;

use crate::condition::{Condition, ConditionNode, int_param};
use crate::models::{EvaluationContext, Facts};
use crate::operators::CompareOp;

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 对条件树求值
    pub fn evaluate(node: &ConditionNode, ctx: &EvaluationContext, facts: &Facts) -> bool {
        match node {
            ConditionNode::All(children) => children.iter().all(|c| Self::evaluate(c, ctx, facts)),
            ConditionNode::Any(children) => children.iter().any(|c| Self::evaluate(c, ctx, facts)),
            ConditionNode::Not(inner) => !Self::evaluate(inner, ctx, facts),
            ConditionNode::Leaf(leaf) => {
                let matched = Self::evaluate_leaf(leaf, ctx, facts);
                trace!(?leaf, matched, "叶子条件求值");
                matched
            }
        }
    }

    fn evaluate_leaf(leaf: &Condition, ctx: &EvaluationContext, facts: &Facts) -> bool {
        let customer = &ctx.customer;
        match leaf {
            Condition::PayloadEquals(entries) => entries.iter().all(|(path, expected)| {
                let actual = ctx.payload_field(path).unwrap_or(&Value::Null);
                Self::eq(actual, expected)
            }),
            Condition::PayloadPresent(paths) => paths.iter().all(|path| match ctx.payload_field(path) {
                None | Some(Value::Null) => false,
                Some(Value::String(s)) => !s.is_empty(),
                Some(_) => true,
            }),
            Condition::PayloadIn(entries) => entries.iter().all(|(path, allowed)| {
                let actual = ctx.payload_field(path).unwrap_or(&Value::Null);
                Self::in_list(actual, allowed)
            }),
            Condition::PayloadContains(entries) => entries.iter().all(|(path, needle)| {
                ctx.payload_field(path)
                    .is_some_and(|hay| Self::contains(hay, needle))
            }),
            Condition::PayloadCompare { path, op, value } => {
                Self::compare(ctx.payload_field(path), *op, value)
            }
            Condition::AmountGte(min) => ctx
                .payload_field("amount")
                .and_then(int_param)
                .is_some_and(|amount| amount >= *min),
            Condition::PointsGte(min) => ctx
                .payload_field("points")
                .and_then(int_param)
                .is_some_and(|points| points >= *min),
            Condition::CustomerStatusIn(allowed) => allowed.contains(&customer.status),
            Condition::CustomerLoyaltyStatusIn(allowed) => customer
                .loyalty_status
                .as_ref()
                .is_some_and(|s| allowed.contains(s)),
            Condition::CustomerLifetimePointsGte(min) => customer.lifetime_points >= *min,
            Condition::CustomerCreatedDaysGte(days) => customer
                .created_at
                .zip(Self::days_before(ctx, *days))
                .is_some_and(|(at, cutoff)| at <= cutoff),
            Condition::CustomerLastActivityDaysGte(days) => customer
                .last_activity_at
                .zip(Self::days_before(ctx, *days))
                .is_some_and(|(at, cutoff)| at <= cutoff),
            Condition::CustomerCompare { field, op, value } => {
                let actual = customer.field(field);
                Self::compare(actual.as_ref(), *op, value)
            }
            Condition::WeekdayIn(days) => {
                days.contains(&ctx.now.weekday().num_days_from_monday())
            }
            Condition::FirstPurchase => !facts.has_prior_earn,
            Condition::Birthday { bonus_points } => {
                let Some(birth) = customer.birthdate else {
                    return false;
                };
                let today = ctx.now.date_naive();
                if today.day() != birth.day() || today.month() != birth.month() {
                    return false;
                }
                let already_given = match bonus_points {
                    Some(points) => facts.earn_points_this_year.contains(points),
                    None => !facts.earn_points_this_year.is_empty(),
                };
                !already_given
            }
            Condition::EarnPointsAwardedThisYear(points) => {
                facts.earn_points_this_year.contains(points)
            }
            Condition::BonusAwarded(key) => facts.bonus_awarded.get(key).copied().unwrap_or(false),
            Condition::Malformed(_) => false,
        }
    }

    /// `now - days`，超出时间范围时为 None（叶子求值为 false）
    fn days_before(ctx: &EvaluationContext, days: i64) -> Option<DateTime<Utc>> {
        Duration::try_days(days).and_then(|d| ctx.now.checked_sub_signed(d))
    }

    /// 通用比较（eq / gte / lte / between）
    fn compare(actual: Option<&Value>, op: CompareOp, expected: &Value) -> bool {
        let numeric = actual.and_then(Self::as_f64);
        match (op, numeric) {
            (CompareOp::Eq, _) => Self::eq(actual.unwrap_or(&Value::Null), expected),
            (CompareOp::Gte, Some(a)) => Self::as_f64(expected).is_some_and(|b| a >= b),
            (CompareOp::Lte, Some(a)) => Self::as_f64(expected).is_some_and(|b| a <= b),
            (CompareOp::Between, Some(a)) => Self::between(a, expected),
            (_, None) => false,
        }
    }

    /// 相等比较
    fn eq(field: &Value, expected: &Value) -> bool {
        // 数值统一转为浮点数比较，避免 100 与 100.0 不等
        if let (Value::Number(a), Value::Number(b)) = (field, expected) {
            if let (Some(f1), Some(f2)) = (a.as_f64(), b.as_f64()) {
                return (f1 - f2).abs() < f64::EPSILON;
            }
        }
        field == expected
    }

    /// expected 应为 [min, max] 数组
    fn between(actual: f64, expected: &Value) -> bool {
        let Some(arr) = expected.as_array() else {
            return false;
        };
        if arr.len() != 2 {
            return false;
        }
        match (Self::as_f64(&arr[0]), Self::as_f64(&arr[1])) {
            (Some(min), Some(max)) => actual >= min && actual <= max,
            _ => false,
        }
    }

    fn in_list(field: &Value, allowed: &[Value]) -> bool {
        allowed.iter().any(|item| Self::eq(field, item))
    }

    /// 字符串子串或数组元素包含
    fn contains(hay: &Value, needle: &Value) -> bool {
        match hay {
            Value::String(s) => {
                let needle = match needle {
                    Value::String(n) => n.clone(),
                    other => other.to_string(),
                };
                s.contains(&needle)
            }
            Value::Array(arr) => arr.iter().any(|item| Self::eq(item, needle)),
            _ => false,
        }
    }

    /// 转换为 f64
    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
