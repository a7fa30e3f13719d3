//! 动作目录
//!
//! 规则的 `actions` 字段可以是单个对象或对象数组，每个对象以 `type` 区分。
//! 整个列表在执行任何副作用之前解析完毕，未知类型或缺少必填参数的规则直接失败。

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::condition::int_param;
use crate::error::{Result, RuleError};
use crate::models::get_path;

const ACTION_TYPES: &[&str] = &[
    "earn_points",
    "earn_points_from_amount",
    "burn_points",
    "redeem_reward",
    "issue_reward",
    "record_bonus_award",
    "reset_status_points",
    "downgrade_one_tier",
    "set_customer_status",
    "add_customer_tag",
];

/// 奖励引用：字符串、数字或 `{"id": ...}` 对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RewardRef {
    Text(String),
    Number(i64),
    Object {
        #[serde(alias = "rewardId", alias = "reward_id")]
        id: Value,
    },
}

impl RewardRef {
    pub fn id(&self) -> Option<String> {
        match self {
            Self::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Self::Text(_) => None,
            Self::Number(n) => Some(n.to_string()),
            Self::Object { id } => match id {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            },
        }
    }
}

/// 规则动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    EarnPoints {
        #[serde(default)]
        points: Option<Value>,
        #[serde(default, alias = "fromPayload")]
        from_payload: Option<String>,
    },
    EarnPointsFromAmount {
        #[serde(alias = "amountPath")]
        amount_path: String,
        #[serde(deserialize_with = "lenient_f64")]
        rate: f64,
        #[serde(default, alias = "minPoints", deserialize_with = "lenient_opt_i64")]
        min_points: Option<i64>,
        #[serde(default, alias = "maxPoints", deserialize_with = "lenient_opt_i64")]
        max_points: Option<i64>,
    },
    BurnPoints {
        #[serde(default)]
        points: Option<Value>,
        #[serde(default, alias = "fromPayload")]
        from_payload: Option<String>,
    },
    RedeemReward {
        #[serde(alias = "rewardId", alias = "rewardID")]
        reward_id: RewardRef,
    },
    IssueReward {
        #[serde(alias = "rewardId", alias = "rewardID")]
        reward_id: RewardRef,
    },
    RecordBonusAward {
        #[serde(alias = "bonusKey")]
        bonus_key: String,
    },
    ResetStatusPoints {},
    DowngradeOneTier {},
    SetCustomerStatus {
        status: String,
    },
    AddCustomerTag {
        tag: String,
    },
}

impl ActionSpec {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::EarnPoints { .. } => "earn_points",
            Self::EarnPointsFromAmount { .. } => "earn_points_from_amount",
            Self::BurnPoints { .. } => "burn_points",
            Self::RedeemReward { .. } => "redeem_reward",
            Self::IssueReward { .. } => "issue_reward",
            Self::RecordBonusAward { .. } => "record_bonus_award",
            Self::ResetStatusPoints {} => "reset_status_points",
            Self::DowngradeOneTier {} => "downgrade_one_tier",
            Self::SetCustomerStatus { .. } => "set_customer_status",
            Self::AddCustomerTag { .. } => "add_customer_tag",
        }
    }

    /// 解析单个动作
    pub fn parse(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| RuleError::InvalidAction("动作必须为对象".to_string()))?;
        let action_type = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| RuleError::InvalidAction("动作缺少 type".to_string()))?;
        if !ACTION_TYPES.contains(&action_type) {
            return Err(RuleError::UnknownAction(action_type.to_string()));
        }

        let action: Self = serde_json::from_value(value.clone())
            .map_err(|e| RuleError::InvalidAction(format!("{}: {}", action_type, e)))?;
        action.validate()?;
        Ok(action)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(RuleError::InvalidAction(format!("{}: {}", self.type_name(), msg)));
        match self {
            Self::EarnPoints {
                points,
                from_payload,
            }
            | Self::BurnPoints {
                points,
                from_payload,
            } => match (points, from_payload) {
                (_, Some(path)) if !path.trim().is_empty() => Ok(()),
                (Some(p), _) if int_param(p).is_some() => Ok(()),
                (Some(_), _) => invalid("points 必须为整数"),
                _ => invalid("需要 points 或 from_payload"),
            },
            Self::EarnPointsFromAmount {
                amount_path,
                min_points,
                max_points,
                ..
            } => {
                if amount_path.trim().is_empty() {
                    return invalid("需要 amount_path");
                }
                if let (Some(min), Some(max)) = (min_points, max_points) {
                    if min > max {
                        return invalid("min_points 不能大于 max_points");
                    }
                }
                Ok(())
            }
            Self::RedeemReward { reward_id } | Self::IssueReward { reward_id } => {
                if reward_id.id().is_none() {
                    return invalid("需要 reward_id");
                }
                Ok(())
            }
            Self::RecordBonusAward { bonus_key } if bonus_key.trim().is_empty() => {
                invalid("需要 bonusKey")
            }
            Self::SetCustomerStatus { status } if status.trim().is_empty() => invalid("需要 status"),
            Self::AddCustomerTag { tag } if tag.trim().is_empty() => invalid("需要 tag"),
            _ => Ok(()),
        }
    }

    /// earn_points / burn_points 的积分数：from_payload 优先，其次固定值
    ///
    /// payload 中取不到数值时返回 None。
    pub fn resolve_points(points: &Option<Value>, from_payload: &Option<String>, payload: &Value) -> Option<i64> {
        match from_payload {
            Some(path) if !path.trim().is_empty() => get_path(payload, path).and_then(int_param),
            _ => points.as_ref().and_then(int_param),
        }
    }

    /// earn_points_from_amount 的积分计算：截断取整后按上下限夹紧
    pub fn points_from_amount(amount: f64, rate: f64, min_points: Option<i64>, max_points: Option<i64>) -> i64 {
        let mut points = (amount * rate).trunc() as i64;
        if let Some(min) = min_points {
            points = points.max(min);
        }
        if let Some(max) = max_points {
            points = points.min(max);
        }
        points
    }
}

/// 解析规则的动作列表（单个对象或数组）
pub fn parse_actions(value: &Value) -> Result<Vec<ActionSpec>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(_) => Ok(vec![ActionSpec::parse(value)?]),
        Value::Array(items) => items.iter().map(ActionSpec::parse).collect(),
        _ => Err(RuleError::InvalidAction("actions 必须为对象或数组".to_string())),
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| serde::de::Error::custom("必须为数字"))
}

fn lenient_opt_i64<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    int_param(&value)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom("必须为整数"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_object_and_list() {
        let one = parse_actions(&json!({"type": "earn_points", "points": 10})).unwrap();
        assert_eq!(one.len(), 1);

        let many = parse_actions(&json!([
            {"type": "earn_points", "points": 10},
            {"type": "add_customer_tag", "tag": "vip"}
        ]))
        .unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[1].type_name(), "add_customer_tag");
    }

    #[test]
    fn test_unknown_type_rejected_before_execution() {
        let err = parse_actions(&json!([
            {"type": "earn_points", "points": 10},
            {"type": "send_email"}
        ]))
        .unwrap_err();
        assert!(matches!(err, RuleError::UnknownAction(t) if t == "send_email"));
    }

    #[test]
    fn test_field_aliases() {
        let action = ActionSpec::parse(&json!({
            "type": "earn_points_from_amount",
            "amountPath": "order.total",
            "rate": "1.5",
            "maxPoints": 500
        }))
        .unwrap();
        assert_eq!(
            action,
            ActionSpec::EarnPointsFromAmount {
                amount_path: "order.total".into(),
                rate: 1.5,
                min_points: None,
                max_points: Some(500),
            }
        );

        let action = ActionSpec::parse(&json!({"type": "record_bonus_award", "bonusKey": "WELCOME"})).unwrap();
        assert_eq!(
            action,
            ActionSpec::RecordBonusAward {
                bonus_key: "WELCOME".into()
            }
        );
    }

    #[test]
    fn test_reward_reference_shapes() {
        for raw in [json!("r-1"), json!({"id": "r-1"}), json!({"rewardId": "r-1"})] {
            let action = ActionSpec::parse(&json!({"type": "issue_reward", "rewardId": raw})).unwrap();
            match action {
                ActionSpec::IssueReward { reward_id } => assert_eq!(reward_id.id().as_deref(), Some("r-1")),
                other => panic!("unexpected action: {:?}", other),
            }
        }
    }

    #[test]
    fn test_missing_required_params() {
        assert!(ActionSpec::parse(&json!({"type": "earn_points"})).is_err());
        assert!(ActionSpec::parse(&json!({"type": "earn_points", "points": "lots"})).is_err());
        assert!(ActionSpec::parse(&json!({"type": "set_customer_status", "status": ""})).is_err());
        assert!(ActionSpec::parse(&json!({"type": "earn_points_from_amount", "amount_path": "amount"})).is_err());
        assert!(ActionSpec::parse(&json!({"type": "redeem_reward", "reward_id": ""})).is_err());
    }

    #[test]
    fn test_unit_actions_tolerate_extra_fields() {
        let action = ActionSpec::parse(&json!({"type": "reset_status_points", "note": "x"})).unwrap();
        assert_eq!(action, ActionSpec::ResetStatusPoints {});
    }

    #[test]
    fn test_resolve_points() {
        let payload = json!({"bonus": {"points": "25"}});
        assert_eq!(
            ActionSpec::resolve_points(&None, &Some("bonus.points".into()), &payload),
            Some(25)
        );
        assert_eq!(ActionSpec::resolve_points(&Some(json!(10)), &None, &payload), Some(10));
        assert_eq!(ActionSpec::resolve_points(&None, &Some("missing".into()), &payload), None);
    }

    #[test]
    fn test_points_from_amount_clamps() {
        assert_eq!(ActionSpec::points_from_amount(100.0, 1.0, None, None), 100);
        assert_eq!(ActionSpec::points_from_amount(99.9, 1.0, None, None), 99);
        assert_eq!(ActionSpec::points_from_amount(5.0, 1.0, Some(10), None), 10);
        assert_eq!(ActionSpec::points_from_amount(1000.0, 2.0, None, Some(500)), 500);
    }
}
