//! 动作执行
//!
//! 按规则中声明的顺序依次执行已解析的动作，每个动作返回一条结构化日志。
//! 任一动作出错立即返回，由规则处理器回滚该规则的保存点。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rule_engine::{ActionSpec, RewardRef, get_path};
use serde_json::{Value, json};
use sqlx::PgConnection;
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{Customer, Reward, TierChangeReason, Transaction, tier_below};
use crate::repository::{CustomerRepository, RewardRepository, TagRepository, TierRepository};
use crate::service::bonus_service::BonusLedger;
use crate::service::ledger::{LedgerContext, PointsLedger};

/// 动作执行器
pub struct ActionExecutor {
    ledger: Arc<PointsLedger>,
    bonus_ledger: BonusLedger,
}

impl ActionExecutor {
    pub fn new(ledger: Arc<PointsLedger>, bonus_ledger: BonusLedger) -> Self {
        Self { ledger, bonus_ledger }
    }

    /// 依次执行动作，返回逐项日志
    pub async fn execute_in_tx(
        &self,
        conn: &mut PgConnection,
        customer: &Customer,
        transaction: &Transaction,
        actions: &[ActionSpec],
        now: DateTime<Utc>,
        depth: u32,
    ) -> Result<Vec<Value>> {
        let ctx = LedgerContext {
            customer_id: customer.id,
            transaction_id: transaction.id,
            payload: transaction.payload_or_empty(),
            now,
            depth,
        };

        let mut logs = Vec::with_capacity(actions.len());
        for action in actions {
            let log = self.execute_one(&mut *conn, customer, transaction, &ctx, action).await?;
            debug!(transaction_id = %transaction.id, action = action.type_name(), "动作执行完成");
            logs.push(log);
        }
        Ok(logs)
    }

    async fn execute_one(
        &self,
        conn: &mut PgConnection,
        customer: &Customer,
        transaction: &Transaction,
        ctx: &LedgerContext,
        action: &ActionSpec,
    ) -> Result<Value> {
        let action_type = action.type_name();

        match action {
            ActionSpec::EarnPoints { points, from_payload } => {
                let points = ActionSpec::resolve_points(points, from_payload, &ctx.payload)
                    .ok_or_else(|| unresolved_points(action_type, from_payload))?;
                self.ledger.earn_in_tx(conn, ctx, points).await?;
                Ok(json!({"type": action_type, "points": points}))
            }

            ActionSpec::EarnPointsFromAmount {
                amount_path,
                rate,
                min_points,
                max_points,
            } => {
                let amount = get_path(&ctx.payload, amount_path)
                    .and_then(as_f64)
                    .ok_or_else(|| {
                        EngineError::InvalidActionParams(format!(
                            "{}: payload 中 {} 缺失或不是数字",
                            action_type, amount_path
                        ))
                    })?;
                let points = ActionSpec::points_from_amount(amount, *rate, *min_points, *max_points);
                self.ledger.earn_in_tx(conn, ctx, points).await?;
                Ok(json!({
                    "type": action_type,
                    "amountPath": amount_path,
                    "rate": rate,
                    "points": points,
                    "minPoints": min_points,
                    "maxPoints": max_points,
                }))
            }

            ActionSpec::BurnPoints { points, from_payload } => {
                let points = ActionSpec::resolve_points(points, from_payload, &ctx.payload)
                    .ok_or_else(|| unresolved_points(action_type, from_payload))?;
                self.ledger.burn_checked_in_tx(conn, ctx, points).await?;
                Ok(json!({"type": action_type, "points": points}))
            }

            ActionSpec::RedeemReward { reward_id } => {
                let reward = find_reward(&mut *conn, reward_id, &customer.brand).await?;
                let cost = reward.cost();
                // 余额检查与扣减在客户行锁下一步完成
                self.ledger.burn_checked_in_tx(&mut *conn, ctx, cost).await?;
                let issued =
                    RewardRepository::issue_in_tx(conn, customer.id, &reward, transaction.id, ctx.now).await?;
                Ok(json!({
                    "type": action_type,
                    "rewardId": reward.id.to_string(),
                    "costPoints": cost,
                    "customerRewardId": issued.id.to_string(),
                }))
            }

            ActionSpec::IssueReward { reward_id } => {
                let reward = find_reward(&mut *conn, reward_id, &customer.brand).await?;
                let issued =
                    RewardRepository::issue_in_tx(conn, customer.id, &reward, transaction.id, ctx.now).await?;
                Ok(json!({
                    "type": action_type,
                    "rewardId": reward.id.to_string(),
                    "customerRewardId": issued.id.to_string(),
                }))
            }

            ActionSpec::RecordBonusAward { bonus_key } => {
                self.bonus_ledger
                    .record_award_in_tx(conn, bonus_key.trim(), transaction, ctx.now)
                    .await
            }

            ActionSpec::ResetStatusPoints {} => {
                CustomerRepository::set_status_points_in_tx(&mut *conn, customer.id, 0, Some(ctx.now)).await?;
                let change = self
                    .ledger
                    .tier_resolver()
                    .recompute_in_tx(conn, customer.id, TierChangeReason::Reset, Some(transaction.id), ctx.depth)
                    .await?;
                Ok(json!({"type": action_type, "toTier": change.to_tier}))
            }

            ActionSpec::DowngradeOneTier {} => {
                // 同一规则中前序动作可能已改变等级，重新读取
                let current = CustomerRepository::lock_in_tx(&mut *conn, customer.id)
                    .await?
                    .ok_or_else(|| EngineError::Internal(format!("客户 {} 不存在", customer.id)))?;
                let tiers = TierRepository::list_active_in_tx(&mut *conn, &current.brand).await?;
                let current_tier = current
                    .loyalty_status
                    .as_deref()
                    .and_then(|key| tiers.iter().find(|t| t.key == key))
                    .ok_or_else(|| {
                        EngineError::TierNotFound(current.loyalty_status.clone().unwrap_or_default())
                    })?;

                let Some(target) = tier_below(&tiers, current_tier) else {
                    return Ok(json!({
                        "type": action_type,
                        "changed": false,
                        "reason": "Already at lowest tier",
                    }));
                };

                CustomerRepository::set_status_points_in_tx(&mut *conn, customer.id, target.min_status_points, None)
                    .await?;
                self.ledger
                    .tier_resolver()
                    .recompute_in_tx(
                        conn,
                        customer.id,
                        TierChangeReason::Inactivity,
                        Some(transaction.id),
                        ctx.depth,
                    )
                    .await?;
                Ok(json!({"type": action_type, "changed": true, "toTier": target.key}))
            }

            ActionSpec::SetCustomerStatus { status } => {
                let status = status.trim();
                CustomerRepository::set_status_in_tx(conn, customer.id, status).await?;
                Ok(json!({"type": action_type, "status": status}))
            }

            ActionSpec::AddCustomerTag { tag } => {
                let tag = tag.trim();
                let inserted = TagRepository::add_in_tx(conn, customer.id, tag).await?;
                Ok(json!({"type": action_type, "tag": tag, "idempotent": !inserted}))
            }
        }
    }
}

async fn find_reward(conn: &mut PgConnection, reward_ref: &RewardRef, brand: &str) -> Result<Reward> {
    let raw = reward_ref
        .id()
        .ok_or_else(|| EngineError::RewardNotFound("<empty>".to_string()))?;
    let id = Uuid::parse_str(&raw).map_err(|_| EngineError::RewardNotFound(raw.clone()))?;

    RewardRepository::find_active_in_tx(conn, id, brand)
        .await?
        .ok_or(EngineError::RewardNotFound(raw))
}

fn unresolved_points(action_type: &str, from_payload: &Option<String>) -> EngineError {
    let detail = match from_payload {
        Some(path) => format!("payload 中 {} 缺失或不是整数", path),
        None => "points 不是整数".to_string(),
    };
    EngineError::InvalidActionParams(format!("{}: {}", action_type, detail))
}

/// 数字或数字字符串
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
