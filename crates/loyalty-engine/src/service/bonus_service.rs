//! 奖励台账服务
//!
//! 按定义的发放策略计算周期键，同一 (bonusKey, brand, profileId, periodKey) 最多一条记录。
//! 插入依赖唯一索引的 ON CONFLICT DO NOTHING，并发下同样只有一方写入成功。

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use sqlx::PgConnection;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::models::{AwardPolicy, BonusDefinition, Transaction};
use crate::repository::BonusRepository;

/// 奖励台账
#[derive(Debug, Default, Clone, Copy)]
pub struct BonusLedger;

impl BonusLedger {
    pub fn new() -> Self {
        Self
    }

    /// 解析品牌可用的奖励定义及其发放策略
    pub async fn resolve_definition_in_tx(
        &self,
        conn: &mut PgConnection,
        bonus_key: &str,
        brand: &str,
    ) -> Result<(BonusDefinition, AwardPolicy)> {
        let definition = BonusRepository::find_definition_in_tx(conn, bonus_key, brand)
            .await?
            .ok_or_else(|| EngineError::UnknownBonusKey(bonus_key.to_string()))?;

        if !definition.applies_to(brand) {
            return Err(EngineError::BonusBrandMismatch {
                bonus_key: bonus_key.to_string(),
                brand: brand.to_string(),
            });
        }

        let policy = AwardPolicy::parse(&definition.award_policy)
            .ok_or_else(|| EngineError::UnsupportedAwardPolicy(definition.award_policy.clone()))?;

        Ok((definition, policy))
    }

    /// 当前周期是否已发放
    ///
    /// 定义不存在、不适用于品牌或策略无效时返回 None，条件求值按未满足处理
    pub async fn is_awarded_in_tx(
        &self,
        conn: &mut PgConnection,
        bonus_key: &str,
        brand: &str,
        profile_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<bool>> {
        let policy = match self.resolve_definition_in_tx(&mut *conn, bonus_key, brand).await {
            Ok((_, policy)) => policy,
            Err(EngineError::Database(e)) => return Err(EngineError::Database(e)),
            Err(_) => return Ok(None),
        };
        let period_key = policy.period_key(now);

        let exists =
            BonusRepository::award_exists_in_tx(conn, bonus_key, brand, profile_id, period_key.as_deref()).await?;
        Ok(Some(exists))
    }

    /// 记录一次发放，已存在时幂等返回
    ///
    /// 返回动作日志 `{bonusKey, awardPolicy, periodKey, idempotent}`
    pub async fn record_award_in_tx(
        &self,
        conn: &mut PgConnection,
        bonus_key: &str,
        transaction: &Transaction,
        now: DateTime<Utc>,
    ) -> Result<Value> {
        let (_, policy) = self
            .resolve_definition_in_tx(&mut *conn, bonus_key, &transaction.brand)
            .await?;
        let period_key = policy.period_key(now);

        let inserted = BonusRepository::insert_award_if_absent_in_tx(
            conn,
            bonus_key,
            &transaction.brand,
            &transaction.profile_id,
            period_key.as_deref(),
            Some(&transaction.event_id),
            Some(transaction.id),
            &json!({"eventType": transaction.event_type}),
        )
        .await?;

        if inserted {
            info!(
                bonus_key,
                brand = %transaction.brand,
                profile_id = %transaction.profile_id,
                period_key = ?period_key,
                "奖励已发放"
            );
        }

        Ok(award_log(bonus_key, policy, period_key, !inserted))
    }
}

fn award_log(bonus_key: &str, policy: AwardPolicy, period_key: Option<String>, idempotent: bool) -> Value {
    json!({
        "type": "record_bonus_award",
        "bonusKey": bonus_key,
        "awardPolicy": policy.as_str(),
        "periodKey": period_key,
        "idempotent": idempotent,
    })
}
