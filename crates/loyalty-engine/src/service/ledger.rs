//! 积分账本
//!
//! 积分流水与余额的唯一写入口。所有方法都在调用方持有的连接上执行，
//! 由规则处理器放在规则保存点中，规则失败时流水随保存点一并回滚。
//!
//! 余额 = 未过期流水（expires_at 为空或不早于今天）的积分之和，过期在查询时过滤。

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{MovementType, TierChangeReason};
use crate::repository::{CustomerRepository, PointMovementRepository, earn_expiry};
use crate::service::tier_service::{TierChange, TierResolver};

/// 账本操作的上下文
///
/// 客户、来源交易、规范化后的 payload 以及本次处理的时刻和深度
#[derive(Debug, Clone)]
pub struct LedgerContext {
    pub customer_id: Uuid,
    pub transaction_id: Uuid,
    pub payload: Value,
    pub now: DateTime<Utc>,
    pub depth: u32,
}

impl LedgerContext {
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

/// 入账结果
#[derive(Debug, Clone)]
pub struct EarnResult {
    pub points: i64,
    pub movement_id: Option<i64>,
    pub tier: Option<TierChange>,
}

/// 积分账本
pub struct PointsLedger {
    pool: PgPool,
    tier_resolver: Arc<TierResolver>,
}

impl PointsLedger {
    pub fn new(pool: PgPool, tier_resolver: Arc<TierResolver>) -> Self {
        Self { pool, tier_resolver }
    }

    pub fn tier_resolver(&self) -> &Arc<TierResolver> {
        &self.tier_resolver
    }

    /// 入账
    ///
    /// 锁定客户行，写入 365 天后过期的 EARN 流水，累加累计积分与等级积分，再重算等级。
    /// 0 分不产生流水。
    pub async fn earn_in_tx(&self, conn: &mut PgConnection, ctx: &LedgerContext, points: i64) -> Result<EarnResult> {
        if points < 0 {
            return Err(EngineError::InvalidActionParams(format!(
                "入账积分不能为负数: {}",
                points
            )));
        }
        if points == 0 {
            return Ok(EarnResult {
                points: 0,
                movement_id: None,
                tier: None,
            });
        }

        CustomerRepository::lock_in_tx(&mut *conn, ctx.customer_id)
            .await?
            .ok_or_else(|| EngineError::Internal(format!("客户 {} 不存在", ctx.customer_id)))?;

        let movement_id = PointMovementRepository::insert_in_tx(
            &mut *conn,
            ctx.customer_id,
            points,
            MovementType::Earn,
            Some(ctx.transaction_id),
            Some(earn_expiry(ctx.today())),
        )
        .await?;
        CustomerRepository::add_points_in_tx(&mut *conn, ctx.customer_id, points).await?;

        debug!(customer_id = %ctx.customer_id, points, movement_id, "积分入账");

        let tier = self
            .tier_resolver
            .recompute_in_tx(
                &mut *conn,
                ctx.customer_id,
                TierChangeReason::EarnPoints,
                Some(ctx.transaction_id),
                ctx.depth,
            )
            .await?;

        Ok(EarnResult {
            points,
            movement_id: Some(movement_id),
            tier: Some(tier),
        })
    }

    /// 扣减：写入负数 BURN 流水，不检查余额
    pub async fn burn_in_tx(&self, conn: &mut PgConnection, ctx: &LedgerContext, points: i64) -> Result<Option<i64>> {
        if points <= 0 {
            return Ok(None);
        }

        let movement_id = PointMovementRepository::insert_in_tx(
            &mut *conn,
            ctx.customer_id,
            -points,
            MovementType::Burn,
            Some(ctx.transaction_id),
            None,
        )
        .await?;

        debug!(customer_id = %ctx.customer_id, points, movement_id, "积分扣减");
        Ok(Some(movement_id))
    }

    /// 带余额检查的扣减
    ///
    /// 先锁定客户行再计算余额，检查与扣减在同一把行锁下完成，
    /// 同一客户的并发扣减不会穿透余额。
    pub async fn burn_checked_in_tx(
        &self,
        conn: &mut PgConnection,
        ctx: &LedgerContext,
        points: i64,
    ) -> Result<Option<i64>> {
        if points <= 0 {
            return Ok(None);
        }

        CustomerRepository::lock_in_tx(&mut *conn, ctx.customer_id)
            .await?
            .ok_or_else(|| EngineError::Internal(format!("客户 {} 不存在", ctx.customer_id)))?;

        let available = PointMovementRepository::balance_in_tx(&mut *conn, ctx.customer_id, ctx.today()).await?;
        if available < points {
            return Err(EngineError::InsufficientPoints {
                required: points,
                available,
            });
        }

        self.burn_in_tx(conn, ctx, points).await
    }

    pub async fn balance_in_tx(conn: &mut PgConnection, customer_id: Uuid, today: NaiveDate) -> Result<i64> {
        PointMovementRepository::balance_in_tx(conn, customer_id, today).await
    }

    /// 可用积分余额
    pub async fn points_balance(&self, customer_id: Uuid, today: NaiveDate) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::balance_in_tx(&mut conn, customer_id, today).await
    }
}
