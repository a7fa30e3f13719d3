//! 等级重算服务
//!
//! 根据客户当前的等级积分选出品牌下的等级，等级变化时写回 loyalty_status，
//! 并在品牌登记了对应的内部事件类型时提交 TIER_UPGRADED / TIER_DOWNGRADED 事件。
//!
//! 等级服务与接收入口互相依赖（等级事件要重新进入入口），
//! 入口通过 [`TierResolver::set_event_sink`] 延迟注入。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgConnection;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cascade::{CascadeGuard, InternalEvent, InternalEventSink};
use crate::error::{EngineError, Result};
use crate::models::{
    EventOrigin, LoyaltyTier, TierChangeReason, TierDirection, TransactionSource, UNCONFIGURED_TIER,
    resolve_tier,
};
use crate::repository::{CustomerRepository, EventTypeRepository, TierRepository};

/// 一次重算的结果
#[derive(Debug, Clone, PartialEq)]
pub struct TierChange {
    pub from_tier: Option<String>,
    pub to_tier: String,
    /// 等级未变化时为 None
    pub direction: Option<TierDirection>,
    /// 提交的内部事件交易
    pub emitted_transaction_id: Option<Uuid>,
}

impl TierChange {
    pub fn changed(&self) -> bool {
        self.direction.is_some()
    }
}

/// 等级重算服务
pub struct TierResolver {
    /// 内部事件入口（延迟注入，打破与接收入口的循环依赖）
    event_sink: RwLock<Option<Arc<dyn InternalEventSink>>>,
}

impl Default for TierResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TierResolver {
    pub fn new() -> Self {
        Self {
            event_sink: RwLock::new(None),
        }
    }

    /// 设置内部事件入口
    pub async fn set_event_sink(&self, sink: Arc<dyn InternalEventSink>) {
        let mut guard = self.event_sink.write().await;
        *guard = Some(sink);
        info!("TierResolver 内部事件入口已设置");
    }

    /// 在调用方事务中重算客户等级
    ///
    /// # Arguments
    /// * `depth` - 触发本次重算的交易深度，等级事件的深度为其加 1
    pub async fn recompute_in_tx(
        &self,
        conn: &mut PgConnection,
        customer_id: Uuid,
        reason: TierChangeReason,
        source_transaction_id: Option<Uuid>,
        depth: u32,
    ) -> Result<TierChange> {
        let customer = CustomerRepository::lock_in_tx(&mut *conn, customer_id)
            .await?
            .ok_or_else(|| EngineError::Internal(format!("客户 {} 在重算等级时不存在", customer_id)))?;

        let tiers = TierRepository::list_active_in_tx(&mut *conn, &customer.brand).await?;
        let from_tier = customer.loyalty_status.clone();

        // 品牌未配置等级：只写哨兵值，不产生事件
        if tiers.is_empty() {
            if from_tier.as_deref() != Some(UNCONFIGURED_TIER) {
                CustomerRepository::set_loyalty_status_in_tx(&mut *conn, customer_id, UNCONFIGURED_TIER)
                    .await?;
            }
            return Ok(TierChange {
                from_tier,
                to_tier: UNCONFIGURED_TIER.to_string(),
                direction: None,
                emitted_transaction_id: None,
            });
        }

        let to_tier = match resolve_tier(&tiers, customer.status_points) {
            Some(tier) => tier.key.clone(),
            None => UNCONFIGURED_TIER.to_string(),
        };

        if from_tier.as_deref() == Some(to_tier.as_str()) {
            return Ok(TierChange {
                from_tier,
                to_tier,
                direction: None,
                emitted_transaction_id: None,
            });
        }

        CustomerRepository::set_loyalty_status_in_tx(&mut *conn, customer_id, &to_tier).await?;

        let direction = direction_between(&tiers, from_tier.as_deref(), &to_tier);
        info!(
            brand = %customer.brand,
            profile_id = %customer.profile_id,
            from = ?from_tier,
            to = %to_tier,
            reason = reason.as_str(),
            "客户等级变化"
        );

        let event_type = direction.event_type();
        let registered =
            EventTypeRepository::is_active_in_tx(&mut *conn, &customer.brand, event_type, EventOrigin::Internal)
                .await?;
        if !registered {
            debug!(brand = %customer.brand, event_type, "等级事件类型未登记，跳过级联");
            return Ok(TierChange {
                from_tier,
                to_tier,
                direction: Some(direction),
                emitted_transaction_id: None,
            });
        }

        let sink = {
            let guard = self.event_sink.read().await;
            guard.clone()
        };
        let Some(sink) = sink else {
            warn!(brand = %customer.brand, event_type, "内部事件入口未设置，等级事件未提交");
            return Ok(TierChange {
                from_tier,
                to_tier,
                direction: Some(direction),
                emitted_transaction_id: None,
            });
        };

        let event = InternalEvent {
            brand: customer.brand.clone(),
            profile_id: customer.profile_id.clone(),
            event_type: event_type.to_string(),
            event_id: tier_event_id(&customer.brand, &customer.profile_id, event_type, Utc::now()),
            source: TransactionSource::System,
            payload: json!({
                "fromTier": from_tier,
                "toTier": to_tier,
                "reason": reason.as_str(),
                "statusPoints": customer.status_points,
                "sourceTransactionId": source_transaction_id.map(|id| id.to_string()),
            }),
        };
        let txn = sink
            .submit_internal(&mut *conn, event, CascadeGuard::child_depth(depth))
            .await?;

        Ok(TierChange {
            from_tier,
            to_tier,
            direction: Some(direction),
            emitted_transaction_id: Some(txn.id),
        })
    }
}

/// 按 rank 判断方向；旧等级不在目录中（首次定级或原为 UNCONFIGURED）视为升级
fn direction_between(tiers: &[LoyaltyTier], from: Option<&str>, to: &str) -> TierDirection {
    let rank_of = |key: Option<&str>| -> i64 {
        key.and_then(|k| tiers.iter().find(|t| t.key == k))
            .map(|t| i64::from(t.rank))
            .unwrap_or(-1)
    };
    if rank_of(Some(to)) > rank_of(from) {
        TierDirection::Upgraded
    } else {
        TierDirection::Downgraded
    }
}

/// 等级事件 ID：精确到微秒的时间戳保证同一客户多次变化互不冲突
fn tier_event_id(brand: &str, profile_id: &str, event_type: &str, at: DateTime<Utc>) -> String {
    format!(
        "tier_{}_{}_{}_{}",
        brand,
        profile_id,
        event_type,
        at.format("%Y%m%d%H%M%S%6f")
    )
}
