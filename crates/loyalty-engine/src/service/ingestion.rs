//! 事件接收入口
//!
//! 外部事件、导入事件与内部事件（等级变化、定时任务）的唯一入口。
//!
//! ## 外部事件流程
//!
//! 1. 幂等检查：(brand, event_id) 已存在时直接返回原交易，不再执行规则
//! 2. 拒绝客户资料类事件（资料只能通过客户 upsert 接口维护）
//! 3. brand / profile_id / event_type 任一为空时记为 BLOCKED
//! 4. 写入交易；事件类型为启用的 EXTERNAL 类型时刷新客户最近活跃时间
//! 5. PENDING 交易同步进入规则处理，返回前写回最终状态
//!
//! 交易行先独立提交，规则处理在第二个事务中进行；处理失败时回滚第二个事务，
//! 再把交易记为 FAILED 并保留错误信息。
//!
//! ## 内部事件
//!
//! 内部事件通过 [`InternalEventSink`] 提交，在触发方的连接上开启保存点处理，
//! 深度达到上限时只落库为 PROCESSED，不执行规则。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use loyalty_shared::observability::metrics;
use serde::Serialize;
use serde_json::Value;
use sqlx::{Connection, PgConnection, PgPool};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::cascade::{CascadeDecision, CascadeGuard, InternalEvent, InternalEventSink};
use crate::error::{EngineError, Result};
use crate::models::{
    EventOrigin, NewTransaction, ProcessOutcome, Transaction, TransactionSource, TransactionStatus,
};
use crate::repository::{CustomerRepository, EventTypeRepository, TransactionRepository};
use crate::service::rule_processor::RuleProcessor;

/// 只能通过客户 upsert 接口提交的事件类型
const PROFILE_EVENT_TYPES: &[&str] = &["CUSTOMER_PROFILE", "CONTACT", "CUSTOMER_UPSERT"];

/// 待接收的外部事件
#[derive(Debug, Clone)]
pub struct EventSubmission {
    pub brand: String,
    pub profile_id: String,
    pub event_type: String,
    pub event_id: String,
    pub source: TransactionSource,
    pub payload: Value,
}

/// 接收结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventReceipt {
    pub transaction_id: Uuid,
    pub status: TransactionStatus,
}

impl From<&Transaction> for EventReceipt {
    fn from(txn: &Transaction) -> Self {
        Self {
            transaction_id: txn.id,
            status: txn.status,
        }
    }
}

/// 事件接收入口
pub struct IngestionGate {
    pool: PgPool,
    processor: Arc<RuleProcessor>,
    guard: CascadeGuard,
}

impl IngestionGate {
    pub fn new(pool: PgPool, processor: Arc<RuleProcessor>, guard: CascadeGuard) -> Self {
        Self {
            pool,
            processor,
            guard,
        }
    }

    /// 接收一条外部事件
    #[instrument(skip(self, submission), fields(brand = %submission.brand, event_id = %submission.event_id))]
    pub async fn submit_event(&self, submission: EventSubmission) -> Result<EventReceipt> {
        if submission.event_id.trim().is_empty() {
            return Err(EngineError::Validation("eventId 不能为空".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        if let Some(existing) =
            TransactionRepository::find_by_event_id_in_tx(&mut tx, &submission.brand, &submission.event_id).await?
        {
            info!(transaction_id = %existing.id, "重复事件，返回已有交易");
            return Ok(EventReceipt::from(&existing));
        }

        if is_profile_event(&submission.event_type) {
            return Err(EngineError::ProfileEventRejected(submission.event_type));
        }

        let status = if missing_required_fields(&submission) {
            TransactionStatus::Blocked
        } else {
            TransactionStatus::Pending
        };
        let processed_at = status.is_terminal().then(Utc::now);

        let new = NewTransaction {
            brand: submission.brand.clone(),
            profile_id: submission.profile_id.clone(),
            event_type: submission.event_type.clone(),
            event_id: submission.event_id.clone(),
            source: submission.source.as_str().to_string(),
            payload: submission.payload,
        };
        let inserted =
            TransactionRepository::insert_if_absent_in_tx(&mut tx, &new, &ProcessOutcome::with_status(status), processed_at)
                .await?;
        let Some(txn) = inserted else {
            // 并发提交了同一事件，以先写入的为准
            let existing = TransactionRepository::find_by_event_id_in_tx(&mut tx, &new.brand, &new.event_id)
                .await?
                .ok_or_else(|| EngineError::Internal(format!("事件 {} 写入冲突后未找到交易", new.event_id)))?;
            return Ok(EventReceipt::from(&existing));
        };

        if EventTypeRepository::is_active_in_tx(&mut tx, &txn.brand, &txn.event_type, EventOrigin::External).await? {
            CustomerRepository::touch_activity_in_tx(&mut tx, &txn.brand, &txn.profile_id, Utc::now()).await?;
        }
        tx.commit().await?;

        if txn.status == TransactionStatus::Blocked {
            warn!(transaction_id = %txn.id, "事件缺少必填字段，已拦截");
            metrics::record_event_ingested(TransactionStatus::Blocked.as_str());
            return Ok(EventReceipt::from(&txn));
        }

        let final_status = self.process_detached(&txn).await?;
        metrics::record_event_ingested(final_status.as_str());

        Ok(EventReceipt {
            transaction_id: txn.id,
            status: final_status,
        })
    }

    /// 以深度 1 提交定时任务产生的事件，在独立事务中处理并提交
    pub async fn submit_job_event(&self, event: InternalEvent) -> Result<Transaction> {
        let mut tx = self.pool.begin().await?;
        let txn = self
            .submit_internal(&mut tx, event, CascadeGuard::child_depth(0))
            .await?;
        tx.commit().await?;
        Ok(txn)
    }

    /// 在独立事务中执行规则；失败时回滚并把交易记为 FAILED
    async fn process_detached(&self, txn: &Transaction) -> Result<TransactionStatus> {
        let mut tx = self.pool.begin().await?;
        match self.processor.process_in_tx(&mut tx, txn, 0).await {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome.status)
            }
            Err(e) => {
                tx.rollback().await?;
                warn!(transaction_id = %txn.id, error = %e, "交易处理失败");
                let mut conn = self.pool.acquire().await?;
                TransactionRepository::finish_in_tx(&mut conn, txn.id, &failed_outcome(&e), Utc::now()).await?;
                Ok(TransactionStatus::Failed)
            }
        }
    }

    async fn reload(conn: &mut PgConnection, brand: &str, event_id: &str) -> Result<Transaction> {
        TransactionRepository::find_by_event_id_in_tx(conn, brand, event_id)
            .await?
            .ok_or_else(|| EngineError::Internal(format!("交易 {} 未找到", event_id)))
    }
}

#[async_trait]
impl InternalEventSink for IngestionGate {
    async fn submit_internal(
        &self,
        conn: &mut PgConnection,
        event: InternalEvent,
        depth: u32,
    ) -> Result<Transaction> {
        if let Some(existing) =
            TransactionRepository::find_by_event_id_in_tx(&mut *conn, &event.brand, &event.event_id).await?
        {
            return Ok(existing);
        }

        let new = NewTransaction {
            brand: event.brand,
            profile_id: event.profile_id,
            event_type: event.event_type,
            event_id: event.event_id,
            source: event.source.as_str().to_string(),
            payload: event.payload,
        };

        if self.guard.decide(depth) == CascadeDecision::Truncate {
            let outcome = ProcessOutcome {
                status: TransactionStatus::Processed,
                error_code: Some("CASCADE_DEPTH_EXCEEDED".to_string()),
                error_message: Some(format!(
                    "Internal event depth {} reached the limit of {}; rules not evaluated.",
                    depth,
                    self.guard.max_depth()
                )),
            };
            TransactionRepository::insert_if_absent_in_tx(&mut *conn, &new, &outcome, Some(Utc::now())).await?;
            metrics::record_cascade_truncated();
            metrics::record_event_ingested(TransactionStatus::Processed.as_str());
            info!(brand = %new.brand, event_id = %new.event_id, depth, "级联深度触顶，内部事件不执行规则");
            return Self::reload(conn, &new.brand, &new.event_id).await;
        }

        let inserted = TransactionRepository::insert_if_absent_in_tx(
            &mut *conn,
            &new,
            &ProcessOutcome::with_status(TransactionStatus::Pending),
            None,
        )
        .await?;
        let Some(txn) = inserted else {
            return Self::reload(conn, &new.brand, &new.event_id).await;
        };

        info!(
            brand = %txn.brand,
            profile_id = %txn.profile_id,
            event_type = %txn.event_type,
            transaction_id = %txn.id,
            depth,
            "提交内部事件"
        );

        let mut savepoint = conn.begin().await?;
        let processed = self.processor.process_in_tx(&mut savepoint, &txn, depth).await;
        let status = match processed {
            Ok(outcome) => {
                savepoint.commit().await?;
                outcome.status
            }
            Err(e) => {
                savepoint.rollback().await?;
                warn!(transaction_id = %txn.id, error = %e, "内部事件处理失败");
                TransactionRepository::finish_in_tx(&mut *conn, txn.id, &failed_outcome(&e), Utc::now()).await?;
                TransactionStatus::Failed
            }
        };
        metrics::record_event_ingested(status.as_str());

        Self::reload(conn, &txn.brand, &txn.event_id).await
    }
}

fn is_profile_event(event_type: &str) -> bool {
    let upper = event_type.trim().to_ascii_uppercase();
    PROFILE_EVENT_TYPES.contains(&upper.as_str())
}

fn missing_required_fields(submission: &EventSubmission) -> bool {
    [&submission.brand, &submission.profile_id, &submission.event_type]
        .iter()
        .any(|v| v.trim().is_empty())
}

fn failed_outcome(error: &EngineError) -> ProcessOutcome {
    ProcessOutcome {
        status: TransactionStatus::Failed,
        error_code: Some(error.error_code().to_string()),
        error_message: Some(error.to_string()),
    }
}
