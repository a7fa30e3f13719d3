//! 交易仓储
//!
//! 交易行与规则执行审计行的读写

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{ExecutionResult, NewTransaction, ProcessOutcome, RuleExecution, Transaction, TransactionStatus};

const TRANSACTION_COLUMNS: &str = "id, brand, profile_id, event_type, event_id, source, payload, status, \
     error_code, error_message, created_at, processed_at";

/// 交易仓储
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        let sql = format!("SELECT {} FROM transactions WHERE id = $1", TRANSACTION_COLUMNS);
        let txn = sqlx::query_as::<_, Transaction>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(txn)
    }

    pub async fn find_by_event_id(&self, brand: &str, event_id: &str) -> Result<Option<Transaction>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_by_event_id_in_tx(&mut conn, brand, event_id).await
    }

    /// 在事务中按幂等键 (brand, event_id) 查询
    pub async fn find_by_event_id_in_tx(
        conn: &mut PgConnection,
        brand: &str,
        event_id: &str,
    ) -> Result<Option<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE brand = $1 AND event_id = $2",
            TRANSACTION_COLUMNS
        );
        let txn = sqlx::query_as::<_, Transaction>(&sql)
            .bind(brand)
            .bind(event_id)
            .fetch_optional(conn)
            .await?;

        Ok(txn)
    }

    /// 插入交易；(brand, event_id) 已存在时返回 None
    pub async fn insert_if_absent_in_tx(
        conn: &mut PgConnection,
        new: &NewTransaction,
        outcome: &ProcessOutcome,
        processed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Transaction>> {
        let sql = format!(
            r#"
            INSERT INTO transactions (id, brand, profile_id, event_type, event_id, source, payload,
                                      status, error_code, error_message, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (brand, event_id) DO NOTHING
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        );
        let txn = sqlx::query_as::<_, Transaction>(&sql)
            .bind(Uuid::now_v7())
            .bind(&new.brand)
            .bind(&new.profile_id)
            .bind(&new.event_type)
            .bind(&new.event_id)
            .bind(&new.source)
            .bind(&new.payload)
            .bind(outcome.status)
            .bind(&outcome.error_code)
            .bind(&outcome.error_message)
            .bind(processed_at)
            .fetch_optional(conn)
            .await?;

        Ok(txn)
    }

    /// 写回处理结论
    ///
    /// 只更新仍为 PENDING 的交易，保证状态只向前流转
    pub async fn finish_in_tx(
        conn: &mut PgConnection,
        id: Uuid,
        outcome: &ProcessOutcome,
        processed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2, error_code = $3, error_message = $4, processed_at = $5
            WHERE id = $1 AND status = $6
            "#,
        )
        .bind(id)
        .bind(outcome.status)
        .bind(&outcome.error_code)
        .bind(&outcome.error_message)
        .bind(processed_at)
        .bind(TransactionStatus::Pending)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 记录一条规则执行审计
    pub async fn record_execution_in_tx(
        conn: &mut PgConnection,
        transaction_id: Uuid,
        rule_id: i64,
        result: ExecutionResult,
        details: &Value,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO transaction_rule_executions (transaction_id, rule_id, result, details)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(transaction_id)
        .bind(rule_id)
        .bind(result)
        .bind(details)
        .fetch_one(conn)
        .await?;

        Ok(row.get("id"))
    }

    /// 交易的规则执行记录，按执行顺序
    pub async fn list_executions(&self, transaction_id: Uuid) -> Result<Vec<RuleExecution>> {
        let executions = sqlx::query_as::<_, RuleExecution>(
            r#"
            SELECT id, transaction_id, rule_id, result, details, created_at
            FROM transaction_rule_executions
            WHERE transaction_id = $1
            ORDER BY id
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(executions)
    }
}
