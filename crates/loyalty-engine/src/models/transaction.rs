//! 交易与规则执行记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::enums::{ExecutionResult, TransactionStatus};

/// 一次被接收的事件
///
/// (brand, event_id) 唯一，重复提交返回同一条记录
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub brand: String,
    pub profile_id: String,
    pub event_type: String,
    pub event_id: String,
    pub source: Option<String>,
    pub payload: Option<Value>,
    pub status: TransactionStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// payload 为空时视为空对象
    pub fn payload_or_empty(&self) -> Value {
        self.payload
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }
}

/// 待写入的交易
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub brand: String,
    pub profile_id: String,
    pub event_type: String,
    pub event_id: String,
    pub source: String,
    pub payload: Value,
}

/// 规则执行审计
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RuleExecution {
    pub id: i64,
    pub transaction_id: Uuid,
    pub rule_id: Option<i64>,
    pub result: ExecutionResult,
    pub details: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// 交易处理结论，写回 transactions 表
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub status: TransactionStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl ProcessOutcome {
    pub fn with_status(status: TransactionStatus) -> Self {
        Self {
            status,
            error_code: None,
            error_message: None,
        }
    }

    pub fn no_rules() -> Self {
        Self {
            status: TransactionStatus::Processed,
            error_code: Some("NO_RULES".to_string()),
            error_message: Some("No active rules matched this event.".to_string()),
        }
    }
}
