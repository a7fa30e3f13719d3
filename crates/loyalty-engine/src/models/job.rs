//! 内部定时任务

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 定时任务：按选择器选出客户，为每位客户发出一条内部事件
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InternalJob {
    pub id: Uuid,
    pub job_key: String,
    pub brand: Option<String>,
    pub event_type: String,
    pub selector: Value,
    pub payload_template: Option<Value>,
    pub active: bool,
    /// `{"type": "cron", "cron": "0 9 * * *", "timezone": "UTC"}`
    pub schedule: Option<Value>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub last_status: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InternalJob {
    /// 事件 payload，未配置模板时为空对象
    pub fn event_payload(&self) -> Value {
        match &self.payload_template {
            Some(Value::Null) | None => Value::Object(Default::default()),
            Some(template) => template.clone(),
        }
    }
}

/// 单次运行统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRunStats {
    /// 选中的客户数
    pub processed: u64,
    /// 新建的交易数
    pub created: u64,
    /// 同一时间桶内已存在的交易数
    pub idempotent_existing: u64,
    pub failed: u64,
}

/// 任务运行结果，由 worker 或手动触发写回任务行
#[derive(Debug, Clone, PartialEq)]
pub struct JobRunRecord {
    pub run_at: DateTime<Utc>,
    pub status: super::enums::JobRunStatus,
    pub error: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
pub(crate) fn sample_job() -> InternalJob {
    let now = Utc::now();
    InternalJob {
        id: Uuid::new_v4(),
        job_key: "BIRTHDAY".into(),
        brand: Some("acme".into()),
        event_type: "BIRTHDAY_TICK".into(),
        selector: serde_json::json!({"birthdate_today": true}),
        payload_template: None,
        active: true,
        schedule: Some(serde_json::json!({"type": "cron", "cron": "0 9 * * *", "timezone": "UTC"})),
        next_run_at: Some(now),
        last_run_at: None,
        locked_at: None,
        locked_by: None,
        last_status: None,
        last_error: None,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_payload_defaults_to_empty_object() {
        let mut job = sample_job();
        assert_eq!(job.event_payload(), json!({}));

        job.payload_template = Some(json!({"campaign": "spring"}));
        assert_eq!(job.event_payload(), json!({"campaign": "spring"}));
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let stats = JobRunStats {
            processed: 3,
            created: 2,
            idempotent_existing: 1,
            failed: 0,
        };
        let value = serde_json::to_value(stats).unwrap();
        assert_eq!(value["idempotentExisting"], 1);
    }
}
