//! 请求 DTO 定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use validator::Validate;

use crate::models::TransactionSource;
use crate::scheduler::schedule::JobSchedule;

/// 提交事件请求
///
/// brand / profileId / eventType 缺失时不在此处拒绝，由接收入口记为 BLOCKED
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitEventRequest {
    /// 缺省时取 X-Brand 请求头
    pub brand: Option<String>,
    #[serde(default)]
    pub profile_id: String,
    #[serde(default)]
    pub event_type: String,
    #[validate(length(min = 1, max = 200, message = "eventId 长度必须在1-200个字符之间"))]
    pub event_id: String,
    pub source: Option<TransactionSource>,
    pub payload: Option<Value>,
}

/// 创建内部任务请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInternalJobRequest {
    #[validate(length(min = 1, max = 100, message = "jobKey 长度必须在1-100个字符之间"))]
    pub job_key: String,
    pub brand: Option<String>,
    #[validate(length(min = 1, max = 100, message = "eventType 长度必须在1-100个字符之间"))]
    pub event_type: String,
    #[serde(default = "empty_object")]
    pub selector: Value,
    pub payload_template: Option<Value>,
    #[serde(default = "default_true")]
    pub active: bool,
    pub schedule: Option<JobSchedule>,
    pub first_run_at: Option<DateTime<Utc>>,
    #[validate(range(min = 0, max = 315_360_000, message = "startInSeconds 必须在0-315360000之间"))]
    pub start_in_seconds: Option<i64>,
}

/// 更新内部任务请求
///
/// 只修改请求中出现的字段；schedule 与 payloadTemplate 显式传 null 表示清空
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInternalJobRequest {
    #[validate(length(min = 1, max = 100, message = "jobKey 长度必须在1-100个字符之间"))]
    pub job_key: Option<String>,
    pub brand: Option<String>,
    #[validate(length(min = 1, max = 100, message = "eventType 长度必须在1-100个字符之间"))]
    pub event_type: Option<String>,
    pub selector: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub payload_template: Option<Option<Value>>,
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub schedule: Option<Option<JobSchedule>>,
    pub first_run_at: Option<DateTime<Utc>>,
    #[validate(range(min = 0, max = 315_360_000, message = "startInSeconds 必须在0-315360000之间"))]
    pub start_in_seconds: Option<i64>,
}

impl UpdateInternalJobRequest {
    /// 是否涉及调度时间的重新计算
    pub fn touches_schedule(&self) -> bool {
        self.schedule.is_some()
            || self.active.is_some()
            || self.first_run_at.is_some()
            || self.start_in_seconds.is_some()
    }
}

/// 任务列表查询参数
#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub active: Option<bool>,
}

/// 任务预览参数
#[derive(Debug, Default, Deserialize)]
pub struct PreviewQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PreviewQuery {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    /// 规范化分页参数：limit 限制在 1..=200，offset 不小于 0
    pub fn page(&self) -> (i64, i64) {
        let limit = self
            .limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

fn default_true() -> bool {
    true
}

/// 字段出现即为 Some，值为 null 时为 Some(None)
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
