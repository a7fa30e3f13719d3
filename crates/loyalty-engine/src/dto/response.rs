//! 响应 DTO 定义

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Customer, InternalJob, JobRunStats};

/// 统一 API 响应格式
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

/// 删除结果
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedResponse {
    pub deleted: bool,
}

/// 预览样本中的客户
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCustomer {
    pub brand: String,
    pub profile_id: String,
}

impl From<&Customer> for TargetCustomer {
    fn from(customer: &Customer) -> Self {
        Self {
            brand: customer.brand.clone(),
            profile_id: customer.profile_id.clone(),
        }
    }
}

/// 任务预览：命中客户数与一页样本，不产生任何写入
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPreviewResponse {
    pub job_id: Uuid,
    pub job_key: String,
    pub brand: Option<String>,
    pub event_type: String,
    pub date: NaiveDate,
    pub count: i64,
    pub sample: Vec<TargetCustomer>,
}

/// 手动运行结果
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRunResponse {
    pub job_id: Uuid,
    pub job_key: String,
    pub brand: Option<String>,
    pub event_type: String,
    pub date: NaiveDate,
    pub target_customers: u64,
    pub created: u64,
    pub idempotent_existing: u64,
    pub failed: u64,
}

impl JobRunResponse {
    pub fn new(job: &InternalJob, date: NaiveDate, stats: JobRunStats) -> Self {
        Self {
            job_id: job.id,
            job_key: job.job_key.clone(),
            brand: job.brand.clone(),
            event_type: job.event_type.clone(),
            date,
            target_customers: stats.processed,
            created: stats.created,
            idempotent_existing: stats.idempotent_existing,
            failed: stats.failed,
        }
    }
}

/// 健康检查结果
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub database: &'static str,
}
