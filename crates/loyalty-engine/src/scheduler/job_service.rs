//! 内部任务管理
//!
//! 任务按品牌隔离：调用方只能看到、修改本品牌的任务，其他品牌的任务一律视为不存在。
//! 任务的事件类型必须是该品牌启用的 INTERNAL 事件类型。
//!
//! ## 下一次运行时间
//!
//! 仅当任务启用且配置了调度时才有 next_run_at，优先级：
//! firstRunAt > now + startInSeconds > 已有的 next_run_at > 调度的下一个触发时刻

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use loyalty_shared::observability::metrics;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dto::{
    CreateInternalJobRequest, JobPreviewResponse, JobRunResponse, ListJobsQuery, PreviewQuery,
    TargetCustomer, UpdateInternalJobRequest,
};
use crate::error::{EngineError, Result};
use crate::models::{EventOrigin, InternalJob, JobRunRecord, JobRunStatus};
use crate::repository::{CustomerRepository, EventTypeRepository, JobRepository, NewJob};
use crate::scheduler::runner::JobRunner;
use crate::scheduler::schedule::{JobSchedule, compute_next_run_at};
use crate::scheduler::selector::Selector;

/// 内部任务管理服务
pub struct JobService {
    jobs: Arc<JobRepository>,
    customers: Arc<CustomerRepository>,
    event_types: Arc<EventTypeRepository>,
    runner: Arc<JobRunner>,
}

impl JobService {
    pub fn new(
        jobs: Arc<JobRepository>,
        customers: Arc<CustomerRepository>,
        event_types: Arc<EventTypeRepository>,
        runner: Arc<JobRunner>,
    ) -> Self {
        Self {
            jobs,
            customers,
            event_types,
            runner,
        }
    }

    pub async fn list_jobs(&self, brand: &str, query: &ListJobsQuery) -> Result<Vec<InternalJob>> {
        self.jobs.list(brand, query.active).await
    }

    /// 读取本品牌的任务
    pub async fn get_job(&self, brand: &str, id: Uuid) -> Result<InternalJob> {
        self.jobs
            .get(id)
            .await?
            .filter(|job| job.brand.as_deref() == Some(brand))
            .ok_or_else(|| EngineError::JobNotFound(id.to_string()))
    }

    pub async fn create_job(
        &self,
        brand: &str,
        req: CreateInternalJobRequest,
        now: DateTime<Utc>,
    ) -> Result<InternalJob> {
        ensure_same_brand(req.brand.as_deref(), brand)?;
        let event_type = req.event_type.trim().to_string();
        self.ensure_internal_event_type(brand, &event_type).await?;
        Selector::parse(&req.selector)?;
        let schedule = schedule_value(req.schedule.as_ref())?;

        let next_run_at = next_run_at(
            req.active,
            schedule.as_ref(),
            req.first_run_at,
            req.start_in_seconds,
            None,
            now,
        )?;

        let job = self
            .jobs
            .create(&NewJob {
                job_key: req.job_key.trim().to_string(),
                brand: brand.to_string(),
                event_type,
                selector: req.selector,
                payload_template: req.payload_template,
                active: req.active,
                schedule,
                next_run_at,
            })
            .await?;

        info!(job_id = %job.id, job_key = %job.job_key, brand = %brand, next_run_at = ?job.next_run_at, "内部任务已创建");
        Ok(job)
    }

    /// 部分更新：只修改请求中出现的字段
    pub async fn update_job(
        &self,
        brand: &str,
        id: Uuid,
        req: UpdateInternalJobRequest,
        now: DateTime<Utc>,
    ) -> Result<InternalJob> {
        let mut job = self.get_job(brand, id).await?;
        ensure_same_brand(req.brand.as_deref(), brand)?;
        let reschedule = req.touches_schedule();

        if let Some(job_key) = req.job_key {
            job.job_key = job_key.trim().to_string();
        }
        if let Some(event_type) = req.event_type {
            let event_type = event_type.trim().to_string();
            self.ensure_internal_event_type(brand, &event_type).await?;
            job.event_type = event_type;
        }
        if let Some(selector) = req.selector {
            Selector::parse(&selector)?;
            job.selector = selector;
        }
        if let Some(payload_template) = req.payload_template {
            job.payload_template = payload_template;
        }
        if let Some(active) = req.active {
            job.active = active;
        }
        if let Some(schedule) = req.schedule {
            job.schedule = schedule_value(schedule.as_ref())?;
        }

        if reschedule {
            job.next_run_at = next_run_at(
                job.active,
                job.schedule.as_ref(),
                req.first_run_at,
                req.start_in_seconds,
                job.next_run_at,
                now,
            )?;
        }

        let saved = self.jobs.save(&job).await?;
        info!(job_id = %saved.id, active = saved.active, next_run_at = ?saved.next_run_at, "内部任务已更新");
        Ok(saved)
    }

    pub async fn delete_job(&self, brand: &str, id: Uuid) -> Result<bool> {
        let job = self.get_job(brand, id).await?;
        let deleted = self.jobs.delete(job.id).await?;
        info!(job_id = %id, deleted, "内部任务已删除");
        Ok(deleted)
    }

    /// 预览任务当前会命中的客户，不产生任何写入
    ///
    /// 样本按客户创建时间倒序分页
    pub async fn preview_job(
        &self,
        brand: &str,
        id: Uuid,
        query: &PreviewQuery,
        now: DateTime<Utc>,
    ) -> Result<JobPreviewResponse> {
        let job = self.get_job(brand, id).await?;
        ensure_active(&job)?;
        let selector = Selector::parse(&job.selector)?;
        let (limit, offset) = query.page();

        let count = self
            .customers
            .count_by_selector(job.brand.as_deref(), &selector, now)
            .await?;
        let sample = self
            .customers
            .find_by_selector(job.brand.as_deref(), &selector, now, Some((limit, offset)))
            .await?;

        Ok(JobPreviewResponse {
            job_id: job.id,
            job_key: job.job_key,
            brand: job.brand,
            event_type: job.event_type,
            date: now.date_naive(),
            count,
            sample: sample.iter().map(TargetCustomer::from).collect(),
        })
    }

    /// 立即运行一次
    ///
    /// 无论成功与否都写回 last_run_at 与下一次运行时间；运行失败时记录错误后原样返回
    pub async fn run_job_now(&self, brand: &str, id: Uuid, now: DateTime<Utc>) -> Result<JobRunResponse> {
        let job = self.get_job(brand, id).await?;
        ensure_active(&job)?;

        let result = self.runner.run_job_once(&job, now).await;

        let (next_run_at, schedule_error) = match compute_next_run_at(now, job.schedule.as_ref()) {
            Ok(next) => (next, None),
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "无法计算下一次运行时间");
                (None, Some(e.to_string()))
            }
        };
        let record = match &result {
            Ok(_) => JobRunRecord {
                run_at: now,
                status: JobRunStatus::Success,
                error: schedule_error,
                next_run_at,
            },
            Err(e) => JobRunRecord {
                run_at: now,
                status: JobRunStatus::Failed,
                error: Some(e.to_string()),
                next_run_at,
            },
        };
        self.jobs.record_run(job.id, &record).await?;
        metrics::record_job_run(record.status.as_str());

        let stats = result?;
        Ok(JobRunResponse::new(&job, now.date_naive(), stats))
    }

    async fn ensure_internal_event_type(&self, brand: &str, event_type: &str) -> Result<()> {
        if self
            .event_types
            .is_active(brand, event_type, EventOrigin::Internal)
            .await?
        {
            Ok(())
        } else {
            Err(EngineError::EventTypeNotInternal(event_type.to_string()))
        }
    }
}

/// 请求体中的品牌只能与调用方品牌一致
fn ensure_same_brand(payload: Option<&str>, caller: &str) -> Result<()> {
    match payload.map(str::trim).filter(|b| !b.is_empty()) {
        Some(b) if b != caller => Err(EngineError::BrandMismatch {
            payload: b.to_string(),
            caller: caller.to_string(),
        }),
        _ => Ok(()),
    }
}

fn ensure_active(job: &InternalJob) -> Result<()> {
    if job.active {
        Ok(())
    } else {
        Err(EngineError::JobInactive(job.id.to_string()))
    }
}

/// 校验调度配置并转为存储格式
fn schedule_value(schedule: Option<&JobSchedule>) -> Result<Option<Value>> {
    match schedule {
        Some(schedule) => {
            schedule.compile()?;
            Ok(Some(schedule.to_value()))
        }
        None => Ok(None),
    }
}

fn next_run_at(
    active: bool,
    schedule: Option<&Value>,
    first_run_at: Option<DateTime<Utc>>,
    start_in_seconds: Option<i64>,
    existing: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    if !active || schedule.is_none() {
        return Ok(None);
    }
    if let Some(at) = first_run_at {
        return Ok(Some(at));
    }
    if let Some(secs) = start_in_seconds {
        let at = Duration::try_seconds(secs)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| EngineError::Validation(format!("startInSeconds 超出范围: {}", secs)))?;
        return Ok(Some(at));
    }
    if existing.is_some() {
        return Ok(existing);
    }
    compute_next_run_at(now, schedule)
}
