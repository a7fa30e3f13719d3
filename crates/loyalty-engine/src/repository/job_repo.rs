//! 定时任务仓储
//!
//! 认领使用显式事务包裹 `FOR UPDATE SKIP LOCKED`，多实例部署时各 worker 拿到互不重叠的任务集

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use super::traits::JobRepositoryTrait;
use crate::error::Result;
use crate::models::{InternalJob, JobRunRecord};

const JOB_COLUMNS: &str = "id, job_key, brand, event_type, selector, payload_template, active, schedule, \
     next_run_at, last_run_at, locked_at, locked_by, last_status, last_error, created_at, updated_at";

/// 待创建的任务
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_key: String,
    pub brand: String,
    pub event_type: String,
    pub selector: Value,
    pub payload_template: Option<Value>,
    pub active: bool,
    pub schedule: Option<Value>,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// 定时任务仓储
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, job: &NewJob) -> Result<InternalJob> {
        let sql = format!(
            r#"
            INSERT INTO internal_jobs (id, job_key, brand, event_type, selector, payload_template,
                                       active, schedule, next_run_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            JOB_COLUMNS
        );
        let created = sqlx::query_as::<_, InternalJob>(&sql)
            .bind(Uuid::now_v7())
            .bind(&job.job_key)
            .bind(&job.brand)
            .bind(&job.event_type)
            .bind(&job.selector)
            .bind(&job.payload_template)
            .bind(job.active)
            .bind(&job.schedule)
            .bind(job.next_run_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<InternalJob>> {
        let sql = format!("SELECT {} FROM internal_jobs WHERE id = $1", JOB_COLUMNS);
        let job = sqlx::query_as::<_, InternalJob>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(job)
    }

    /// 品牌下的任务，按创建时间倒序
    pub async fn list(&self, brand: &str, active: Option<bool>) -> Result<Vec<InternalJob>> {
        let sql = format!(
            r#"
            SELECT {} FROM internal_jobs
            WHERE brand = $1 AND ($2::BOOLEAN IS NULL OR active = $2)
            ORDER BY created_at DESC
            "#,
            JOB_COLUMNS
        );
        let jobs = sqlx::query_as::<_, InternalJob>(&sql)
            .bind(brand)
            .bind(active)
            .fetch_all(&self.pool)
            .await?;

        Ok(jobs)
    }

    /// 保存可编辑字段
    pub async fn save(&self, job: &InternalJob) -> Result<InternalJob> {
        let sql = format!(
            r#"
            UPDATE internal_jobs
            SET job_key = $2, event_type = $3, selector = $4, payload_template = $5,
                active = $6, schedule = $7, next_run_at = $8, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            JOB_COLUMNS
        );
        let saved = sqlx::query_as::<_, InternalJob>(&sql)
            .bind(job.id)
            .bind(&job.job_key)
            .bind(&job.event_type)
            .bind(&job.selector)
            .bind(&job.payload_template)
            .bind(job.active)
            .bind(&job.schedule)
            .bind(job.next_run_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(saved)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM internal_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 记录手动运行结果，不改动锁
    pub async fn record_run(&self, job_id: Uuid, record: &JobRunRecord) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE internal_jobs
            SET last_run_at = $2, last_status = $3, last_error = $4, next_run_at = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(record.run_at)
        .bind(record.status)
        .bind(&record.error)
        .bind(record.next_run_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl JobRepositoryTrait for JobRepository {
    async fn claim_due(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        batch_size: i64,
        lease_ttl_seconds: i64,
    ) -> Result<Vec<InternalJob>> {
        let lease_expired_before = now - Duration::seconds(lease_ttl_seconds);
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            SELECT {} FROM internal_jobs
            WHERE active = TRUE
              AND schedule IS NOT NULL
              AND next_run_at IS NOT NULL
              AND next_run_at <= $1
              AND (locked_at IS NULL OR locked_at < $2)
            ORDER BY next_run_at ASC
            LIMIT $3
            FOR UPDATE SKIP LOCKED
            "#,
            JOB_COLUMNS
        );
        let mut jobs = sqlx::query_as::<_, InternalJob>(&sql)
            .bind(now)
            .bind(lease_expired_before)
            .bind(batch_size)
            .fetch_all(&mut *tx)
            .await?;

        if jobs.is_empty() {
            tx.rollback().await?;
            return Ok(jobs);
        }

        let ids: Vec<Uuid> = jobs.iter().map(|j| j.id).collect();
        sqlx::query(
            r#"
            UPDATE internal_jobs
            SET locked_at = $2, locked_by = $3, updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .bind(now)
        .bind(worker_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        for job in &mut jobs {
            job.locked_at = Some(now);
            job.locked_by = Some(worker_id.to_string());
        }
        info!(count = jobs.len(), worker_id = %worker_id, "认领到期的内部任务");

        Ok(jobs)
    }

    async fn next_due_at(
        &self,
        now: DateTime<Utc>,
        lease_ttl_seconds: i64,
    ) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            r#"
            SELECT MIN(next_run_at) AS next_due
            FROM internal_jobs
            WHERE active = TRUE
              AND schedule IS NOT NULL
              AND next_run_at IS NOT NULL
              AND (locked_at IS NULL OR locked_at < $1)
            "#,
        )
        .bind(now - Duration::seconds(lease_ttl_seconds))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("next_due"))
    }

    async fn finish_run(&self, job_id: Uuid, worker_id: &str, record: &JobRunRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE internal_jobs
            SET locked_at = NULL, locked_by = NULL,
                last_run_at = $2, last_status = $3, last_error = $4, next_run_at = $5,
                updated_at = NOW()
            WHERE id = $1 AND locked_by = $6
            "#,
        )
        .bind(job_id)
        .bind(record.run_at)
        .bind(record.status)
        .bind(&record.error)
        .bind(record.next_run_at)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
