//! 任务执行
//!
//! 单次运行：解析选择器，选出品牌下的目标客户，按当前 cron 时间桶为每位客户
//! 构造确定性的事件 ID 并提交到接收入口。同一时间桶重复运行只会命中幂等分支。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_shared::observability::metrics;
use tracing::{info, instrument, warn};

use crate::cascade::InternalEvent;
use crate::error::Result;
use crate::models::{InternalJob, JobRunStats, TransactionSource};
use crate::repository::{CustomerRepository, TransactionRepository};
use crate::scheduler::schedule::{job_event_id, run_bucket_key};
use crate::scheduler::selector::Selector;
use crate::service::IngestionGate;
use crate::worker::JobExecutor;

/// 任务执行器
pub struct JobRunner {
    customers: Arc<CustomerRepository>,
    transactions: Arc<TransactionRepository>,
    gate: Arc<IngestionGate>,
}

impl JobRunner {
    pub fn new(
        customers: Arc<CustomerRepository>,
        transactions: Arc<TransactionRepository>,
        gate: Arc<IngestionGate>,
    ) -> Self {
        Self {
            customers,
            transactions,
            gate,
        }
    }

    /// 执行一次任务
    ///
    /// 单个客户的提交失败只计入 failed，不中断本批次
    #[instrument(skip(self, job), fields(job_id = %job.id, job_key = %job.job_key))]
    pub async fn run_job_once(&self, job: &InternalJob, now: DateTime<Utc>) -> Result<JobRunStats> {
        let selector = Selector::parse(&job.selector)?;
        let bucket_key = run_bucket_key(now, job.schedule.as_ref())?;
        let targets = self
            .customers
            .find_by_selector(job.brand.as_deref(), &selector, now, None)
            .await?;

        let payload = job.event_payload();
        let mut stats = JobRunStats::default();

        for customer in &targets {
            stats.processed += 1;
            let event_id = job_event_id(&job.id, &bucket_key, &customer.brand, &customer.profile_id);

            if self
                .transactions
                .find_by_event_id(&customer.brand, &event_id)
                .await?
                .is_some()
            {
                stats.idempotent_existing += 1;
                continue;
            }

            let event = InternalEvent {
                brand: customer.brand.clone(),
                profile_id: customer.profile_id.clone(),
                event_type: job.event_type.clone(),
                event_id,
                source: TransactionSource::InternalJob,
                payload: payload.clone(),
            };
            match self.gate.submit_job_event(event).await {
                Ok(_) => stats.created += 1,
                Err(e) => {
                    warn!(profile_id = %customer.profile_id, error = %e, "任务事件提交失败");
                    stats.failed += 1;
                }
            }
        }

        metrics::record_job_events("created", stats.created);
        metrics::record_job_events("existing", stats.idempotent_existing);
        metrics::record_job_events("failed", stats.failed);

        info!(
            bucket_key = %bucket_key,
            processed = stats.processed,
            created = stats.created,
            idempotent_existing = stats.idempotent_existing,
            failed = stats.failed,
            "任务运行完成"
        );

        Ok(stats)
    }
}

#[async_trait]
impl JobExecutor for JobRunner {
    async fn execute(&self, job: &InternalJob, now: DateTime<Utc>) -> Result<JobRunStats> {
        self.run_job_once(job, now).await
    }
}
