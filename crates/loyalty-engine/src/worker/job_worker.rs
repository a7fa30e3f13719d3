//! 内部任务调度 Worker
//!
//! 每轮认领一批到期任务（`FOR UPDATE SKIP LOCKED` + 租约），逐个执行并写回结果：
//! - 成功：last_status = SUCCESS，next_run_at 按运行时刻重新计算
//! - 失败：last_status = FAILED 并记录错误，next_run_at 同样向后推进，避免紧密重试
//!
//! 没有认领到任务时按最早的到期时间休眠，范围 [1, max_sleep_seconds] 秒；
//! 没有任何待运行任务时休眠 idle_sleep_seconds。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loyalty_shared::config::SchedulerConfig;
use loyalty_shared::observability::metrics;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::models::{InternalJob, JobRunRecord, JobRunStats, JobRunStatus};
use crate::repository::JobRepositoryTrait;
use crate::scheduler::schedule::compute_next_run_at;

/// 任务执行接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &InternalJob, now: DateTime<Utc>) -> Result<JobRunStats>;
}

/// 内部任务调度 Worker
pub struct JobWorker {
    repo: Arc<dyn JobRepositoryTrait>,
    executor: Arc<dyn JobExecutor>,
    config: SchedulerConfig,
}

impl JobWorker {
    pub fn new(
        repo: Arc<dyn JobRepositoryTrait>,
        executor: Arc<dyn JobExecutor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            repo,
            executor,
            config,
        }
    }

    /// 主循环：直到 shutdown 变为 true（或发送端关闭）
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            lease_ttl_seconds = self.config.lease_ttl_seconds,
            idle_sleep_seconds = self.config.idle_sleep_seconds,
            max_sleep_seconds = self.config.max_sleep_seconds,
            "JobWorker 已启动"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let sleep_for = match self.tick(Utc::now()).await {
                Ok(sleep_for) => sleep_for,
                Err(e) => {
                    error!(error = %e, "任务调度出错");
                    Duration::from_secs(self.config.idle_sleep_seconds.max(1))
                }
            };

            // 记录 Worker 健康状态，供 Prometheus 告警判断 Worker 是否存活
            metrics::set_worker_last_run(&self.config.worker_id, Utc::now().timestamp() as f64);

            if sleep_for.is_zero() {
                continue;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }

        info!(worker_id = %self.config.worker_id, "JobWorker 已停止");
    }

    /// 执行一轮调度，返回下一轮之前的休眠时长
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Duration> {
        let jobs = self
            .repo
            .claim_due(
                &self.config.worker_id,
                now,
                self.config.batch_size,
                self.config.lease_ttl_seconds,
            )
            .await?;

        if jobs.is_empty() {
            let next_due = self
                .repo
                .next_due_at(now, self.config.lease_ttl_seconds)
                .await?;
            let sleep_for = idle_sleep(
                now,
                next_due,
                self.config.idle_sleep_seconds,
                self.config.max_sleep_seconds,
            );
            debug!(sleep_secs = sleep_for.as_secs(), next_due = ?next_due, "没有到期任务");
            return Ok(sleep_for);
        }

        for job in &jobs {
            match self.run_claimed(job).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(job_id = %job.id, worker_id = %self.config.worker_id, "任务锁已被其他 worker 重新认领，运行结果未写回");
                }
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "写回任务运行结果失败");
                }
            }
        }
        Ok(Duration::ZERO)
    }

    /// 执行一个已认领的任务并释放锁，返回锁是否仍由本 worker 持有
    async fn run_claimed(&self, job: &InternalJob) -> Result<bool> {
        let run_at = Utc::now();
        info!(job_id = %job.id, job_key = %job.job_key, brand = ?job.brand, "运行内部任务");

        let result = self.executor.execute(job, run_at).await;
        let (next_run_at, schedule_error) = match compute_next_run_at(run_at, job.schedule.as_ref()) {
            Ok(next) => (next, None),
            Err(e) => (None, Some(e.to_string())),
        };

        let record = match result {
            Ok(stats) => {
                info!(
                    job_id = %job.id,
                    processed = stats.processed,
                    created = stats.created,
                    idempotent_existing = stats.idempotent_existing,
                    failed = stats.failed,
                    next_run_at = ?next_run_at,
                    "内部任务运行成功"
                );
                JobRunRecord {
                    run_at,
                    status: JobRunStatus::Success,
                    error: schedule_error,
                    next_run_at,
                }
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, next_run_at = ?next_run_at, "内部任务运行失败");
                JobRunRecord {
                    run_at,
                    status: JobRunStatus::Failed,
                    error: Some(e.to_string()),
                    next_run_at,
                }
            }
        };

        metrics::record_job_run(record.status.as_str());
        self.repo
            .finish_run(job.id, &self.config.worker_id, &record)
            .await
    }
}

/// 空闲时的休眠时长
fn idle_sleep(
    now: DateTime<Utc>,
    next_due: Option<DateTime<Utc>>,
    idle_sleep_seconds: u64,
    max_sleep_seconds: u64,
) -> Duration {
    let delta = next_due.map(|due| (due - now).num_seconds()).unwrap_or(0);
    if delta > 0 {
        Duration::from_secs((delta as u64).clamp(1, max_sleep_seconds.max(1)))
    } else {
        Duration::from_secs(idle_sleep_seconds)
    }
}
