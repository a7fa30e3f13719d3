//! 仓储 Trait 定义
//!
//! 调度 worker 依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{InternalJob, JobRunRecord};

/// 定时任务仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobRepositoryTrait: Send + Sync {
    /// 认领到期任务：跳过其他 worker 已锁定的行，并写入 locked_at / locked_by
    ///
    /// 锁早于 now - lease_ttl_seconds 视为过期，可被任意 worker 重新认领
    async fn claim_due(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        batch_size: i64,
        lease_ttl_seconds: i64,
    ) -> Result<Vec<InternalJob>>;

    /// 最早的下一次到期时间（不含租约未过期的任务）
    async fn next_due_at(
        &self,
        now: DateTime<Utc>,
        lease_ttl_seconds: i64,
    ) -> Result<Option<DateTime<Utc>>>;

    /// 写回运行结果并释放锁
    ///
    /// 仅当锁仍由 worker_id 持有时生效；租约过期后被其他 worker 重新认领则返回 false
    async fn finish_run(&self, job_id: Uuid, worker_id: &str, record: &JobRunRecord) -> Result<bool>;
}
