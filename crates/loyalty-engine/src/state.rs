//! 应用状态定义
//!
//! 组装事件处理管线与任务管理服务，供 HTTP 路由和调度 Worker 共享

use std::sync::Arc;

use sqlx::PgPool;

use crate::cascade::CascadeGuard;
use crate::repository::{
    CustomerRepository, EventTypeRepository, JobRepository, TransactionRepository,
};
use crate::scheduler::{JobRunner, JobService};
use crate::service::{
    ActionExecutor, BonusLedger, FactLoader, IngestionGate, PointsLedger, RuleProcessor,
    TierResolver,
};

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL 连接池
    pub pool: PgPool,
    /// 事件接收入口
    pub gate: Arc<IngestionGate>,
    pub ledger: Arc<PointsLedger>,
    /// 任务执行器，同时供调度 Worker 使用
    pub runner: Arc<JobRunner>,
    pub jobs: Arc<JobService>,
    /// 调度 Worker 使用的任务仓储
    pub job_repo: Arc<JobRepository>,
}

impl AppState {
    /// 按依赖顺序组装全部服务
    pub async fn build(pool: PgPool) -> Self {
        let tier_resolver = Arc::new(TierResolver::new());
        let ledger = Arc::new(PointsLedger::new(pool.clone(), tier_resolver.clone()));
        let bonus_ledger = BonusLedger::new();
        let executor = Arc::new(ActionExecutor::new(ledger.clone(), bonus_ledger));
        let processor = Arc::new(RuleProcessor::new(executor, FactLoader::new(bonus_ledger)));
        let gate = Arc::new(IngestionGate::new(
            pool.clone(),
            processor,
            CascadeGuard::default(),
        ));

        // 互相注入：打破循环依赖
        tier_resolver.set_event_sink(gate.clone()).await;

        let customers = Arc::new(CustomerRepository::new(pool.clone()));
        let transactions = Arc::new(TransactionRepository::new(pool.clone()));
        let event_types = Arc::new(EventTypeRepository::new(pool.clone()));
        let job_repo = Arc::new(JobRepository::new(pool.clone()));

        let runner = Arc::new(JobRunner::new(customers.clone(), transactions, gate.clone()));
        let jobs = Arc::new(JobService::new(
            job_repo.clone(),
            customers,
            event_types,
            runner.clone(),
        ));

        Self {
            pool,
            gate,
            ledger,
            runner,
            jobs,
            job_repo,
        }
    }
}
