//! 后台 Worker

pub mod job_worker;

pub use job_worker::{JobExecutor, JobWorker};

#[cfg(test)]
pub use job_worker::MockJobExecutor;
