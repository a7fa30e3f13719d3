//! 内部任务调度
//!
//! - `selector`: 目标客户选择器
//! - `schedule`: cron 调度计算与运行时间桶
//! - `runner`: 单次运行，为每位目标客户提交一条内部事件
//! - `job_service`: 任务的增删改查、预览与手动运行

pub mod job_service;
pub mod runner;
pub mod schedule;
pub mod selector;

pub use job_service::JobService;
pub use runner::JobRunner;
pub use schedule::{JobSchedule, compute_next_run_at, job_event_id, run_bucket_key};
pub use selector::Selector;
