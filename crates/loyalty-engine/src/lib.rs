//! 积分引擎
//!
//! 接收客户事件，按品牌配置的规则执行积分、奖励与等级动作，并由定时任务产生内部事件。
//!
//! ## 处理链路
//!
//! 事件 → `service::IngestionGate`（幂等、拦截、落库）→ `service::RuleProcessor`
//! （逐条规则，保存点隔离）→ `service::ActionExecutor` → 积分流水与等级重算，
//! 等级变化再经 `cascade::InternalEventSink` 以内部事件回到接收入口，深度受 `cascade::CascadeGuard` 限制。
//!
//! ## 模块结构
//!
//! - `cascade`: 级联深度控制与内部事件接口
//! - `dto`: 请求和响应的数据传输对象
//! - `error`: 错误类型定义
//! - `handlers` / `routes` / `state`: HTTP 接口
//! - `models`: 领域模型
//! - `repository`: 数据访问层
//! - `scheduler`: 内部任务的选择器、调度计算、执行与管理
//! - `service`: 事件处理管线
//! - `worker`: 后台调度 Worker

pub mod cascade;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod routes;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod worker;

pub use error::{EngineError, ErrorKind, Result};
