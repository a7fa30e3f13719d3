//! 服务层
//!
//! 事件处理管线的业务逻辑，自底向上：
//!
//! - `ledger`: 积分流水与余额
//! - `tier_service`: 等级重算与等级事件
//! - `bonus_service`: 按周期去重的奖励台账
//! - `fact_loader`: 条件求值前的数据库事实预取
//! - `action_executor`: 动作目录的执行
//! - `rule_processor`: 规则逐条执行与保存点隔离
//! - `ingestion`: 事件接收入口与内部事件提交

pub mod action_executor;
pub mod bonus_service;
pub mod fact_loader;
pub mod ingestion;
pub mod ledger;
pub mod rule_processor;
pub mod tier_service;

pub use action_executor::ActionExecutor;
pub use bonus_service::BonusLedger;
pub use fact_loader::FactLoader;
pub use ingestion::{EventReceipt, EventSubmission, IngestionGate};
pub use ledger::{EarnResult, LedgerContext, PointsLedger};
pub use rule_processor::RuleProcessor;
pub use tier_service::{TierChange, TierResolver};
