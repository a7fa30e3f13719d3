//! 数据访问层
//!
//! 每个仓储同时提供基于连接池的方法和 `*_in_tx` 关联函数；
//! 后者接收调用方持有的连接，使规则动作、等级重算与级联事件落在同一事务（或保存点）中。

mod bonus_repo;
mod customer_repo;
mod event_type_repo;
mod job_repo;
mod movement_repo;
mod reward_repo;
mod rule_repo;
mod tag_repo;
mod tier_repo;
mod transaction_repo;
pub mod traits;

pub use bonus_repo::BonusRepository;
pub use customer_repo::CustomerRepository;
pub use event_type_repo::EventTypeRepository;
pub use job_repo::{JobRepository, NewJob};
pub use movement_repo::{PointMovementRepository, earn_expiry};
pub use reward_repo::RewardRepository;
pub use rule_repo::RuleRepository;
pub use tag_repo::TagRepository;
pub use tier_repo::TierRepository;
pub use traits::JobRepositoryTrait;
pub use transaction_repo::TransactionRepository;

#[cfg(test)]
pub use traits::MockJobRepositoryTrait;
