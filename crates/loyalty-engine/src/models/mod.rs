//! 积分引擎领域模型

pub mod bonus;
pub mod customer;
pub mod enums;
pub mod job;
pub mod reward;
pub mod rule;
pub mod tier;
pub mod transaction;

pub use bonus::{AwardPolicy, BonusAward, BonusDefinition};
pub use customer::{Customer, UNCONFIGURED_TIER};
pub use enums::{
    CustomerRewardStatus, EventOrigin, ExecutionResult, JobRunStatus, MovementType,
    TierChangeReason, TierDirection, TransactionSource, TransactionStatus,
};
pub use job::{InternalJob, JobRunRecord, JobRunStats};
pub use reward::{CustomerReward, Reward};
pub use rule::Rule;
pub use tier::{LoyaltyTier, resolve_tier, tier_below, validate_catalog};
pub use transaction::{NewTransaction, ProcessOutcome, RuleExecution, Transaction};
