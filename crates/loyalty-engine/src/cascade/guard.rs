//! 级联深度控制

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgConnection;

use crate::error::Result;
use crate::models::{Transaction, TransactionSource};

/// 内部事件链的最大深度
pub const MAX_CASCADE_DEPTH: u32 = 3;

/// 待提交的内部事件
#[derive(Debug, Clone)]
pub struct InternalEvent {
    pub brand: String,
    pub profile_id: String,
    pub event_type: String,
    pub event_id: String,
    pub source: TransactionSource,
    pub payload: Value,
}

/// 内部事件提交接口
///
/// 接收入口实现此 trait，等级服务通过 trait 提交等级变化事件。
/// 事件与触发它的规则共享同一连接，规则回滚时内部事件一并回滚。
#[async_trait]
pub trait InternalEventSink: Send + Sync {
    /// 提交内部事件
    ///
    /// # Arguments
    /// * `conn` - 触发方持有的连接（处于事务或保存点中）
    /// * `event` - 内部事件
    /// * `depth` - 新事件自身的深度（父事件深度 + 1）
    async fn submit_internal(
        &self,
        conn: &mut PgConnection,
        event: InternalEvent,
        depth: u32,
    ) -> Result<Transaction>;
}

/// 深度判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeDecision {
    /// 正常执行规则
    Process,
    /// 已达上限，记为 PROCESSED 且不执行规则
    Truncate,
}

/// 深度判定
#[derive(Debug, Clone, Copy)]
pub struct CascadeGuard {
    max_depth: u32,
}

impl Default for CascadeGuard {
    fn default() -> Self {
        Self {
            max_depth: MAX_CASCADE_DEPTH,
        }
    }
}

impl CascadeGuard {
    pub fn new(max_depth: u32) -> Self {
        Self { max_depth }
    }

    /// 子事件深度
    pub fn child_depth(parent_depth: u32) -> u32 {
        parent_depth.saturating_add(1)
    }

    pub fn decide(&self, depth: u32) -> CascadeDecision {
        if depth >= self.max_depth {
            CascadeDecision::Truncate
        } else {
            CascadeDecision::Process
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }
}
