//! 级联控制模块
//!
//! 等级变化与定时任务会产生内部事件，内部事件再次进入接收入口并触发规则，
//! 规则又可能改变等级，形成递归。深度作为显式参数沿调用链传递：
//! 外部事件深度为 0，每产生一层内部事件深度加 1，达到上限时交易直接记为 PROCESSED 而不执行规则。
//!
//! ## 核心组件
//!
//! - `InternalEventSink` - 内部事件提交接口 trait，用于解耦等级服务与接收入口的循环依赖
//! - `InternalEvent` - 待提交的内部事件
//! - `CascadeGuard` - 深度判定

mod guard;

pub use guard::{CascadeDecision, CascadeGuard, InternalEvent, InternalEventSink, MAX_CASCADE_DEPTH};
