//! 规则处理器
//!
//! 对一笔 PENDING 交易按 (priority, id) 顺序执行品牌与事件类型下的全部启用规则：
//!
//! 1. 条件与动作先解析为封闭类型，解析失败的规则记为 FAILED，不产生任何副作用
//! 2. 条件未命中或没有动作记为 SKIPPED
//! 3. 命中的规则在独立保存点中执行全部动作，成功则释放保存点记为 SUCCESS，
//!    任一动作失败则回滚保存点记为 FAILED，继续下一条规则
//!
//! 任一规则 FAILED 时交易为 PROCESSED_WITH_ERRORS，否则为 PROCESSED。
//! 客户不存在等引擎级错误直接向上返回，由接收入口把整笔交易记为 FAILED。

use std::sync::Arc;

use chrono::Utc;
use loyalty_shared::observability::metrics;
use rule_engine::{ActionSpec, ConditionEvaluator, ConditionNode, EvaluationContext, parse_actions};
use serde_json::{Value, json};
use sqlx::{Connection, PgConnection};
use tracing::{debug, info, instrument, warn};

use crate::error::{EngineError, Result};
use crate::models::{Customer, ExecutionResult, ProcessOutcome, Rule, Transaction, TransactionStatus};
use crate::repository::{CustomerRepository, RuleRepository, TransactionRepository};
use crate::service::action_executor::ActionExecutor;
use crate::service::fact_loader::FactLoader;

/// 规则处理器
pub struct RuleProcessor {
    executor: Arc<ActionExecutor>,
    fact_loader: FactLoader,
}

/// 单条规则的执行结论
struct RuleVerdict {
    result: ExecutionResult,
    details: Value,
}

impl RuleVerdict {
    fn skipped(details: Value) -> Self {
        Self {
            result: ExecutionResult::Skipped,
            details,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            result: ExecutionResult::Failed,
            details: json!({"error": message}),
        }
    }
}

impl RuleProcessor {
    pub fn new(executor: Arc<ActionExecutor>, fact_loader: FactLoader) -> Self {
        Self {
            executor,
            fact_loader,
        }
    }

    /// 处理交易并写回结论
    ///
    /// # Arguments
    /// * `conn` - 接收入口持有的连接（事务或保存点）
    /// * `depth` - 交易的级联深度
    #[instrument(skip(self, conn, transaction), fields(transaction_id = %transaction.id, event_type = %transaction.event_type))]
    pub async fn process_in_tx(
        &self,
        conn: &mut PgConnection,
        transaction: &Transaction,
        depth: u32,
    ) -> Result<ProcessOutcome> {
        let now = Utc::now();

        let customer = self.load_customer(&mut *conn, transaction).await?;
        let rules = RuleRepository::list_active_in_tx(&mut *conn, &transaction.brand, &transaction.event_type).await?;

        let outcome = if rules.is_empty() {
            debug!(brand = %transaction.brand, "事件类型没有启用的规则");
            ProcessOutcome::no_rules()
        } else {
            let mut any_failed = false;
            let mut customer = customer;
            for rule in &rules {
                let verdict = self.run_rule(&mut *conn, rule, &customer, transaction, depth).await?;

                TransactionRepository::record_execution_in_tx(
                    &mut *conn,
                    transaction.id,
                    rule.id,
                    verdict.result,
                    &verdict.details,
                )
                .await?;
                metrics::record_rule_execution(verdict.result.as_str());

                if verdict.result == ExecutionResult::Failed {
                    any_failed = true;
                    warn!(rule_id = rule.id, details = %verdict.details, "规则执行失败");
                }
                if verdict.result == ExecutionResult::Success {
                    // 后续规则看到本规则写入后的客户状态
                    customer = self.load_customer(&mut *conn, transaction).await?;
                }
            }

            if any_failed {
                ProcessOutcome::with_status(TransactionStatus::ProcessedWithErrors)
            } else {
                ProcessOutcome::with_status(TransactionStatus::Processed)
            }
        };

        TransactionRepository::finish_in_tx(&mut *conn, transaction.id, &outcome, Utc::now()).await?;

        info!(
            brand = %transaction.brand,
            profile_id = %transaction.profile_id,
            rules = rules.len(),
            status = %outcome.status,
            elapsed_ms = (Utc::now() - now).num_milliseconds(),
            "交易规则处理完成"
        );

        Ok(outcome)
    }

    async fn load_customer(&self, conn: &mut PgConnection, transaction: &Transaction) -> Result<Customer> {
        CustomerRepository::find_in_tx(conn, &transaction.brand, &transaction.profile_id)
            .await?
            .ok_or_else(|| EngineError::CustomerNotFound {
                brand: transaction.brand.clone(),
                profile_id: transaction.profile_id.clone(),
            })
    }

    /// 执行单条规则
    ///
    /// 只有保存点之外的数据库错误会作为 Err 返回
    async fn run_rule(
        &self,
        conn: &mut PgConnection,
        rule: &Rule,
        customer: &Customer,
        transaction: &Transaction,
        depth: u32,
    ) -> Result<RuleVerdict> {
        let (condition, actions) = match parse_rule(rule) {
            Ok(parsed) => parsed,
            Err(e) => return Ok(RuleVerdict::failed(e.to_string())),
        };

        let now = Utc::now();
        let facts = self
            .fact_loader
            .load_in_tx(&mut *conn, &condition.requirements(), customer, now)
            .await?;
        let ctx = EvaluationContext::new(transaction.payload_or_empty(), customer.snapshot(), now);

        if !ConditionEvaluator::evaluate(&condition, &ctx, &facts) {
            return Ok(RuleVerdict::skipped(json!({"matched": false})));
        }
        if actions.is_empty() {
            return Ok(RuleVerdict::skipped(json!({
                "matched": true,
                "reason": "No actions defined",
            })));
        }

        let mut savepoint = conn.begin().await?;
        let executed = self
            .executor
            .execute_in_tx(&mut savepoint, customer, transaction, &actions, now, depth)
            .await;

        match executed {
            Ok(logs) => {
                savepoint.commit().await?;
                debug!(rule_id = rule.id, actions = logs.len(), "规则执行成功");
                Ok(RuleVerdict {
                    result: ExecutionResult::Success,
                    details: json!({"matched": true, "actions": logs}),
                })
            }
            Err(e) => {
                savepoint.rollback().await?;
                Ok(RuleVerdict::failed(e.to_string()))
            }
        }
    }
}

/// 解析规则的条件与动作
fn parse_rule(rule: &Rule) -> Result<(ConditionNode, Vec<ActionSpec>)> {
    let condition = ConditionNode::parse(rule.conditions.as_ref().unwrap_or(&Value::Null))?;
    let actions = parse_actions(rule.actions.as_ref().unwrap_or(&Value::Null))?;
    Ok((condition, actions))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(conditions: Value, actions: Value) -> Rule {
        Rule {
            id: 1,
            brand: "acme".into(),
            event_type: "PURCHASE".into(),
            name: "r".into(),
            priority: 0,
            conditions: Some(conditions),
            actions: Some(actions),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_rule_accepts_catalog_actions() {
        let (_, actions) = parse_rule(&rule(
            json!({"amount_gte": 50}),
            json!([{"type": "earn_points_from_amount", "rate": 1.0, "amount_path": "amount"}]),
        ))
        .unwrap();
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn test_unknown_action_rejected_before_side_effects() {
        let err = parse_rule(&rule(
            json!({}),
            json!([{"type": "earn_points", "points": 10}, {"type": "teleport"}]),
        ))
        .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_ACTION");
    }

    #[test]
    fn test_unknown_condition_rejected() {
        let err = parse_rule(&rule(json!({"moon_phase": "full"}), json!([]))).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_CONDITION");
    }

    #[test]
    fn test_missing_actions_parse_as_empty() {
        let mut r = rule(json!({}), json!(null));
        r.actions = None;
        let (_, actions) = parse_rule(&r).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_failed_verdict_details() {
        let verdict = RuleVerdict::failed("积分不足".into());
        assert_eq!(verdict.result, ExecutionResult::Failed);
        assert_eq!(verdict.details["error"], "积分不足");
    }
}
