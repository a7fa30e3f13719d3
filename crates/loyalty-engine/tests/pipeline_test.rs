//! 事件处理管线集成测试
//!
//! 运行：`DATABASE_URL=postgres://... cargo test -p loyalty-engine --test pipeline_test -- --ignored`

mod common;

use chrono::{Datelike, Duration, TimeZone, Utc};
use common::*;
use loyalty_engine::error::EngineError;
use loyalty_engine::models::TransactionStatus;
use loyalty_engine::service::{BonusLedger, PointsLedger};
use serde_json::json;

fn earn_from_amount() -> serde_json::Value {
    json!([{"type": "earn_points_from_amount", "rate": 1.0, "amount_path": "amount"}])
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_purchase_earns_points_end_to_end() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    seed_customer(pool, &brand, "p1").await;
    seed_rule(pool, &brand, "PURCHASE", 10, json!({"amount_gte": 50}), earn_from_amount()).await;

    let receipt = submit(&state, event(&brand, "p1", "PURCHASE", "e1", json!({"amount": 100}))).await;
    assert_eq!(receipt.status, TransactionStatus::Processed);

    let execs = executions(pool, receipt.transaction_id).await;
    assert_eq!(execs.len(), 1);
    assert_eq!(execs[0].0, "SUCCESS");
    assert_eq!(execs[0].1["matched"], true);
    assert_eq!(execs[0].1["actions"][0]["points"], 100);

    let customer = customer(pool, &brand, "p1").await;
    assert_eq!(customer.status_points, 100);
    assert_eq!(customer.lifetime_points, 100);

    let today = Utc::now().date_naive();
    assert_eq!(state.ledger.points_balance(customer.id, today).await.unwrap(), 100);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_replayed_event_is_idempotent() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    let customer = seed_customer(pool, &brand, "p1").await;
    seed_rule(pool, &brand, "PURCHASE", 10, json!({}), earn_from_amount()).await;

    let first = submit(&state, event(&brand, "p1", "PURCHASE", "dup", json!({"amount": 40}))).await;
    let second = submit(&state, event(&brand, "p1", "PURCHASE", "dup", json!({"amount": 999}))).await;

    assert_eq!(first.transaction_id, second.transaction_id);
    assert_eq!(second.status, TransactionStatus::Processed);
    assert_eq!(movement_count(pool, customer.id).await, 1);
    assert_eq!(common::customer(pool, &brand, "p1").await.status_points, 40);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_concurrent_duplicates_create_one_transaction() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    let customer = seed_customer(pool, &brand, "p1").await;
    seed_rule(pool, &brand, "PURCHASE", 10, json!({}), json!([{"type": "earn_points", "points": 5}])).await;

    let submissions = (0..5).map(|_| {
        let state = state.clone();
        let submission = event(&brand, "p1", "PURCHASE", "race", json!({}));
        async move { state.gate.submit_event(submission).await }
    });
    let receipts = futures::future::join_all(submissions).await;

    let ids: std::collections::HashSet<_> = receipts
        .into_iter()
        .map(|r| r.unwrap().transaction_id)
        .collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(movement_count(pool, customer.id).await, 1);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_no_rules_diagnostic() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    seed_customer(pool, &brand, "p1").await;

    let receipt = submit(&state, event(&brand, "p1", "PAGE_VIEW", "e1", json!({}))).await;
    assert_eq!(receipt.status, TransactionStatus::Processed);

    let txn = transaction(pool, receipt.transaction_id).await;
    assert_eq!(txn.error_code.as_deref(), Some("NO_RULES"));
    assert_eq!(txn.error_message.as_deref(), Some("No active rules matched this event."));
    assert!(txn.processed_at.is_some());
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_missing_fields_block_without_rules() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    seed_rule(pool, &brand, "PURCHASE", 10, json!({}), earn_from_amount()).await;

    let receipt = submit(&state, event(&brand, "", "PURCHASE", "e1", json!({"amount": 10}))).await;
    assert_eq!(receipt.status, TransactionStatus::Blocked);
    assert!(executions(pool, receipt.transaction_id).await.is_empty());
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_profile_events_rejected() {
    let state = state().await;
    let brand = unique_brand();

    let err = state
        .gate
        .submit_event(event(&brand, "p1", "CUSTOMER_UPSERT", "e1", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ProfileEventRejected(_)));
    assert_eq!(
        count(&state.pool, "SELECT COUNT(*) FROM transactions WHERE brand = $1", &brand).await,
        0
    );
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_unknown_customer_fails_transaction() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    seed_rule(pool, &brand, "PURCHASE", 10, json!({}), earn_from_amount()).await;

    let receipt = submit(&state, event(&brand, "ghost", "PURCHASE", "e1", json!({"amount": 10}))).await;
    assert_eq!(receipt.status, TransactionStatus::Failed);

    let txn = transaction(pool, receipt.transaction_id).await;
    assert_eq!(txn.error_code.as_deref(), Some("CUSTOMER_NOT_FOUND"));
    assert!(txn.error_message.unwrap().contains("ghost"));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_failed_rule_rolls_back_only_itself() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    let customer = seed_customer(pool, &brand, "p1").await;
    // 先加积分再扣超额：整条规则回滚，前一个动作的积分也不保留
    seed_rule(
        pool,
        &brand,
        "PURCHASE",
        1,
        json!({}),
        json!([{"type": "earn_points", "points": 7}, {"type": "burn_points", "points": 1000}]),
    )
    .await;
    seed_rule(pool, &brand, "PURCHASE", 2, json!({}), json!([{"type": "earn_points", "points": 10}])).await;
    seed_rule(pool, &brand, "PURCHASE", 3, json!({"amount_gte": 500}), earn_from_amount()).await;

    let receipt = submit(&state, event(&brand, "p1", "PURCHASE", "e1", json!({"amount": 20}))).await;
    assert_eq!(receipt.status, TransactionStatus::ProcessedWithErrors);

    let execs = executions(pool, receipt.transaction_id).await;
    let results: Vec<_> = execs.iter().map(|(r, _)| r.as_str()).collect();
    assert_eq!(results, ["FAILED", "SUCCESS", "SKIPPED"]);
    assert!(execs[0].1["error"].as_str().unwrap().contains("积分不足"));
    assert_eq!(execs[2].1, json!({"matched": false}));

    let today = Utc::now().date_naive();
    assert_eq!(state.ledger.points_balance(customer.id, today).await.unwrap(), 10);
    assert_eq!(movement_count(pool, customer.id).await, 1);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_malformed_rule_recorded_as_failed() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    seed_customer(pool, &brand, "p1").await;
    seed_rule(pool, &brand, "PURCHASE", 1, json!({}), json!([{"type": "teleport"}])).await;
    seed_rule(pool, &brand, "PURCHASE", 2, json!({}), json!([])).await;

    let receipt = submit(&state, event(&brand, "p1", "PURCHASE", "e1", json!({}))).await;
    assert_eq!(receipt.status, TransactionStatus::ProcessedWithErrors);

    let execs = executions(pool, receipt.transaction_id).await;
    assert_eq!(execs[0].0, "FAILED");
    assert_eq!(execs[1].0, "SKIPPED");
    assert_eq!(execs[1].1["reason"], "No actions defined");
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_tier_upgrade_emits_single_event_and_downgrade_lands_on_minimum() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    seed_tiers(pool, &brand).await;
    seed_event_type(pool, &brand, "TIER_UPGRADED", "INTERNAL").await;
    seed_event_type(pool, &brand, "TIER_DOWNGRADED", "INTERNAL").await;
    seed_customer(pool, &brand, "p1").await;
    seed_rule(pool, &brand, "PURCHASE", 1, json!({}), earn_from_amount()).await;
    seed_rule(pool, &brand, "INACTIVITY_CHECK", 1, json!({}), json!([{"type": "downgrade_one_tier"}])).await;

    submit(&state, event(&brand, "p1", "PURCHASE", "e1", json!({"amount": 150}))).await;
    let c = customer(pool, &brand, "p1").await;
    assert_eq!(c.loyalty_status.as_deref(), Some("SILVER"));

    let upgrades_sql = "SELECT COUNT(*) FROM transactions WHERE brand = $1 AND event_type = 'TIER_UPGRADED'";
    let before = count(pool, upgrades_sql, &brand).await;

    submit(&state, event(&brand, "p1", "PURCHASE", "e2", json!({"amount": 400}))).await;
    let c = customer(pool, &brand, "p1").await;
    assert_eq!(c.status_points, 550);
    assert_eq!(c.loyalty_status.as_deref(), Some("GOLD"));
    assert_eq!(count(pool, upgrades_sql, &brand).await, before + 1);

    let upgrade: (serde_json::Value, Option<String>) = sqlx::query_as(
        "SELECT payload, source FROM transactions WHERE brand = $1 AND event_type = 'TIER_UPGRADED' ORDER BY created_at DESC LIMIT 1",
    )
    .bind(&brand)
    .fetch_one(pool)
    .await
    .unwrap();
    assert_eq!(upgrade.0["fromTier"], "SILVER");
    assert_eq!(upgrade.0["toTier"], "GOLD");
    assert_eq!(upgrade.0["reason"], "EARN_POINTS");
    assert_eq!(upgrade.1.as_deref(), Some("SYSTEM"));

    submit(&state, event(&brand, "p1", "INACTIVITY_CHECK", "e3", json!({}))).await;
    let c = customer(pool, &brand, "p1").await;
    assert_eq!(c.status_points, 100);
    assert_eq!(c.loyalty_status.as_deref(), Some("SILVER"));
    assert_eq!(
        count(
            pool,
            "SELECT COUNT(*) FROM transactions WHERE brand = $1 AND event_type = 'TIER_DOWNGRADED'",
            &brand
        )
        .await,
        1
    );
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_tier_flapping_terminates_at_depth_limit() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    seed_tiers(pool, &brand).await;
    seed_event_type(pool, &brand, "TIER_UPGRADED", "INTERNAL").await;
    seed_event_type(pool, &brand, "TIER_DOWNGRADED", "INTERNAL").await;
    seed_customer(pool, &brand, "p1").await;
    seed_rule(pool, &brand, "PURCHASE", 1, json!({}), json!([{"type": "earn_points", "points": 600}])).await;
    seed_rule(pool, &brand, "TIER_UPGRADED", 1, json!({}), json!([{"type": "reset_status_points"}])).await;
    seed_rule(pool, &brand, "TIER_DOWNGRADED", 1, json!({}), json!([{"type": "earn_points", "points": 600}])).await;

    let receipt = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        state.gate.submit_event(event(&brand, "p1", "PURCHASE", "e1", json!({}))),
    )
    .await
    .expect("级联未终止")
    .unwrap();
    assert_eq!(receipt.status, TransactionStatus::Processed);

    let truncated = count(
        pool,
        "SELECT COUNT(*) FROM transactions WHERE brand = $1 AND error_code = 'CASCADE_DEPTH_EXCEEDED'",
        &brand,
    )
    .await;
    assert_eq!(truncated, 1);

    // 外部事件 + 深度 1、2 的内部事件 + 深度 3 被截断的事件
    assert_eq!(
        count(pool, "SELECT COUNT(*) FROM transactions WHERE brand = $1", &brand).await,
        4
    );
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_bonus_once_per_year() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    let bonus_key = format!("WELCOME_{}", brand);
    seed_bonus(pool, &bonus_key, Some(&brand), "ONCE_PER_YEAR").await;
    seed_customer(pool, &brand, "p1").await;
    seed_rule(
        pool,
        &brand,
        "SIGNUP",
        1,
        json!({}),
        json!([{"type": "record_bonus_award", "bonus_key": bonus_key}]),
    )
    .await;

    let first = submit(&state, event(&brand, "p1", "SIGNUP", "e1", json!({}))).await;
    let second = submit(&state, event(&brand, "p1", "SIGNUP", "e2", json!({}))).await;
    assert_eq!(first.status, TransactionStatus::Processed);
    assert_eq!(second.status, TransactionStatus::Processed);

    let execs = executions(pool, second.transaction_id).await;
    assert_eq!(execs[0].1["actions"][0]["idempotent"], true);

    let awards_sql = "SELECT COUNT(*) FROM bonus_awards WHERE brand = $1";
    assert_eq!(count(pool, awards_sql, &brand).await, 1);

    // 下一个自然年再次发放
    let txn = transaction(pool, second.transaction_id).await;
    let next_year = Utc.with_ymd_and_hms(Utc::now().year() + 1, 1, 15, 0, 0, 0).unwrap();
    let mut tx = pool.begin().await.unwrap();
    let log = BonusLedger::new()
        .record_award_in_tx(&mut tx, &bonus_key, &txn, next_year)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(log["idempotent"], false);
    assert_eq!(count(pool, awards_sql, &brand).await, 2);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_bonus_condition_gates_rule() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    let bonus_key = format!("BDAY_{}", brand);
    seed_bonus(pool, &bonus_key, Some(&brand), "ONCE_EVER").await;
    let customer = seed_customer(pool, &brand, "p1").await;
    seed_rule(
        pool,
        &brand,
        "VISIT",
        1,
        json!({"not": {"bonus_awarded": bonus_key}}),
        json!([{"type": "earn_points", "points": 25}, {"type": "record_bonus_award", "bonus_key": bonus_key}]),
    )
    .await;

    submit(&state, event(&brand, "p1", "VISIT", "e1", json!({}))).await;
    let second = submit(&state, event(&brand, "p1", "VISIT", "e2", json!({}))).await;

    assert_eq!(executions(pool, second.transaction_id).await[0].0, "SKIPPED");
    let today = Utc::now().date_naive();
    assert_eq!(state.ledger.points_balance(customer.id, today).await.unwrap(), 25);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_balance_respects_expiry_date() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    let customer = seed_customer(pool, &brand, "p1").await;
    seed_rule(pool, &brand, "PURCHASE", 1, json!({}), earn_from_amount()).await;

    submit(&state, event(&brand, "p1", "PURCHASE", "e1", json!({"amount": 100}))).await;

    let expires_at: chrono::NaiveDate =
        sqlx::query_scalar("SELECT expires_at FROM point_movements WHERE customer_id = $1")
            .bind(customer.id)
            .fetch_one(pool)
            .await
            .unwrap();
    let days = (expires_at - Utc::now().date_naive()).num_days();
    assert!((364..=366).contains(&days), "过期日应为获得后约 365 天: {}", days);

    let mut conn = pool.acquire().await.unwrap();
    let day_before = expires_at - Duration::days(1);
    let day_after = expires_at + Duration::days(1);
    assert_eq!(PointsLedger::balance_in_tx(&mut conn, customer.id, day_before).await.unwrap(), 100);
    assert_eq!(PointsLedger::balance_in_tx(&mut conn, customer.id, expires_at).await.unwrap(), 100);
    assert_eq!(PointsLedger::balance_in_tx(&mut conn, customer.id, day_after).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_redeem_reward_burns_and_issues() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    let customer = seed_customer(pool, &brand, "p1").await;
    let reward_id = seed_reward(pool, &brand, Some(60), Some(30)).await;
    seed_rule(pool, &brand, "PURCHASE", 1, json!({}), earn_from_amount()).await;
    seed_rule(
        pool,
        &brand,
        "REDEEM",
        1,
        json!({}),
        json!([{"type": "redeem_reward", "reward_id": reward_id.to_string()}]),
    )
    .await;

    submit(&state, event(&brand, "p1", "PURCHASE", "e1", json!({"amount": 100}))).await;
    let ok = submit(&state, event(&brand, "p1", "REDEEM", "r1", json!({}))).await;
    assert_eq!(ok.status, TransactionStatus::Processed);

    // 余额 40，不足以再兑换一次
    let short = submit(&state, event(&brand, "p1", "REDEEM", "r2", json!({}))).await;
    assert_eq!(short.status, TransactionStatus::ProcessedWithErrors);

    let today = Utc::now().date_naive();
    assert_eq!(state.ledger.points_balance(customer.id, today).await.unwrap(), 40);

    let issued: Vec<(String, Option<chrono::DateTime<Utc>>)> = sqlx::query_as(
        "SELECT status, expires_at FROM customer_rewards WHERE customer_id = $1",
    )
    .bind(customer.id)
    .fetch_all(pool)
    .await
    .unwrap();
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].0, "ISSUED");
    assert!(issued[0].1.is_some());
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_unknown_reward_fails_rule() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    seed_customer(pool, &brand, "p1").await;
    seed_rule(
        pool,
        &brand,
        "GIFT",
        1,
        json!({}),
        json!([{"type": "issue_reward", "reward_id": uuid::Uuid::new_v4().to_string()}]),
    )
    .await;

    let receipt = submit(&state, event(&brand, "p1", "GIFT", "g1", json!({}))).await;
    assert_eq!(receipt.status, TransactionStatus::ProcessedWithErrors);
    let execs = executions(pool, receipt.transaction_id).await;
    assert!(execs[0].1["error"].as_str().unwrap().contains("奖励不存在"));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_customer_tag_idempotent() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    let customer = seed_customer(pool, &brand, "p1").await;
    seed_rule(
        pool,
        &brand,
        "VISIT",
        1,
        json!({}),
        json!([{"type": "add_customer_tag", "tag": "vip"}, {"type": "set_customer_status", "status": "ENGAGED"}]),
    )
    .await;

    let first = submit(&state, event(&brand, "p1", "VISIT", "v1", json!({}))).await;
    let second = submit(&state, event(&brand, "p1", "VISIT", "v2", json!({}))).await;

    assert_eq!(executions(pool, first.transaction_id).await[0].1["actions"][0]["idempotent"], false);
    assert_eq!(executions(pool, second.transaction_id).await[0].1["actions"][0]["idempotent"], true);

    let tags: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customer_tags WHERE customer_id = $1")
        .bind(customer.id)
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(tags, 1);
    assert_eq!(common::customer(pool, &brand, "p1").await.status, "ENGAGED");
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_external_event_type_touches_activity() {
    let state = state().await;
    let pool = &state.pool;
    let brand = unique_brand();
    seed_event_type(pool, &brand, "PURCHASE", "EXTERNAL").await;
    seed_customer(pool, &brand, "p1").await;

    submit(&state, event(&brand, "p1", "PURCHASE", "e1", json!({}))).await;
    assert!(customer(pool, &brand, "p1").await.last_activity_at.is_some());
}
