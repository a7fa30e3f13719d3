//! 集成测试公共工具
//!
//! 需要真实 PostgreSQL：`DATABASE_URL=postgres://... cargo test -- --ignored`。
//! 每个测试使用随机品牌，互不干扰，也不需要清表。

#![allow(dead_code)]

use loyalty_engine::models::{Customer, Transaction, TransactionSource};
use loyalty_engine::repository::{CustomerRepository, TransactionRepository};
use loyalty_engine::service::{EventReceipt, EventSubmission};
use loyalty_engine::state::AppState;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

pub async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("集成测试需要设置 DATABASE_URL");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("连接测试数据库失败");
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .expect("数据库迁移失败");
    pool
}

pub async fn state() -> AppState {
    AppState::build(pool().await).await
}

pub fn unique_brand() -> String {
    format!("it_{}", Uuid::new_v4().simple())
}

pub fn unique_event_id() -> String {
    format!("evt_{}", Uuid::new_v4().simple())
}

pub async fn seed_event_type(pool: &PgPool, brand: &str, key: &str, origin: &str) {
    sqlx::query(
        "INSERT INTO event_types (id, brand, key, origin, name) VALUES ($1, $2, $3, $4, $3)",
    )
    .bind(Uuid::new_v4())
    .bind(brand)
    .bind(key)
    .bind(origin)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_rule(
    pool: &PgPool,
    brand: &str,
    event_type: &str,
    priority: i32,
    conditions: Value,
    actions: Value,
) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO rules (brand, event_type, name, priority, conditions, actions)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(brand)
    .bind(event_type)
    .bind(format!("{} rule {}", event_type, priority))
    .bind(priority)
    .bind(conditions)
    .bind(actions)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn seed_tiers(pool: &PgPool, brand: &str) {
    for (key, min, rank) in [("BASE", 0_i64, 0_i32), ("SILVER", 100, 1), ("GOLD", 500, 2)] {
        sqlx::query(
            r#"
            INSERT INTO loyalty_tiers (id, brand, key, name, min_status_points, rank)
            VALUES ($1, $2, $3, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(brand)
        .bind(key)
        .bind(min)
        .bind(rank)
        .execute(pool)
        .await
        .unwrap();
    }
}

pub async fn seed_reward(pool: &PgPool, brand: &str, cost_points: Option<i64>, validity_days: Option<i32>) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO rewards (id, brand, name, cost_points, validity_days) VALUES ($1, $2, 'Voucher', $3, $4)",
    )
    .bind(id)
    .bind(brand)
    .bind(cost_points)
    .bind(validity_days)
    .execute(pool)
    .await
    .unwrap();
    id
}

pub async fn seed_bonus(pool: &PgPool, bonus_key: &str, brand: Option<&str>, award_policy: &str) {
    sqlx::query(
        r#"
        INSERT INTO bonus_definitions (id, bonus_key, brand, name, award_policy)
        VALUES ($1, $2, $3, $2, $4)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(bonus_key)
    .bind(brand)
    .bind(award_policy)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_customer(pool: &PgPool, brand: &str, profile_id: &str) -> Customer {
    CustomerRepository::new(pool.clone())
        .upsert(brand, profile_id, None, None)
        .await
        .unwrap()
}

pub async fn customer(pool: &PgPool, brand: &str, profile_id: &str) -> Customer {
    CustomerRepository::new(pool.clone())
        .find(brand, profile_id)
        .await
        .unwrap()
        .expect("客户不存在")
}

pub fn event(brand: &str, profile_id: &str, event_type: &str, event_id: &str, payload: Value) -> EventSubmission {
    EventSubmission {
        brand: brand.to_string(),
        profile_id: profile_id.to_string(),
        event_type: event_type.to_string(),
        event_id: event_id.to_string(),
        source: TransactionSource::Api,
        payload,
    }
}

pub async fn submit(state: &AppState, submission: EventSubmission) -> EventReceipt {
    state.gate.submit_event(submission).await.unwrap()
}

pub async fn transaction(pool: &PgPool, id: Uuid) -> Transaction {
    TransactionRepository::new(pool.clone())
        .find_by_id(id)
        .await
        .unwrap()
        .expect("交易不存在")
}

/// 交易的规则执行记录：(result, details)，按写入顺序
pub async fn executions(pool: &PgPool, transaction_id: Uuid) -> Vec<(String, Value)> {
    sqlx::query_as(
        "SELECT result, details FROM transaction_rule_executions WHERE transaction_id = $1 ORDER BY id",
    )
    .bind(transaction_id)
    .fetch_all(pool)
    .await
    .unwrap()
}

pub async fn count(pool: &PgPool, sql: &str, bind: &str) -> i64 {
    sqlx::query_scalar(sql).bind(bind).fetch_one(pool).await.unwrap()
}

pub async fn movement_count(pool: &PgPool, customer_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM point_movements WHERE customer_id = $1")
        .bind(customer_id)
        .fetch_one(pool)
        .await
        .unwrap()
}
