//! 客户仓储
//!
//! 积分变动相关的写操作都在调用方事务内进行，由 `lock_in_tx` 先锁定客户行

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::Result;
use crate::models::Customer;
use crate::scheduler::selector::Selector;

const CUSTOMER_COLUMNS: &str = "id, brand, profile_id, gender, birthdate, status, loyalty_status, \
     lifetime_points, status_points, last_activity_at, status_points_reset_at, created_at, updated_at";

/// 客户仓储
pub struct CustomerRepository {
    pool: PgPool,
}

impl CustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, brand: &str, profile_id: &str) -> Result<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_in_tx(&mut conn, brand, profile_id).await
    }

    /// 在事务中按 (brand, profile_id) 查询
    pub async fn find_in_tx(
        conn: &mut PgConnection,
        brand: &str,
        profile_id: &str,
    ) -> Result<Option<Customer>> {
        let sql = format!(
            "SELECT {} FROM customers WHERE brand = $1 AND profile_id = $2",
            CUSTOMER_COLUMNS
        );
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(brand)
            .bind(profile_id)
            .fetch_optional(conn)
            .await?;

        Ok(customer)
    }

    /// 锁定客户行（SELECT ... FOR UPDATE）
    ///
    /// 同一客户的并发积分变动在此串行化
    pub async fn lock_in_tx(conn: &mut PgConnection, customer_id: Uuid) -> Result<Option<Customer>> {
        let sql = format!(
            "SELECT {} FROM customers WHERE id = $1 FOR UPDATE",
            CUSTOMER_COLUMNS
        );
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(customer_id)
            .fetch_optional(conn)
            .await?;

        Ok(customer)
    }

    /// 累计积分与等级积分同时增加
    pub async fn add_points_in_tx(conn: &mut PgConnection, customer_id: Uuid, points: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE customers
            SET lifetime_points = lifetime_points + $2,
                status_points = status_points + $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(customer_id)
        .bind(points)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// 直接设置等级积分（重置、降级）
    pub async fn set_status_points_in_tx(
        conn: &mut PgConnection,
        customer_id: Uuid,
        status_points: i64,
        reset_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE customers
            SET status_points = $2,
                status_points_reset_at = COALESCE($3, status_points_reset_at),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(customer_id)
        .bind(status_points)
        .bind(reset_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn set_loyalty_status_in_tx(
        conn: &mut PgConnection,
        customer_id: Uuid,
        loyalty_status: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE customers SET loyalty_status = $2, updated_at = NOW() WHERE id = $1")
            .bind(customer_id)
            .bind(loyalty_status)
            .execute(conn)
            .await?;

        Ok(())
    }

    pub async fn set_status_in_tx(conn: &mut PgConnection, customer_id: Uuid, status: &str) -> Result<()> {
        sqlx::query("UPDATE customers SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(customer_id)
            .bind(status)
            .execute(conn)
            .await?;

        Ok(())
    }

    /// 刷新最近活跃时间，客户不存在时返回 false
    pub async fn touch_activity_in_tx(
        conn: &mut PgConnection,
        brand: &str,
        profile_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE customers
            SET last_activity_at = $3, updated_at = NOW()
            WHERE brand = $1 AND profile_id = $2
            "#,
        )
        .bind(brand)
        .bind(profile_id)
        .bind(at)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 创建或更新客户资料
    ///
    /// 客户资料的唯一入口；事件接口不会自动创建客户
    pub async fn upsert(
        &self,
        brand: &str,
        profile_id: &str,
        gender: Option<&str>,
        birthdate: Option<NaiveDate>,
    ) -> Result<Customer> {
        let sql = format!(
            r#"
            INSERT INTO customers (id, brand, profile_id, gender, birthdate)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (brand, profile_id) DO UPDATE
            SET gender = COALESCE(EXCLUDED.gender, customers.gender),
                birthdate = COALESCE(EXCLUDED.birthdate, customers.birthdate),
                updated_at = NOW()
            RETURNING {}
            "#,
            CUSTOMER_COLUMNS
        );
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(Uuid::now_v7())
            .bind(brand)
            .bind(profile_id)
            .bind(gender)
            .bind(birthdate)
            .fetch_one(&self.pool)
            .await?;

        Ok(customer)
    }

    /// 按选择器查询目标客户
    ///
    /// `page` 为 (limit, offset)，按创建时间倒序；为 None 时返回全部
    pub async fn find_by_selector(
        &self,
        brand: Option<&str>,
        selector: &Selector,
        now: DateTime<Utc>,
        page: Option<(i64, i64)>,
    ) -> Result<Vec<Customer>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        qb.push(CUSTOMER_COLUMNS);
        qb.push(" FROM customers");
        push_selector_filter(&mut qb, brand, selector, now);
        qb.push(" ORDER BY created_at DESC, id");
        if let Some((limit, offset)) = page {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
            qb.push(" OFFSET ");
            qb.push_bind(offset);
        }

        let customers = qb
            .build_query_as::<Customer>()
            .fetch_all(&self.pool)
            .await?;

        Ok(customers)
    }

    /// 选择器命中的客户总数
    pub async fn count_by_selector(
        &self,
        brand: Option<&str>,
        selector: &Selector,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM customers");
        push_selector_filter(&mut qb, brand, selector, now);

        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }
}

fn push_selector_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    brand: Option<&str>,
    selector: &Selector,
    now: DateTime<Utc>,
) {
    qb.push(" WHERE TRUE");
    if let Some(brand) = brand {
        qb.push(" AND brand = ");
        qb.push_bind(brand.to_string());
    }
    if !selector.is_empty() {
        qb.push(" AND ");
        selector.push_sql(qb, now);
    }
}
