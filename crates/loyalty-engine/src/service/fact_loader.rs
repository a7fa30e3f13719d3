//! 条件事实预取
//!
//! 条件求值是纯函数，需要访问数据库的条件先声明依赖，在此一次性加载。

use chrono::{DateTime, Datelike, Utc};
use rule_engine::{FactRequirements, Facts};
use sqlx::PgConnection;

use crate::error::Result;
use crate::models::Customer;
use crate::repository::PointMovementRepository;
use crate::service::bonus_service::BonusLedger;

/// 事实加载器
#[derive(Debug, Default, Clone, Copy)]
pub struct FactLoader {
    bonus_ledger: BonusLedger,
}

impl FactLoader {
    pub fn new(bonus_ledger: BonusLedger) -> Self {
        Self { bonus_ledger }
    }

    /// 按依赖加载事实；没有依赖时不访问数据库
    pub async fn load_in_tx(
        &self,
        conn: &mut PgConnection,
        requirements: &FactRequirements,
        customer: &Customer,
        now: DateTime<Utc>,
    ) -> Result<Facts> {
        let mut facts = Facts::default();
        if requirements.is_empty() {
            return Ok(facts);
        }

        if requirements.prior_earn {
            facts.has_prior_earn = PointMovementRepository::has_earn_in_tx(&mut *conn, customer.id).await?;
        }

        if requirements.earn_this_year {
            facts.earn_points_this_year =
                PointMovementRepository::earn_points_in_year_in_tx(&mut *conn, customer.id, now.year())
                    .await?
                    .into_iter()
                    .collect();
        }

        for bonus_key in &requirements.bonus_keys {
            let awarded = self
                .bonus_ledger
                .is_awarded_in_tx(&mut *conn, bonus_key, &customer.brand, &customer.profile_id, now)
                .await?;
            if let Some(awarded) = awarded {
                facts.bonus_awarded.insert(bonus_key.clone(), awarded);
            }
        }

        Ok(facts)
    }
}
