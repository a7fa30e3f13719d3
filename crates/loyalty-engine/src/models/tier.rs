//! 会员等级

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 品牌下的一个等级
///
/// rank 越大等级越高；rank 0 的门槛必须为 0，门槛随 rank 严格递增
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyTier {
    pub id: Uuid,
    pub brand: String,
    pub key: String,
    pub name: String,
    pub min_status_points: i64,
    pub rank: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 选出门槛不超过 status_points 的最高等级
///
/// 只考虑 active 的等级；目录为空或无一满足时返回 None
pub fn resolve_tier(tiers: &[LoyaltyTier], status_points: i64) -> Option<&LoyaltyTier> {
    tiers
        .iter()
        .filter(|t| t.active && t.min_status_points <= status_points)
        .max_by_key(|t| t.rank)
}

/// 当前等级的下一级（rank - 1）
pub fn tier_below<'a>(tiers: &'a [LoyaltyTier], current: &LoyaltyTier) -> Option<&'a LoyaltyTier> {
    tiers
        .iter()
        .filter(|t| t.active && t.rank < current.rank)
        .max_by_key(|t| t.rank)
}

/// 校验等级目录：rank 0 ⇔ 门槛 0，门槛随 rank 严格递增
pub fn validate_catalog(tiers: &[LoyaltyTier]) -> Result<(), String> {
    let mut sorted: Vec<&LoyaltyTier> = tiers.iter().collect();
    sorted.sort_by_key(|t| t.rank);

    for tier in &sorted {
        if (tier.rank == 0) != (tier.min_status_points == 0) {
            return Err(format!(
                "等级 {} 的 rank 与门槛不匹配：rank 0 必须且只能对应门槛 0",
                tier.key
            ));
        }
    }
    for pair in sorted.windows(2) {
        if pair[0].rank == pair[1].rank {
            return Err(format!("rank {} 重复", pair[0].rank));
        }
        if pair[1].min_status_points <= pair[0].min_status_points {
            return Err(format!(
                "等级 {} 的门槛必须高于 {}",
                pair[1].key, pair[0].key
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn tier(key: &str, rank: i32, min: i64) -> LoyaltyTier {
    let now = Utc::now();
    LoyaltyTier {
        id: Uuid::new_v4(),
        brand: "acme".into(),
        key: key.into(),
        name: key.into(),
        min_status_points: min,
        rank,
        active: true,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<LoyaltyTier> {
        vec![tier("BASE", 0, 0), tier("SILVER", 1, 100), tier("GOLD", 2, 500)]
    }

    #[test]
    fn test_resolve_picks_highest_reached() {
        let tiers = catalog();
        assert_eq!(resolve_tier(&tiers, 0).map(|t| t.rank), Some(0));
        assert_eq!(resolve_tier(&tiers, 150).map(|t| t.rank), Some(1));
        assert_eq!(resolve_tier(&tiers, 500).map(|t| t.rank), Some(2));
        assert_eq!(resolve_tier(&tiers, 10_000).map(|t| t.key.as_str()), Some("GOLD"));
    }

    #[test]
    fn test_resolve_ignores_inactive_and_empty() {
        let mut tiers = catalog();
        tiers[2].active = false;
        assert_eq!(resolve_tier(&tiers, 900).map(|t| t.rank), Some(1));
        assert!(resolve_tier(&[], 900).is_none());
    }

    #[test]
    fn test_tier_below() {
        let tiers = catalog();
        assert_eq!(tier_below(&tiers, &tiers[2]).map(|t| t.key.as_str()), Some("SILVER"));
        assert!(tier_below(&tiers, &tiers[0]).is_none());
    }

    #[test]
    fn test_validate_catalog() {
        assert!(validate_catalog(&catalog()).is_ok());
        assert!(validate_catalog(&[tier("BASE", 0, 10)]).is_err());
        assert!(validate_catalog(&[tier("BASE", 0, 0), tier("SILVER", 1, 0)]).is_err());
        assert!(
            validate_catalog(&[tier("BASE", 0, 0), tier("SILVER", 1, 200), tier("GOLD", 2, 100)])
                .is_err()
        );
    }
}
