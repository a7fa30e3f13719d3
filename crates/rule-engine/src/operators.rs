//! 比较操作符

use serde::{Deserialize, Serialize};
use std::fmt;

/// `payload_cmp` / `customer_cmp` 支持的操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Gte,
    Lte,
    Between,
}

impl CompareOp {
    /// 大小写不敏感解析，未知操作符返回 None
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eq" => Some(Self::Eq),
            "gte" => Some(Self::Gte),
            "lte" => Some(Self::Lte),
            "between" => Some(Self::Between),
            _ => None,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "eq",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Between => "between",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(CompareOp::parse("GTE"), Some(CompareOp::Gte));
        assert_eq!(CompareOp::parse(" between "), Some(CompareOp::Between));
        assert_eq!(CompareOp::parse("gt"), None);
    }

    #[test]
    fn test_display_round_trips_through_serde_name() {
        let json = serde_json::to_string(&CompareOp::Lte).unwrap();
        assert_eq!(json, format!("\"{}\"", CompareOp::Lte));
    }
}
