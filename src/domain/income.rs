use serde::{Deserialize, Serialize};

use crate::domain::{Asset, Decimal, Symbol, TimeMs};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeType {
    RealizedPnl,
    FundingFee,
    Commission,
    Other(String),
}

impl IncomeType {
    pub fn parse_venue(s: &str) -> IncomeType {
        match s.to_ascii_uppercase().as_str() {
            "REALIZED_PNL" => IncomeType::RealizedPnl,
            "FUNDING_FEE" => IncomeType::FundingFee,
            "COMMISSION" => IncomeType::Commission,
            other => IncomeType::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for IncomeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncomeType::RealizedPnl => write!(f, "realized_pnl"),
            IncomeType::FundingFee => write!(f, "funding_fee"),
            IncomeType::Commission => write!(f, "commission"),
            IncomeType::Other(s) => write!(f, "{}", s.to_ascii_lowercase()),
        }
    }
}

/// Derivatives income record as reported by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIncomeEntry {
    pub symbol: Symbol,
    pub income_type: IncomeType,
    pub amount: Decimal,
    pub asset: Asset,
    pub time_ms: TimeMs,
    pub tran_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_income_type_parse() {
        assert_eq!(IncomeType::parse_venue("REALIZED_PNL"), IncomeType::RealizedPnl);
        assert_eq!(IncomeType::parse_venue("funding_fee"), IncomeType::FundingFee);
        assert_eq!(
            IncomeType::parse_venue("INSURANCE_CLEAR"),
            IncomeType::Other("INSURANCE_CLEAR".to_string())
        );
        assert_eq!(IncomeType::RealizedPnl.to_string(), "realized_pnl");
    }
}
