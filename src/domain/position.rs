use serde::{Deserialize, Serialize};

use crate::domain::{Decimal, PositionSide, Symbol};

/// Open derivatives position as reported by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub symbol: Symbol,
    /// Long or Short; venues in one-way mode are resolved from the sign.
    pub side: PositionSide,
    /// Absolute size.
    pub size: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionOrigin {
    DerivativesPosition,
    SpotOrder,
}

/// Live unrealized-PnL view of something currently open. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningPosition {
    pub symbol: Symbol,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub size: Decimal,
    pub origin: PositionOrigin,
}
