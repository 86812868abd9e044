use serde::{Deserialize, Serialize};

use crate::domain::{Asset, Decimal};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: Asset,
    pub free: Decimal,
    pub locked: Decimal,
}

impl AssetBalance {
    pub fn new(asset: Asset, free: Decimal, locked: Decimal) -> Self {
        Self { asset, free, locked }
    }

    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

/// Account value in one quote currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub quote_asset: Asset,
    pub spot_value: Decimal,
    pub derivatives_value: Decimal,
    pub total: Decimal,
    /// False when the key lacks derivatives permission or the venue has no
    /// derivatives market; `total` is then the spot value alone.
    pub derivatives_available: bool,
    /// Nonzero balances with no conversion path; they contribute zero.
    pub unpriced_assets: Vec<Asset>,
}
