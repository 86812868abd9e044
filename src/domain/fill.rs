//! Venue-native fill record.

use crate::domain::{Asset, Decimal, PositionSide, Side, Symbol, TimeMs};
use serde::{Deserialize, Serialize};

/// A single executed quantity, spot or derivatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFill {
    /// Venue trade id, when the venue reports one.
    pub trade_id: Option<String>,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Decimal,
    pub qty: Decimal,
    pub fee: Decimal,
    /// `None` means the venue did not say; treated as quote currency.
    pub fee_asset: Option<Asset>,
    pub time_ms: TimeMs,
    /// Venue-reported realized PnL (derivatives only).
    pub realized_pnl: Option<Decimal>,
    /// Hedge-mode leg tag (derivatives only).
    pub position_side: Option<PositionSide>,
}

impl RawFill {
    pub fn new(symbol: Symbol, side: Side, price: Decimal, qty: Decimal, time_ms: TimeMs) -> Self {
        Self {
            trade_id: None,
            symbol,
            side,
            price,
            qty,
            fee: Decimal::zero(),
            fee_asset: None,
            time_ms,
            realized_pnl: None,
            position_side: None,
        }
    }

    pub fn with_trade_id(mut self, trade_id: impl Into<String>) -> Self {
        self.trade_id = Some(trade_id.into());
        self
    }

    pub fn with_fee(mut self, fee: Decimal, fee_asset: Option<Asset>) -> Self {
        self.fee = fee;
        self.fee_asset = fee_asset;
        self
    }

    pub fn with_realized_pnl(mut self, realized_pnl: Decimal) -> Self {
        self.realized_pnl = Some(realized_pnl);
        self
    }

    pub fn with_position_side(mut self, position_side: PositionSide) -> Self {
        self.position_side = Some(position_side);
        self
    }

    /// Stable identity used to drop duplicates when window results are merged.
    ///
    /// Priority: venue trade id > hash of the economic fields.
    pub fn fill_key(&self) -> String {
        if let Some(trade_id) = &self.trade_id {
            return format!("{}:tid:{}", self.symbol, trade_id);
        }

        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.symbol.as_str());
        hasher.update(self.time_ms.as_ms().to_le_bytes());
        hasher.update(if self.side == Side::Buy { b"B" } else { b"S" });
        hasher.update(self.price.to_canonical_string());
        hasher.update(self.qty.to_canonical_string());
        hasher.update(self.fee.to_canonical_string());
        if let Some(pnl) = &self.realized_pnl {
            hasher.update(pnl.to_canonical_string());
        }
        let hash = hasher.finalize();
        format!("{}:hash:{}", self.symbol, hex::encode(&hash[..16]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn base_fill() -> RawFill {
        RawFill::new(
            Symbol::from("BTCUSDT"),
            Side::Buy,
            d("50000"),
            d("0.1"),
            TimeMs::new(1_000),
        )
    }

    #[test]
    fn test_fill_key_prefers_trade_id() {
        let fill = base_fill().with_trade_id("98765");
        assert_eq!(fill.fill_key(), "BTCUSDT:tid:98765");
    }

    #[test]
    fn test_fill_key_hash_is_deterministic() {
        let a = base_fill();
        let b = base_fill();
        assert_eq!(a.fill_key(), b.fill_key());
        assert!(a.fill_key().starts_with("BTCUSDT:hash:"));
    }

    #[test]
    fn test_fill_key_hash_distinguishes_price() {
        let a = base_fill();
        let mut b = base_fill();
        b.price = d("50001");
        assert_ne!(a.fill_key(), b.fill_key());
    }

    #[test]
    fn test_builders_set_optional_fields() {
        let fill = base_fill()
            .with_fee(d("0.05"), Some(Asset::from("usdt")))
            .with_realized_pnl(d("12.5"))
            .with_position_side(PositionSide::Short);
        assert_eq!(fill.fee, d("0.05"));
        assert_eq!(fill.fee_asset, Some(Asset::new("USDT")));
        assert_eq!(fill.realized_pnl, Some(d("12.5")));
        assert_eq!(fill.position_side, Some(PositionSide::Short));
    }
}
