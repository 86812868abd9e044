//! Realized trade: the ledger's output record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::{Decimal, Symbol, TimeMs, Venue};

/// Which netting path produced a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeKind {
    Spot,
    Futures,
    /// Realized income with no trade legs behind it.
    Income,
}

impl TradeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeKind::Spot => "spot",
            TradeKind::Futures => "futures",
            TradeKind::Income => "income",
        }
    }
}

/// Source tag carried on every trade, e.g. `binance_futures`.
pub fn source_tag(venue: Venue, kind: TradeKind) -> String {
    format!("{}_{}", venue, kind.as_str())
}

/// Stable wire shape consumed by persistence and UI collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub symbol: Symbol,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub size: Decimal,
    pub timestamp: DateTime<Utc>,
    pub pnl: Decimal,
    pub source: String,
    pub note: String,
}

/// Issues deterministic ids of the form `{source}:{symbol}:{time_ms}:{seq}`.
///
/// `seq` counts trades already issued for the same source, symbol and
/// millisecond, so re-importing the same fills yields the same ids.
#[derive(Debug, Default)]
pub struct TradeIdGenerator {
    issued: HashMap<(String, Symbol, i64), u32>,
}

impl TradeIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, source: &str, symbol: &Symbol, time_ms: TimeMs) -> String {
        let seq = self
            .issued
            .entry((source.to_string(), symbol.clone(), time_ms.as_ms()))
            .or_insert(0);
        let id = format!("{}:{}:{}:{}", source, symbol, time_ms.as_ms(), seq);
        *seq += 1;
        id
    }
}

/// Sort by timestamp, then id.
pub fn sort_trades(trades: &mut [Trade]) {
    trades.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
}
