use std::collections::HashMap;
use tracing::{debug, warn};

use super::fees::fee_in_quote;
use crate::domain::{
    source_tag, Decimal, RawFill, Symbol, TimeMs, Trade, TradeIdGenerator, TradeKind, Venue,
};

/// Net spot exposure for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpotPosition {
    /// Positive = long, negative = short, zero = flat.
    pub net_qty: Decimal,
    /// Volume-weighted entry price of the open quantity.
    pub avg_entry_px: Decimal,
    pub last_fill_ms: TimeMs,
}

impl SpotPosition {
    pub fn is_flat(&self) -> bool {
        self.net_qty.is_zero()
    }

    pub fn is_long(&self) -> bool {
        self.net_qty.is_positive()
    }
}

/// Per-symbol netting of chronologically ordered spot fills.
///
/// Fills that grow the position update the average entry; fills against it
/// close at most the open quantity and emit one [`Trade`] for the closed
/// part. Whatever is left of a closing fill opens the opposite direction at
/// the fill price. A closing fill's whole fee is charged to the trade it
/// emits, including the share paid for any quantity it opens.
#[derive(Debug)]
pub struct SpotNetter {
    source: String,
    positions: HashMap<Symbol, SpotPosition>,
    ids: TradeIdGenerator,
    trades: Vec<Trade>,
}

impl SpotNetter {
    pub fn new(venue: Venue) -> Self {
        Self {
            source: source_tag(venue, TradeKind::Spot),
            positions: HashMap::new(),
            ids: TradeIdGenerator::new(),
            trades: Vec::new(),
        }
    }

    pub fn process_fill(&mut self, fill: &RawFill) {
        if !fill.qty.is_positive() || !fill.price.is_positive() {
            warn!(
                "Ignoring spot fill {} with qty {} and price {}",
                fill.fill_key(),
                fill.qty,
                fill.price
            );
            return;
        }

        let position = self.positions.entry(fill.symbol.clone()).or_default();
        let signed_qty = fill.side.sign() * fill.qty;

        if position.is_flat() || position.net_qty.signum() == signed_qty.signum() {
            let held = position.net_qty.abs();
            position.avg_entry_px =
                (position.avg_entry_px * held + fill.price * fill.qty) / (held + fill.qty);
            position.net_qty += signed_qty;
            position.last_fill_ms = fill.time_ms;
            return;
        }

        let closed = fill.qty.min(position.net_qty.abs());
        let direction = position.net_qty.signum();
        let entry = position.avg_entry_px;
        let was_long = position.is_long();

        position.net_qty += fill.side.sign() * closed;
        position.last_fill_ms = fill.time_ms;

        let remainder = fill.qty - closed;
        if position.is_flat() && remainder.is_positive() {
            position.net_qty = fill.side.sign() * remainder;
            position.avg_entry_px = fill.price;
            debug!("{} flipped with {} left open", fill.symbol, remainder);
        } else if position.is_flat() {
            self.positions.remove(&fill.symbol);
        }

        let gross = (fill.price - entry) * closed * direction;
        let (fee, fee_note) = match fee_in_quote(fill) {
            Ok(fee) => (fee, None),
            Err(excluded) => (
                Decimal::zero(),
                Some(format!(
                    "; fee {} {} not deducted",
                    excluded.amount, excluded.asset
                )),
            ),
        };

        let id = self.ids.next_id(&self.source, &fill.symbol, fill.time_ms);
        self.trades.push(Trade {
            id,
            symbol: fill.symbol.clone(),
            entry_price: entry,
            exit_price: fill.price,
            size: closed,
            timestamp: fill.time_ms.to_datetime(),
            pnl: gross - fee,
            source: self.source.clone(),
            note: format!(
                "spot {} closed by {}{}",
                if was_long { "long" } else { "short" },
                fill.side,
                fee_note.unwrap_or_default()
            ),
        });
    }

    pub fn position(&self, symbol: &Symbol) -> Option<&SpotPosition> {
        self.positions.get(symbol)
    }

    pub fn open_positions(&self) -> usize {
        self.positions.values().filter(|p| !p.is_flat()).count()
    }

    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }
}

/// Net `fills` in the order given. Callers merge and sort first.
pub fn net_spot_fills(venue: Venue, fills: &[RawFill]) -> Vec<Trade> {
    let mut netter = SpotNetter::new(venue);
    for fill in fills {
        netter.process_fill(fill);
    }
    netter.into_trades()
}
