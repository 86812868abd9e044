//! Derivatives position netting keyed by (symbol, position side).
//!
//! Hedge-mode fills carry a `Long`/`Short` tag and net into a leg whose
//! direction never changes. One-way fills (`Both` or untagged) share a single
//! leg per symbol whose direction is set by the fill that opens it from flat;
//! a fill that crosses zero closes the leg and opens the remainder the other
//! way.
//!
//! Realized PnL is the venue's figure when the fill carries one. Fills
//! without it fall back to a local estimate net of the converted fee.
//!
//! Legs opened before the range can be seeded from [`starting_legs`] so that
//! closing fills net against them instead of being guessed.

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::fees::fee_in_quote;
use crate::domain::{
    source_tag, Decimal, IncomeType, OpenPosition, PositionSide, RawFill, RawIncomeEntry, Symbol,
    TimeMs, Trade, TradeIdGenerator, TradeKind, Venue,
};

/// Accumulated state of one open leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegState {
    /// `Long` or `Short`.
    pub direction: PositionSide,
    pub open_qty: Decimal,
    pub avg_entry_px: Decimal,
    pub closed_qty: Decimal,
    pub closed_notional: Decimal,
    pub realized_pnl: Decimal,
    /// Closing fees in quote units.
    pub fees: Decimal,
    pub closing_fills: u32,
    pub last_fill_ms: TimeMs,
    /// Opened before the range.
    pub carried_in: bool,
    /// False until a fill fixes the entry of a carried-in leg.
    pub entry_known: bool,
}

impl LegState {
    fn open(direction: PositionSide, fill: &RawFill, qty: Decimal) -> Self {
        Self {
            direction,
            open_qty: qty,
            avg_entry_px: fill.price,
            closed_qty: Decimal::zero(),
            closed_notional: Decimal::zero(),
            realized_pnl: Decimal::zero(),
            fees: Decimal::zero(),
            closing_fills: 0,
            last_fill_ms: fill.time_ms,
            carried_in: false,
            entry_known: true,
        }
    }

    fn carried(leg: &StartingLeg) -> Self {
        Self {
            direction: leg.direction,
            open_qty: leg.qty,
            avg_entry_px: leg.entry_hint.unwrap_or_else(Decimal::zero),
            closed_qty: Decimal::zero(),
            closed_notional: Decimal::zero(),
            realized_pnl: Decimal::zero(),
            fees: Decimal::zero(),
            closing_fills: 0,
            last_fill_ms: TimeMs::default(),
            carried_in: true,
            entry_known: leg.entry_hint.is_some(),
        }
    }

    fn is_flat(&self) -> bool {
        self.open_qty.is_zero()
    }
}

type LegKey = (Symbol, PositionSide);

/// A leg already open when the range began.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartingLeg {
    pub symbol: Symbol,
    /// `Long`/`Short` in hedge mode, `Both` in one-way mode.
    pub position_side: PositionSide,
    /// `Long` or `Short`.
    pub direction: PositionSide,
    pub qty: Decimal,
    /// Known only when every fill since only reduced the leg.
    pub entry_hint: Option<Decimal>,
}

/// Legs of `symbol` that were open before its first fill in `fills`, worked
/// back from the current `positions` minus what the fills moved.
///
/// Only meaningful when `fills` reach up to the moment `positions` was taken.
pub fn starting_legs(
    symbol: &Symbol,
    positions: &[OpenPosition],
    fills: &[RawFill],
) -> Vec<StartingLeg> {
    let fills: Vec<&RawFill> = fills.iter().filter(|f| &f.symbol == symbol).collect();
    if fills.is_empty() {
        return Vec::new();
    }
    let positions: Vec<&OpenPosition> =
        positions.iter().filter(|p| &p.symbol == symbol).collect();
    let hedged = fills
        .iter()
        .any(|f| matches!(f.position_side, Some(PositionSide::Long | PositionSide::Short)));

    if hedged {
        return [PositionSide::Long, PositionSide::Short]
            .into_iter()
            .filter_map(|side| {
                let leg_fills: Vec<&&RawFill> = fills
                    .iter()
                    .filter(|f| f.position_side == Some(side))
                    .collect();
                let current: Decimal = positions
                    .iter()
                    .filter(|p| p.side == side)
                    .map(|p| p.size)
                    .sum();
                let moved: Decimal = leg_fills
                    .iter()
                    .map(|f| side.direction() * f.side.sign() * f.qty)
                    .sum();
                let qty = current - moved;
                let only_reduced = leg_fills.iter().all(|f| f.side != side.opening_side());
                let entry_hint = positions
                    .iter()
                    .find(|p| p.side == side)
                    .filter(|_| only_reduced)
                    .map(|p| p.entry_price);
                qty.is_positive().then(|| StartingLeg {
                    symbol: symbol.clone(),
                    position_side: side,
                    direction: side,
                    qty,
                    entry_hint,
                })
            })
            .collect();
    }

    let current: Decimal = positions.iter().map(|p| p.side.direction() * p.size).sum();
    let moved: Decimal = fills.iter().map(|f| f.side.sign() * f.qty).sum();
    let start = current - moved;
    if start.is_zero() {
        return Vec::new();
    }
    let direction = if start.is_positive() {
        PositionSide::Long
    } else {
        PositionSide::Short
    };
    let still_open = current.signum() == start.signum();
    let only_reduced = fills.iter().all(|f| f.side != direction.opening_side());
    let entry_hint = positions
        .first()
        .filter(|_| still_open && only_reduced)
        .map(|p| p.entry_price);
    vec![StartingLeg {
        symbol: symbol.clone(),
        position_side: PositionSide::Both,
        direction,
        qty: start.abs(),
        entry_hint,
    }]
}

#[derive(Debug)]
pub struct DerivativesNetter {
    source: String,
    income_source: String,
    legs: HashMap<LegKey, LegState>,
    traded: HashSet<Symbol>,
    ids: TradeIdGenerator,
    trades: Vec<Trade>,
}

impl DerivativesNetter {
    pub fn new(venue: Venue) -> Self {
        Self {
            source: source_tag(venue, TradeKind::Futures),
            income_source: source_tag(venue, TradeKind::Income),
            legs: HashMap::new(),
            traded: HashSet::new(),
            ids: TradeIdGenerator::new(),
            trades: Vec::new(),
        }
    }

    /// Open a leg that predates the first fill of its symbol.
    pub fn seed(&mut self, leg: &StartingLeg) {
        let key = (leg.symbol.clone(), leg.position_side.normalized());
        debug!(
            "Seeding {} {} leg of {} from open positions",
            leg.symbol, leg.direction, leg.qty
        );
        self.legs.insert(key, LegState::carried(leg));
    }

    pub fn process_fill(&mut self, fill: &RawFill) {
        if !fill.qty.is_positive() || !fill.price.is_positive() {
            warn!(
                "Ignoring derivative fill {} with qty {} and price {}",
                fill.fill_key(),
                fill.qty,
                fill.price
            );
            return;
        }
        self.traded.insert(fill.symbol.clone());

        let hedge_side = match fill.position_side {
            Some(PositionSide::Long) => Some(PositionSide::Long),
            Some(PositionSide::Short) => Some(PositionSide::Short),
            _ => None,
        };
        let key_side = hedge_side.unwrap_or(PositionSide::Both).normalized();
        let key = (fill.symbol.clone(), key_side);

        let grows = self
            .legs
            .get(&key)
            .filter(|leg| !leg.is_flat())
            .map(|leg| fill.side == leg.direction.opening_side());

        match grows {
            Some(true) => self.grow(&key, fill),
            Some(false) => self.close(key, fill, hedge_side.is_some()),
            None => self.open_from_flat(key, fill, hedge_side),
        }
    }

    fn open_from_flat(&mut self, key: LegKey, fill: &RawFill, hedge_side: Option<PositionSide>) {
        let realized = fill.realized_pnl.unwrap_or_else(Decimal::zero);
        let closes_hedge_leg = hedge_side.is_some_and(|side| fill.side != side.opening_side());
        let closes_one_way = hedge_side.is_none() && !realized.is_zero();

        if closes_hedge_leg || closes_one_way {
            // Leg opened before the requested range.
            let direction =
                hedge_side.unwrap_or_else(|| PositionSide::opened_by(fill.side.opposite()));
            self.emit_carried_in(fill, direction, fill.qty, realized);
            return;
        }

        let direction = hedge_side.unwrap_or_else(|| PositionSide::opened_by(fill.side));
        self.legs.insert(key, LegState::open(direction, fill, fill.qty));
    }

    fn grow(&mut self, key: &LegKey, fill: &RawFill) {
        if let Some(leg) = self.legs.get_mut(key) {
            if !leg.entry_known {
                leg.avg_entry_px = fill.price;
                leg.entry_known = true;
            }
            let open = leg.open_qty;
            leg.avg_entry_px = (leg.avg_entry_px * open + fill.price * fill.qty) / (open + fill.qty);
            leg.open_qty = open + fill.qty;
            leg.last_fill_ms = fill.time_ms;
        }
    }

    fn close(&mut self, key: LegKey, fill: &RawFill, hedged: bool) {
        let Some(leg) = self.legs.get_mut(&key) else {
            return;
        };

        let closed = fill.qty.min(leg.open_qty);
        let excess = fill.qty - closed;
        let direction = leg.direction.direction();
        if !leg.entry_known {
            leg.avg_entry_px = match fill.realized_pnl {
                Some(venue) => fill.price - venue / (closed * direction),
                None => fill.price,
            };
            leg.entry_known = true;
        }
        let local_gross = (fill.price - leg.avg_entry_px) * closed * direction;

        let fee = match fee_in_quote(fill) {
            Ok(fee) => fee,
            Err(excluded) => {
                debug!(
                    "Fee {} {} on {} not converted",
                    excluded.amount,
                    excluded.asset,
                    fill.fill_key()
                );
                Decimal::zero()
            }
        };

        // A one-way crossing attributes all venue PnL to the closed part; a
        // hedge leg's excess gets whatever is left after the local estimate.
        let (closed_realized, carried_realized) = match fill.realized_pnl {
            Some(venue) if hedged && excess.is_positive() => (local_gross, venue - local_gross),
            Some(venue) => (venue, Decimal::zero()),
            None => (local_gross - fee, Decimal::zero()),
        };

        leg.open_qty -= closed;
        leg.closed_qty += closed;
        leg.closed_notional += fill.price * closed;
        leg.realized_pnl += closed_realized;
        leg.fees += fee;
        leg.closing_fills += 1;
        leg.last_fill_ms = fill.time_ms;
        let leg_direction = leg.direction;

        if leg.is_flat() {
            if let Some(done) = self.legs.remove(&key) {
                self.emit_flat(&key.0, done, fill.time_ms);
            }
        }

        if !excess.is_positive() {
            return;
        }
        if hedged {
            self.emit_carried_in(fill, leg_direction, excess, carried_realized);
        } else {
            let flipped = PositionSide::opened_by(fill.side);
            debug!("{} flipped to {} with {} open", fill.symbol, flipped, excess);
            self.legs
                .insert(key, LegState::open(flipped, fill, excess));
        }
    }

    fn emit_flat(&mut self, symbol: &Symbol, leg: LegState, time_ms: TimeMs) {
        let exit = leg
            .closed_notional
            .checked_div(leg.closed_qty)
            .unwrap_or(leg.avg_entry_px);
        let id = self.ids.next_id(&self.source, symbol, time_ms);
        self.trades.push(Trade {
            id,
            symbol: symbol.clone(),
            entry_price: leg.avg_entry_px,
            exit_price: exit,
            size: leg.closed_qty,
            timestamp: time_ms.to_datetime(),
            pnl: leg.realized_pnl,
            source: self.source.clone(),
            note: format!(
                "{} closed over {} fill(s); commission {}{}",
                leg.direction,
                leg.closing_fills,
                leg.fees,
                if leg.carried_in { "; opened before range" } else { "" }
            ),
        });
    }

    /// Closing quantity with no open leg behind it. Only emitted when the
    /// venue attributes PnL to it; entry is solved from that PnL.
    fn emit_carried_in(
        &mut self,
        fill: &RawFill,
        direction: PositionSide,
        size: Decimal,
        realized: Decimal,
    ) {
        if realized.is_zero() {
            debug!(
                "Ignoring {} {} closed with no open leg and no venue PnL",
                size, fill.symbol
            );
            return;
        }
        let entry = fill.price - realized / (size * direction.direction());
        let id = self.ids.next_id(&self.source, &fill.symbol, fill.time_ms);
        self.trades.push(Trade {
            id,
            symbol: fill.symbol.clone(),
            entry_price: entry,
            exit_price: fill.price,
            size,
            timestamp: fill.time_ms.to_datetime(),
            pnl: realized,
            source: self.source.clone(),
            note: format!("{} opened before range; entry derived from venue pnl", direction),
        });
    }

    /// Realized-PnL income for symbols that produced no fills becomes
    /// size-zero trades, one per record.
    pub fn absorb_income(&mut self, entries: &[RawIncomeEntry]) {
        for entry in entries {
            if entry.income_type != IncomeType::RealizedPnl
                || entry.amount.is_zero()
                || self.traded.contains(&entry.symbol)
            {
                continue;
            }
            let id = self
                .ids
                .next_id(&self.income_source, &entry.symbol, entry.time_ms);
            self.trades.push(Trade {
                id,
                symbol: entry.symbol.clone(),
                entry_price: Decimal::zero(),
                exit_price: Decimal::zero(),
                size: Decimal::zero(),
                timestamp: entry.time_ms.to_datetime(),
                pnl: entry.amount,
                source: self.income_source.clone(),
                note: format!(
                    "realized {} income without trade legs (tran {})",
                    entry.asset, entry.tran_id
                ),
            });
        }
    }

    pub fn leg(&self, symbol: &Symbol, side: PositionSide) -> Option<&LegState> {
        self.legs.get(&(symbol.clone(), side.normalized()))
    }

    pub fn open_position_count(&self) -> usize {
        self.legs.values().filter(|l| !l.is_flat()).count()
    }

    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn fill(side: Side, price: &str, qty: &str, t: i64) -> RawFill {
        RawFill::new(Symbol::from("BTCUSDT"), side, d(price), d(qty), TimeMs::new(t))
    }

    #[test]
    fn test_one_way_long_round_trip_uses_venue_pnl() {
        let mut netter = DerivativesNetter::new(Venue::Binance);
        netter.process_fill(&fill(Side::Buy, "100", "1", 1).with_realized_pnl(d("0")));
        netter.process_fill(&fill(Side::Buy, "110", "1", 2).with_realized_pnl(d("0")));
        netter.process_fill(&fill(Side::Sell, "120", "1", 3).with_realized_pnl(d("15")));
        netter.process_fill(&fill(Side::Sell, "130", "1", 4).with_realized_pnl(d("25")));

        let trades = netter.into_trades();
        assert_eq!(trades.len(), 1);
        let t = &trades[0];
        assert_eq!(t.entry_price, d("105"));
        assert_eq!(t.exit_price, d("125"));
        assert_eq!(t.size, d("2"));
        assert_eq!(t.pnl, d("40"));
        assert_eq!(t.source, "binance_futures");
        assert_eq!(t.id, "binance_futures:BTCUSDT:4:0");
    }

    #[test]
    fn test_one_way_short_from_sell() {
        let mut netter = DerivativesNetter::new(Venue::Bybit);
        netter.process_fill(&fill(Side::Sell, "100", "2", 1));
        netter.process_fill(&fill(Side::Buy, "90", "2", 2));
        let trades = netter.into_trades();
        assert_eq!(trades.len(), 1);
        // No venue figure: local estimate.
        assert_eq!(trades[0].pnl, d("20"));
    }

    #[test]
    fn test_one_way_crossing_flips_leg() {
        let mut netter = DerivativesNetter::new(Venue::Binance);
        netter.process_fill(&fill(Side::Buy, "100", "1", 1));
        netter.process_fill(&fill(Side::Sell, "110", "3", 2).with_realized_pnl(d("10")));

        let leg = netter.leg(&Symbol::from("BTCUSDT"), PositionSide::Both).unwrap();
        assert_eq!(leg.direction, PositionSide::Short);
        assert_eq!(leg.open_qty, d("2"));
        assert_eq!(leg.avg_entry_px, d("110"));
        assert_eq!(netter.open_position_count(), 1);

        let trades = netter.into_trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].size, d("1"));
        assert_eq!(trades[0].pnl, d("10"));
    }

    #[test]
    fn test_crossing_fill_fee_is_charged_to_closed_leg() {
        let mut netter = DerivativesNetter::new(Venue::Bybit);
        netter.process_fill(&fill(Side::Buy, "100", "1", 1));
        netter.process_fill(
            &fill(Side::Sell, "110", "3", 2)
                .with_fee(d("3"), Some(crate::domain::Asset::from("USDT"))),
        );
        netter.process_fill(&fill(Side::Buy, "110", "2", 3));

        let trades = netter.into_trades();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].pnl, d("7"));
        assert!(trades[0].note.contains("commission 3"));
        assert_eq!(trades[1].pnl, Decimal::zero());
    }

    #[test]
    fn test_hedge_legs_are_independent() {
        let mut netter = DerivativesNetter::new(Venue::Binance);
        let long = |side, px, qty, t| fill(side, px, qty, t).with_position_side(PositionSide::Long);
        let short =
            |side, px, qty, t| fill(side, px, qty, t).with_position_side(PositionSide::Short);

        netter.process_fill(&long(Side::Buy, "100", "1", 1));
        netter.process_fill(&short(Side::Sell, "100", "1", 2));
        netter.process_fill(&long(Side::Sell, "120", "1", 3).with_realized_pnl(d("20")));

        assert_eq!(netter.open_position_count(), 1);
        let short_leg = netter.leg(&Symbol::from("BTCUSDT"), PositionSide::Short).unwrap();
        assert_eq!(short_leg.open_qty, d("1"));

        let trades = netter.into_trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].pnl, d("20"));
        assert!(trades[0].note.starts_with("long"));
    }

    #[test]
    fn test_carried_in_close_back_solves_entry() {
        let mut netter = DerivativesNetter::new(Venue::Binance);
        netter.process_fill(
            &fill(Side::Sell, "120", "2", 5)
                .with_position_side(PositionSide::Long)
                .with_realized_pnl(d("40")),
        );
        let trades = netter.into_trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].entry_price, d("100"));
        assert_eq!(trades[0].size, d("2"));
        assert!(trades[0].note.contains("before range"));
    }

    #[test]
    fn test_hedge_excess_gets_residual_pnl() {
        let mut netter = DerivativesNetter::new(Venue::Binance);
        let long = |side, px, qty, t| fill(side, px, qty, t).with_position_side(PositionSide::Long);
        netter.process_fill(&long(Side::Buy, "100", "1", 1));
        // 1 in range at 100 plus 1 carried in at 90; venue pnl 20 + 30.
        netter.process_fill(&long(Side::Sell, "120", "2", 2).with_realized_pnl(d("50")));

        let trades = netter.into_trades();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].pnl, d("20"));
        assert_eq!(trades[1].pnl, d("30"));
        assert_eq!(trades[1].entry_price, d("90"));
    }

    #[test]
    fn test_untracked_close_without_pnl_is_dropped() {
        let mut netter = DerivativesNetter::new(Venue::Binance);
        netter.process_fill(
            &fill(Side::Sell, "120", "1", 1).with_position_side(PositionSide::Long),
        );
        assert!(netter.into_trades().is_empty());
    }

    #[test]
    fn test_income_only_symbols_become_zero_size_trades() {
        let mut netter = DerivativesNetter::new(Venue::Binance);
        netter.process_fill(&fill(Side::Buy, "100", "1", 1));

        let income = |symbol: &str, amount: &str, t: i64| RawIncomeEntry {
            symbol: Symbol::from(symbol),
            income_type: IncomeType::RealizedPnl,
            amount: d(amount),
            asset: crate::domain::Asset::from("USDT"),
            time_ms: TimeMs::new(t),
            tran_id: format!("tx{}", t),
        };
        netter.absorb_income(&[
            income("BTCUSDT", "5", 2),
            income("ETHUSDT", "7", 3),
            income("ETHUSDT", "-2", 4),
            income("SOLUSDT", "0", 5),
        ]);

        let trades = netter.into_trades();
        assert_eq!(trades.len(), 2);
        assert!(trades.iter().all(|t| t.size.is_zero()));
        assert_eq!(trades[0].source, "binance_income");
        assert_eq!(trades[1].pnl, d("-2"));
    }

    fn position(side: PositionSide, size: &str, entry: &str) -> OpenPosition {
        OpenPosition {
            symbol: Symbol::from("BTCUSDT"),
            side,
            size: d(size),
            entry_price: d(entry),
            mark_price: None,
            unrealized_pnl: None,
        }
    }

    #[test]
    fn test_seeded_leg_absorbs_crossing_fill() {
        let btc = Symbol::from("BTCUSDT");
        let fills = vec![fill(Side::Sell, "110", "3", 5).with_realized_pnl(d("10"))];
        let positions = vec![position(PositionSide::Short, "2", "110")];

        let seeds = starting_legs(&btc, &positions, &fills);
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].direction, PositionSide::Long);
        assert_eq!(seeds[0].qty, d("1"));
        assert_eq!(seeds[0].entry_hint, None);

        let mut netter = DerivativesNetter::new(Venue::Binance);
        netter.seed(&seeds[0]);
        netter.process_fill(&fills[0]);

        let short = netter.leg(&btc, PositionSide::Both).unwrap();
        assert_eq!(short.direction, PositionSide::Short);
        assert_eq!(short.open_qty, d("2"));

        let trades = netter.into_trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].size, d("1"));
        assert_eq!(trades[0].pnl, d("10"));
        assert_eq!(trades[0].entry_price, d("100"));
        assert!(trades[0].note.contains("opened before range"));
    }

    #[test]
    fn test_hedge_starting_leg_keeps_snapshot_entry() {
        let btc = Symbol::from("BTCUSDT");
        let fills = vec![fill(Side::Sell, "120", "1", 5)
            .with_position_side(PositionSide::Long)
            .with_realized_pnl(d("25"))];
        let positions = vec![position(PositionSide::Long, "1", "95")];

        let seeds = starting_legs(&btc, &positions, &fills);
        assert_eq!(
            seeds,
            vec![StartingLeg {
                symbol: btc.clone(),
                position_side: PositionSide::Long,
                direction: PositionSide::Long,
                qty: d("2"),
                entry_hint: Some(d("95")),
            }]
        );

        let mut netter = DerivativesNetter::new(Venue::Binance);
        netter.seed(&seeds[0]);
        netter.process_fill(&fills[0]);
        let leg = netter.leg(&btc, PositionSide::Long).unwrap();
        assert_eq!(leg.open_qty, d("1"));
        assert_eq!(leg.avg_entry_px, d("95"));
    }

    #[test]
    fn test_no_starting_leg_when_fills_explain_position() {
        let btc = Symbol::from("BTCUSDT");
        let fills = vec![
            fill(Side::Buy, "100", "2", 1),
            fill(Side::Sell, "110", "1", 2),
        ];
        let positions = vec![position(PositionSide::Long, "1", "100")];
        assert!(starting_legs(&btc, &positions, &fills).is_empty());
        assert!(starting_legs(&Symbol::from("ETHUSDT"), &positions, &fills).is_empty());
    }
}
