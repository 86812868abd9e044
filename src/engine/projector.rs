use crate::domain::{
    Decimal, OpenOrder, OpenPosition, PositionOrigin, PositionSide, PriceTable, RunningPosition,
};

/// Live view of open derivative positions and resting spot orders.
///
/// Unrealized PnL is the venue's figure when present, else
/// `(mark - entry) * size * direction`. Entries with no positive size are
/// dropped. Orders are marked at the ticker price, or their own price when
/// the symbol has no quote.
pub fn project_running(
    positions: &[OpenPosition],
    orders: &[OpenOrder],
    prices: &PriceTable,
) -> Vec<RunningPosition> {
    let from_positions = positions
        .iter()
        .filter(|p| p.size.is_positive())
        .map(|p| {
            let mark = p
                .mark_price
                .filter(|m| m.is_positive())
                .or_else(|| prices.get(p.symbol.as_str()))
                .unwrap_or(p.entry_price);
            RunningPosition {
                symbol: p.symbol.clone(),
                side: p.side,
                entry_price: p.entry_price,
                mark_price: mark,
                unrealized_pnl: p
                    .unrealized_pnl
                    .unwrap_or_else(|| unrealized(p.entry_price, mark, p.size, p.side)),
                size: p.size,
                origin: PositionOrigin::DerivativesPosition,
            }
        });

    let from_orders = orders
        .iter()
        .filter(|o| o.open_qty.is_positive())
        .map(|o| {
            let side = PositionSide::opened_by(o.side);
            let mark = prices.get(o.symbol.as_str()).unwrap_or(o.price);
            RunningPosition {
                symbol: o.symbol.clone(),
                side,
                entry_price: o.price,
                mark_price: mark,
                unrealized_pnl: unrealized(o.price, mark, o.open_qty, side),
                size: o.open_qty,
                origin: PositionOrigin::SpotOrder,
            }
        });

    from_positions.chain(from_orders).collect()
}

fn unrealized(entry: Decimal, mark: Decimal, size: Decimal, side: PositionSide) -> Decimal {
    (mark - entry) * size * side.direction()
}
