//! Stable fill ordering and window-result merging.

use std::collections::HashSet;

use crate::domain::RawFill;

/// Ordering: time_ms -> numeric trade id -> fill key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FillOrderingKey {
    pub time_ms: i64,
    /// Venue trade ids are numeric on every supported venue except Bybit.
    pub numeric_trade_id: Option<i64>,
    pub fill_key: String,
}

impl FillOrderingKey {
    pub fn from_fill(fill: &RawFill) -> Self {
        FillOrderingKey {
            time_ms: fill.time_ms.as_ms(),
            numeric_trade_id: fill.trade_id.as_deref().and_then(|t| t.parse().ok()),
            fill_key: fill.fill_key(),
        }
    }
}

/// Sort fills chronologically with a deterministic tie-break.
pub fn sort_fills_deterministic(fills: &mut [RawFill]) {
    fills.sort_by_cached_key(FillOrderingKey::from_fill);
}

/// Flatten per-window results, drop duplicates and re-sort.
///
/// Netting must only ever see the output of this function: realized totals
/// are invariant to how a range was chunked only once fills are re-sorted.
pub fn merge_window_fills<I>(pages: I) -> Vec<RawFill>
where
    I: IntoIterator<Item = Vec<RawFill>>,
{
    let mut seen = HashSet::new();
    let mut merged: Vec<RawFill> = pages
        .into_iter()
        .flatten()
        .filter(|fill| seen.insert(fill.fill_key()))
        .collect();
    sort_fills_deterministic(&mut merged);
    merged
}
