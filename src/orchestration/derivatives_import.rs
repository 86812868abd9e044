use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::spot_import::{fetch_symbol_fills, Fetch};
use super::{ImportReport, LedgerError, PartialCoverage};
use crate::datasource::{SliceFailure, VenueError, VenueSource};
use crate::domain::{
    sort_trades, Credential, IncomeType, RawIncomeEntry, Symbol, TimeMs, TimeWindow,
};
use crate::engine::{starting_legs, DerivativesNetter};
use crate::pagination::split_windows;

/// Ranges ending this close to now are taken to run up to the open-position
/// snapshot.
const SNAPSHOT_SLACK_MS: i64 = 5 * 60 * 1000;

/// Bounded-date derivatives import.
///
/// Realized-PnL income over the range names the symbols that closed
/// something; open positions add the ones still running. Trade legs of each
/// symbol are then netted, and income left without legs becomes size-zero
/// trades. When the range reaches the present, legs open before it are
/// seeded from the snapshot minus the fills since.
#[derive(Debug, Clone)]
pub struct DerivativesImporter {
    pub window_concurrency: usize,
    pub max_windows: usize,
}

impl DerivativesImporter {
    pub async fn import(
        &self,
        source: &dyn VenueSource,
        credential: &Credential,
        range: TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<ImportReport, LedgerError> {
        let limits = source.limits();
        let income_windows = split_windows(
            range.start,
            range.end,
            limits.income_window_ms,
            self.max_windows,
        )?;
        let fill_windows = split_windows(
            range.start,
            range.end,
            limits.derivatives_window_ms,
            self.max_windows,
        )?;

        let positions = source.fetch_open_positions(credential, cancel).await?;
        let seed_from_snapshot =
            range.end.as_ms() >= TimeMs::now().as_ms().saturating_sub(SNAPSHOT_SLACK_MS);
        let mut coverage = PartialCoverage::default();
        let mut income = self
            .fetch_income(source, credential, &income_windows, cancel, &mut coverage)
            .await?;
        income.sort_by(|a, b| {
            a.time_ms
                .cmp(&b.time_ms)
                .then_with(|| a.tran_id.cmp(&b.tran_id))
        });

        let symbols = income_symbols(&income, positions.iter().map(|p| &p.symbol));
        debug!(
            "{} derivatives import over {}: {} income records, {} symbols",
            source.venue(),
            range,
            income.len(),
            symbols.len()
        );

        let mut netter = DerivativesNetter::new(source.venue());
        for symbol in &symbols {
            if cancel.is_cancelled() {
                return Err(LedgerError::Cancelled);
            }
            let failures_before = coverage.len();
            let fills = fetch_symbol_fills(
                source,
                credential,
                symbol,
                &fill_windows,
                self.window_concurrency,
                cancel,
                &mut coverage,
                Fetch::Derivatives,
            )
            .await?;
            // A gap in the fills would seed the wrong quantity.
            if seed_from_snapshot && coverage.len() == failures_before {
                for leg in starting_legs(symbol, &positions, &fills) {
                    netter.seed(&leg);
                }
            }
            for fill in &fills {
                netter.process_fill(fill);
            }
        }
        netter.absorb_income(&income);

        let open_positions = netter.open_position_count();
        let mut trades = netter.into_trades();
        sort_trades(&mut trades);

        info!(
            "{} derivatives import: {} trades, {} legs still open, {} slices skipped",
            source.venue(),
            trades.len(),
            open_positions,
            coverage.len()
        );

        Ok(ImportReport {
            trades,
            coverage,
            symbols_scanned: symbols.len(),
            open_positions,
        })
    }

    async fn fetch_income(
        &self,
        source: &dyn VenueSource,
        credential: &Credential,
        windows: &[TimeWindow],
        cancel: &CancellationToken,
        coverage: &mut PartialCoverage,
    ) -> Result<Vec<RawIncomeEntry>, LedgerError> {
        let mut requests = Vec::with_capacity(windows.len());
        for window in windows {
            requests.push(income_window(source, credential, *window, cancel));
        }
        let results: Vec<_> = stream::iter(requests)
            .buffered(self.window_concurrency.max(1))
            .collect()
            .await;

        let mut income = Vec::new();
        for (window, result) in results {
            match result {
                Ok(entries) => income.extend(entries),
                Err(VenueError::Cancelled) => return Err(LedgerError::Cancelled),
                // Spot-only venues cannot skip their way to a result.
                Err(e @ VenueError::Unsupported { .. }) => return Err(LedgerError::Venue(e)),
                Err(e) => coverage.record(SliceFailure::new(None, Some(window), e)),
            }
        }
        Ok(income)
    }
}

async fn income_window(
    source: &dyn VenueSource,
    credential: &Credential,
    window: TimeWindow,
    cancel: &CancellationToken,
) -> (TimeWindow, Result<Vec<RawIncomeEntry>, VenueError>) {
    if cancel.is_cancelled() {
        return (window, Err(VenueError::Cancelled));
    }
    (window, source.fetch_income(credential, window, cancel).await)
}

/// Symbols with nonzero realized income, then open-position symbols, in
/// first-seen order.
fn income_symbols<'a>(
    income: &'a [RawIncomeEntry],
    open: impl Iterator<Item = &'a Symbol>,
) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    income
        .iter()
        .filter(|e| e.income_type == IncomeType::RealizedPnl && !e.amount.is_zero())
        .map(|e| &e.symbol)
        .chain(open)
        .filter(|s| !s.as_str().is_empty() && seen.insert((*s).clone()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Asset, Decimal, TimeMs};

    fn entry(symbol: &str, amount: i64) -> RawIncomeEntry {
        RawIncomeEntry {
            symbol: Symbol::from(symbol),
            income_type: IncomeType::RealizedPnl,
            amount: Decimal::from_i64(amount),
            asset: Asset::from("USDT"),
            time_ms: TimeMs::new(1),
            tran_id: String::new(),
        }
    }

    #[test]
    fn test_income_symbols_dedup_in_order() {
        let income = vec![entry("ETHUSDT", 5), entry("BTCUSDT", 0), entry("ETHUSDT", 1)];
        let open = [Symbol::from("SOLUSDT"), Symbol::from("ETHUSDT")];
        let symbols = income_symbols(&income, open.iter());
        assert_eq!(symbols, vec![Symbol::from("ETHUSDT"), Symbol::from("SOLUSDT")]);
    }
}
