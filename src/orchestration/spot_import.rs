use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ImportReport, LedgerError, PartialCoverage};
use crate::datasource::{SliceFailure, VenueError, VenueSource};
use crate::domain::{
    merge_window_fills, sort_trades, Asset, Credential, RawFill, Symbol, TimeWindow,
};
use crate::engine::{discover_symbols, SpotNetter};
use crate::pagination::split_windows;

/// Spot trade-history import: discover symbols, fetch every window per
/// symbol, net the merged fills.
///
/// Symbols run one after another; the windows of one symbol run
/// concurrently up to `window_concurrency` and are merged before netting.
#[derive(Debug, Clone)]
pub struct SpotImporter {
    pub quote_priority: Vec<Asset>,
    pub symbol_cap: usize,
    pub window_concurrency: usize,
    pub max_windows: usize,
}

impl SpotImporter {
    pub async fn import(
        &self,
        source: &dyn VenueSource,
        credential: &Credential,
        range: TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<ImportReport, LedgerError> {
        let windows = split_windows(
            range.start,
            range.end,
            source.limits().spot_window_ms,
            self.max_windows,
        )?;

        let (balances, orders, catalog) = tokio::try_join!(
            source.fetch_balances(credential, cancel),
            source.fetch_open_orders(credential, cancel),
            source.fetch_symbol_catalog(cancel),
        )?;
        let symbols = discover_symbols(
            &orders,
            &balances,
            &catalog,
            &self.quote_priority,
            self.symbol_cap,
        );
        debug!(
            "{} spot import over {}: {} symbols x {} windows",
            source.venue(),
            range,
            symbols.len(),
            windows.len()
        );

        let mut netter = SpotNetter::new(source.venue());
        let mut coverage = PartialCoverage::default();

        for symbol in &symbols {
            if cancel.is_cancelled() {
                return Err(LedgerError::Cancelled);
            }
            let fills = fetch_symbol_fills(
                source,
                credential,
                symbol,
                &windows,
                self.window_concurrency,
                cancel,
                &mut coverage,
                Fetch::Spot,
            )
            .await?;
            for fill in &fills {
                netter.process_fill(fill);
            }
        }

        let open_positions = netter.open_positions();
        let mut trades = netter.into_trades();
        sort_trades(&mut trades);

        info!(
            "{} spot import: {} trades from {} symbols, {} slices skipped",
            source.venue(),
            trades.len(),
            symbols.len(),
            coverage.len()
        );

        Ok(ImportReport {
            trades,
            coverage,
            symbols_scanned: symbols.len(),
            open_positions,
        })
    }
}

/// Which fill endpoint to page through.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fetch {
    Spot,
    Derivatives,
}

async fn fetch_window(
    source: &dyn VenueSource,
    credential: &Credential,
    symbol: &Symbol,
    window: TimeWindow,
    cancel: &CancellationToken,
    fetch: Fetch,
) -> (TimeWindow, Result<Vec<RawFill>, VenueError>) {
    if cancel.is_cancelled() {
        return (window, Err(VenueError::Cancelled));
    }
    let result = match fetch {
        Fetch::Spot => source.fetch_spot_fills(credential, symbol, window, cancel).await,
        Fetch::Derivatives => {
            source
                .fetch_derivative_fills(credential, symbol, window, cancel)
                .await
        }
    };
    (window, result)
}

/// All fills of one symbol over `windows`, merged and sorted. Failed
/// windows are recorded in `coverage`; cancellation aborts.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn fetch_symbol_fills(
    source: &dyn VenueSource,
    credential: &Credential,
    symbol: &Symbol,
    windows: &[TimeWindow],
    concurrency: usize,
    cancel: &CancellationToken,
    coverage: &mut PartialCoverage,
    fetch: Fetch,
) -> Result<Vec<RawFill>, LedgerError> {
    let mut requests = Vec::with_capacity(windows.len());
    for window in windows {
        requests.push(fetch_window(source, credential, symbol, *window, cancel, fetch));
    }
    let results: Vec<_> = stream::iter(requests)
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut pages = Vec::with_capacity(results.len());
    for (window, result) in results {
        match result {
            Ok(fills) => pages.push(fills),
            Err(VenueError::Cancelled) => return Err(LedgerError::Cancelled),
            Err(e) => coverage.record(SliceFailure::new(Some(symbol.clone()), Some(window), e)),
        }
    }
    Ok(merge_window_fills(pages))
}
