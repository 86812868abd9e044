use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{
    BalanceAggregator, DerivativesImporter, ImportReport, LedgerError, RunningProjector,
    SpotImporter, VenueRegistry,
};
use crate::config::Config;
use crate::domain::{BalanceSnapshot, Credential, RunningPosition, TimeMs};
use crate::engine::ValuationPolicy;
use crate::pagination::validate_range;

/// Entry point for the four ledger operations. Holds no per-import state:
/// every call builds its own netting tables.
#[derive(Debug, Clone)]
pub struct Ledger {
    registry: VenueRegistry,
    config: Arc<Config>,
}

impl Ledger {
    pub fn new(registry: VenueRegistry, config: Config) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }

    pub fn from_config(config: Config) -> Self {
        Self::new(VenueRegistry::from_config(&config), config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn balance_snapshot(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<BalanceSnapshot, LedgerError> {
        let source = self.registry.get(credential.venue)?;
        let policy = ValuationPolicy::new(
            self.config.quote_asset.clone(),
            self.config.bridge_assets.clone(),
        );
        BalanceAggregator::new(policy)
            .snapshot(source.as_ref(), credential, cancel)
            .await
    }

    /// Spot history over `range`, or the configured lookback ending now.
    pub async fn import_trade_history(
        &self,
        credential: &Credential,
        range: Option<(TimeMs, TimeMs)>,
        cancel: &CancellationToken,
    ) -> Result<ImportReport, LedgerError> {
        let (start, end) = range.unwrap_or_else(|| {
            let now = TimeMs::now();
            (
                TimeMs::new(now.as_ms() - self.config.history_lookback_ms),
                now,
            )
        });
        let range = validate_range(start, end)?;
        let source = self.registry.get(credential.venue)?;
        info!("Importing {} spot history over {}", credential.venue, range);

        SpotImporter {
            quote_priority: self.config.quote_priority.clone(),
            symbol_cap: self.config.symbol_cap,
            window_concurrency: self.config.window_concurrency,
            max_windows: self.config.max_windows,
        }
        .import(source.as_ref(), credential, range, cancel)
        .await
    }

    pub async fn import_derivatives(
        &self,
        credential: &Credential,
        start: TimeMs,
        end: TimeMs,
        cancel: &CancellationToken,
    ) -> Result<ImportReport, LedgerError> {
        let range = validate_range(start, end)?;
        let source = self.registry.get(credential.venue)?;
        info!("Importing {} derivatives over {}", credential.venue, range);

        DerivativesImporter {
            window_concurrency: self.config.window_concurrency,
            max_windows: self.config.max_windows,
        }
        .import(source.as_ref(), credential, range, cancel)
        .await
    }

    pub async fn running_positions(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<RunningPosition>, LedgerError> {
        let source = self.registry.get(credential.venue)?;
        RunningProjector
            .project(source.as_ref(), credential, cancel)
            .await
    }
}
