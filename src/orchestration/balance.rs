use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::LedgerError;
use crate::datasource::{VenueError, VenueSource};
use crate::domain::{Asset, BalanceSnapshot, Credential, Decimal};
use crate::engine::ValuationPolicy;

/// Settlement currency of the derivatives equity figures.
const DERIVATIVES_SETTLE: &str = "USDT";

/// Account value in one quote currency across spot and derivatives.
#[derive(Debug, Clone)]
pub struct BalanceAggregator {
    policy: ValuationPolicy,
}

impl BalanceAggregator {
    pub fn new(policy: ValuationPolicy) -> Self {
        Self { policy }
    }

    /// Balances and tickers must load; one unpriceable asset or a missing
    /// derivatives permission only narrows the snapshot.
    pub async fn snapshot(
        &self,
        source: &dyn VenueSource,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<BalanceSnapshot, LedgerError> {
        let (balances, prices) = tokio::try_join!(
            source.fetch_balances(credential, cancel),
            source.fetch_ticker_prices(cancel),
        )?;
        let spot = self.policy.value_balances(&balances, &prices);
        if !spot.unpriced.is_empty() {
            warn!(
                "{} assets have no conversion path to {}: {:?}",
                spot.unpriced.len(),
                self.policy.quote,
                spot.unpriced
            );
        }

        let (derivatives_value, derivatives_available) =
            match source.fetch_derivatives_equity(credential, cancel).await {
                Ok(equity) => {
                    let settle = Asset::from(DERIVATIVES_SETTLE);
                    let value = self
                        .policy
                        .value_in_quote(&settle, equity, &prices)
                        .unwrap_or_else(|| {
                            warn!("No {} rate for {}; using equity as-is", settle, self.policy.quote);
                            equity
                        });
                    (value, true)
                }
                Err(VenueError::Cancelled) => return Err(LedgerError::Cancelled),
                Err(e) => {
                    warn!("{} derivatives equity unavailable: {}", source.venue(), e);
                    (Decimal::zero(), false)
                }
            };

        debug!(
            "{} snapshot: spot {} + derivatives {}",
            source.venue(),
            spot.total,
            derivatives_value
        );

        Ok(BalanceSnapshot {
            quote_asset: self.policy.quote.clone(),
            spot_value: spot.total,
            derivatives_value,
            total: spot.total + derivatives_value,
            derivatives_available,
            unpriced_assets: spot.unpriced,
        })
    }
}
