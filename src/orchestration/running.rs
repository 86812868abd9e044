use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::LedgerError;
use crate::datasource::{VenueError, VenueSource};
use crate::domain::{Credential, RunningPosition};
use crate::engine::project_running;

/// Live unrealized-PnL view across derivative positions and open spot
/// orders. Spot-only venues contribute orders alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningProjector;

impl RunningProjector {
    pub async fn project(
        &self,
        source: &dyn VenueSource,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<RunningPosition>, LedgerError> {
        let (orders, prices) = tokio::try_join!(
            source.fetch_open_orders(credential, cancel),
            source.fetch_ticker_prices(cancel),
        )?;

        let positions = match source.fetch_open_positions(credential, cancel).await {
            Ok(positions) => positions,
            Err(VenueError::Unsupported { .. }) => {
                debug!("{} has no derivatives positions", source.venue());
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(project_running(&positions, &orders, &prices))
    }
}
