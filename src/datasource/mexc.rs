//! MEXC spot adapter.
//!
//! MEXC's v3 spot API mirrors Binance's response shapes, so the Binance
//! parsers are reused. MEXC has no derivatives support here; those trait
//! methods keep their `Unsupported` defaults.

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::binance::{
    parse_account_balances, parse_exchange_info, parse_open_order, parse_spot_trade,
    parse_ticker_prices, params, window_params,
};
use super::parse::{array, parse_all};
use super::{signer_for, SignedClient, VenueError, VenueLimits, VenueSource};
use crate::pagination::{fetch_window_exhaustive, WindowPage};
use crate::domain::{
    AssetBalance, Credential, OpenOrder, PriceTable, RawFill, Symbol, SymbolCatalog, TimeWindow,
    Venue,
};

/// myTrades page size on MEXC.
const TRADES_LIMIT: usize = 100;

/// Quote used to guess order symbols from held assets.
const ORDER_QUOTE: &str = "USDT";

#[derive(Debug, Clone)]
pub struct MexcSource {
    client: SignedClient,
}

impl MexcSource {
    pub fn new(base_url: &str, recv_window_ms: u64, timeout: Duration) -> Self {
        Self {
            client: SignedClient::new(base_url, signer_for(Venue::Mexc, recv_window_ms), timeout),
        }
    }
}

/// MEXC reports `"1"` for online symbols; older listings say `ENABLED`.
fn is_trading(status: &str) -> bool {
    matches!(status, "1" | "ENABLED" | "TRADING")
}

#[async_trait]
impl VenueSource for MexcSource {
    fn venue(&self) -> Venue {
        Venue::Mexc
    }

    fn limits(&self) -> VenueLimits {
        VenueLimits::days(1, 1, 1)
    }

    async fn fetch_balances(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<AssetBalance>, VenueError> {
        let response = self
            .client
            .signed_get("/api/v3/account", &[], credential, cancel)
            .await?;
        parse_account_balances(&response)
    }

    async fn fetch_ticker_prices(
        &self,
        cancel: &CancellationToken,
    ) -> Result<PriceTable, VenueError> {
        let response = self
            .client
            .public_get("/api/v3/ticker/price", &[], cancel)
            .await?;
        parse_ticker_prices(&response)
    }

    /// MEXC requires a symbol on openOrders, so one request is made per held
    /// asset against its USDT pair. Rejected pairs are logged and skipped.
    async fn fetch_open_orders(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<OpenOrder>, VenueError> {
        let balances = self.fetch_balances(credential, cancel).await?;
        let mut orders = Vec::new();
        for balance in balances.iter().filter(|b| b.asset.as_str() != ORDER_QUOTE) {
            let symbol = format!("{}{}", balance.asset, ORDER_QUOTE);
            let query = params(&[("symbol", symbol.clone())]);
            match self
                .client
                .signed_get("/api/v3/openOrders", &query, credential, cancel)
                .await
            {
                Ok(response) => {
                    orders.extend(parse_all(array(&response, "orders")?, "open order", parse_open_order))
                }
                Err(VenueError::Cancelled) => return Err(VenueError::Cancelled),
                Err(e @ VenueError::Authentication(_)) => return Err(e),
                Err(e) => warn!("Skipping open orders for {}: {}", symbol, e),
            }
        }
        Ok(orders)
    }

    async fn fetch_symbol_catalog(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SymbolCatalog, VenueError> {
        let response = self
            .client
            .public_get("/api/v3/exchangeInfo", &[], cancel)
            .await?;
        parse_exchange_info(&response, is_trading)
    }

    async fn fetch_spot_fills(
        &self,
        credential: &Credential,
        symbol: &Symbol,
        window: TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawFill>, VenueError> {
        debug!("Fetching mexc spot fills for {} in {}", symbol, window);
        let client = &self.client;
        fetch_window_exhaustive(window, TRADES_LIMIT, cancel, move |w| async move {
            let response = client
                .signed_get(
                    "/api/v3/myTrades",
                    &window_params(symbol, w, TRADES_LIMIT),
                    credential,
                    cancel,
                )
                .await?;
            let rows = array(&response, "trades")?;
            let fills = parse_all(rows, "spot trade", |row| parse_spot_trade(row, symbol));
            Ok::<_, VenueError>(WindowPage::new(rows.len(), fills))
        })
        .await
    }
}
