//! Mock venue for testing without network calls.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{Market, VenueError, VenueLimits, VenueSource};
use crate::domain::{
    AssetBalance, Credential, Decimal, OpenOrder, OpenPosition, PriceTable, RawFill,
    RawIncomeEntry, Symbol, SymbolCatalog, SymbolInfo, TimeMs, TimeWindow, Venue,
};

/// Venue that serves predefined data and records every call it receives.
///
/// Fill and income lookups honour the requested window, so coverage and
/// window-splitting behaviour can be asserted against it.
#[derive(Debug)]
pub struct MockVenueSource {
    venue: Venue,
    limits: VenueLimits,
    balances: Vec<AssetBalance>,
    prices: PriceTable,
    orders: Vec<OpenOrder>,
    symbols: Vec<SymbolInfo>,
    spot_fills: Vec<RawFill>,
    derivatives: bool,
    derivatives_equity: Option<Decimal>,
    income: Vec<RawIncomeEntry>,
    derivative_fills: Vec<RawFill>,
    positions: Vec<OpenPosition>,
    failing_symbols: HashSet<Symbol>,
    failing_windows: Vec<TimeMs>,
    cancel_on: Option<(Symbol, CancellationToken)>,
    calls: Mutex<Vec<String>>,
}

impl MockVenueSource {
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            limits: VenueLimits::days(1, 7, 7),
            balances: Vec::new(),
            prices: PriceTable::new(),
            orders: Vec::new(),
            symbols: Vec::new(),
            spot_fills: Vec::new(),
            derivatives: true,
            derivatives_equity: None,
            income: Vec::new(),
            derivative_fills: Vec::new(),
            positions: Vec::new(),
            failing_symbols: HashSet::new(),
            failing_windows: Vec::new(),
            cancel_on: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_limits(mut self, limits: VenueLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_balance(mut self, balance: AssetBalance) -> Self {
        self.balances.push(balance);
        self
    }

    pub fn with_price(mut self, symbol: &str, price: Decimal) -> Self {
        self.prices.insert(symbol, price);
        self
    }

    pub fn with_order(mut self, order: OpenOrder) -> Self {
        self.orders.push(order);
        self
    }

    pub fn with_symbol(mut self, info: SymbolInfo) -> Self {
        self.symbols.push(info);
        self
    }

    pub fn with_spot_fills(mut self, fills: Vec<RawFill>) -> Self {
        self.spot_fills.extend(fills);
        self
    }

    /// Spot-only venue: every derivatives call is `Unsupported`.
    pub fn spot_only(mut self) -> Self {
        self.derivatives = false;
        self
    }

    /// Without this the equity call fails with a permission error.
    pub fn with_derivatives_equity(mut self, equity: Decimal) -> Self {
        self.derivatives_equity = Some(equity);
        self
    }

    pub fn with_income(mut self, entries: Vec<RawIncomeEntry>) -> Self {
        self.income.extend(entries);
        self
    }

    pub fn with_derivative_fills(mut self, fills: Vec<RawFill>) -> Self {
        self.derivative_fills.extend(fills);
        self
    }

    pub fn with_position(mut self, position: OpenPosition) -> Self {
        self.positions.push(position);
        self
    }

    /// Every fill request for `symbol` fails with a transport error.
    pub fn failing_symbol(mut self, symbol: &str) -> Self {
        self.failing_symbols.insert(Symbol::from(symbol));
        self
    }

    /// Fill and income requests whose window contains `t` fail.
    pub fn failing_window_at(mut self, t: TimeMs) -> Self {
        self.failing_windows.push(t);
        self
    }

    /// Cancel `token` as soon as fills for `symbol` are requested.
    pub fn cancelling_on(mut self, symbol: &str, token: CancellationToken) -> Self {
        self.cancel_on = Some((Symbol::from(symbol), token));
        self
    }

    /// Calls received so far, e.g. `spot_fills BTCUSDT [0, 99]`.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn check(
        &self,
        credential: Option<&Credential>,
        cancel: &CancellationToken,
    ) -> Result<(), VenueError> {
        if cancel.is_cancelled() {
            return Err(VenueError::Cancelled);
        }
        match credential {
            Some(c) if !c.is_complete() => Err(VenueError::Authentication(format!(
                "{} API key and secret are required",
                self.venue
            ))),
            _ => Ok(()),
        }
    }

    fn check_derivatives(&self) -> Result<(), VenueError> {
        if self.derivatives {
            Ok(())
        } else {
            Err(VenueError::unsupported(self.venue, Market::Derivatives))
        }
    }

    fn check_window(&self, symbol: Option<&Symbol>, window: TimeWindow) -> Result<(), VenueError> {
        if let Some((cancel_symbol, token)) = &self.cancel_on {
            if symbol == Some(cancel_symbol) {
                token.cancel();
                return Err(VenueError::Cancelled);
            }
        }
        if symbol.is_some_and(|s| self.failing_symbols.contains(s)) {
            return Err(VenueError::Transport("connection reset".to_string()));
        }
        if self.failing_windows.iter().any(|t| window.contains(*t)) {
            return Err(VenueError::Venue {
                status: 500,
                message: "internal error".to_string(),
            });
        }
        Ok(())
    }
}

fn in_window<'a>(
    fills: &'a [RawFill],
    symbol: &'a Symbol,
    window: TimeWindow,
) -> impl Iterator<Item = RawFill> + 'a {
    fills
        .iter()
        .filter(move |f| &f.symbol == symbol && window.contains(f.time_ms))
        .cloned()
}

#[async_trait]
impl VenueSource for MockVenueSource {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn limits(&self) -> VenueLimits {
        self.limits
    }

    async fn fetch_balances(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<AssetBalance>, VenueError> {
        self.record("balances".to_string());
        self.check(Some(credential), cancel)?;
        Ok(self.balances.clone())
    }

    async fn fetch_ticker_prices(
        &self,
        cancel: &CancellationToken,
    ) -> Result<PriceTable, VenueError> {
        self.record("prices".to_string());
        self.check(None, cancel)?;
        Ok(self.prices.clone())
    }

    async fn fetch_open_orders(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<OpenOrder>, VenueError> {
        self.record("open_orders".to_string());
        self.check(Some(credential), cancel)?;
        Ok(self.orders.clone())
    }

    async fn fetch_symbol_catalog(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SymbolCatalog, VenueError> {
        self.record("catalog".to_string());
        self.check(None, cancel)?;
        Ok(SymbolCatalog::new(self.symbols.clone()))
    }

    async fn fetch_spot_fills(
        &self,
        credential: &Credential,
        symbol: &Symbol,
        window: TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawFill>, VenueError> {
        self.record(format!("spot_fills {} {}", symbol, window));
        self.check(Some(credential), cancel)?;
        self.check_window(Some(symbol), window)?;
        Ok(in_window(&self.spot_fills, symbol, window).collect())
    }

    async fn fetch_derivatives_equity(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Decimal, VenueError> {
        self.record("derivatives_equity".to_string());
        self.check(Some(credential), cancel)?;
        self.check_derivatives()?;
        self.derivatives_equity.ok_or_else(|| VenueError::Venue {
            status: 403,
            message: "no futures permission".to_string(),
        })
    }

    async fn fetch_income(
        &self,
        credential: &Credential,
        window: TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawIncomeEntry>, VenueError> {
        self.record(format!("income {}", window));
        self.check(Some(credential), cancel)?;
        self.check_derivatives()?;
        self.check_window(None, window)?;
        Ok(self
            .income
            .iter()
            .filter(|e| window.contains(e.time_ms))
            .cloned()
            .collect())
    }

    async fn fetch_derivative_fills(
        &self,
        credential: &Credential,
        symbol: &Symbol,
        window: TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawFill>, VenueError> {
        self.record(format!("derivative_fills {} {}", symbol, window));
        self.check(Some(credential), cancel)?;
        self.check_derivatives()?;
        self.check_window(Some(symbol), window)?;
        Ok(in_window(&self.derivative_fills, symbol, window).collect())
    }

    async fn fetch_open_positions(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<OpenPosition>, VenueError> {
        self.record("positions".to_string());
        self.check(Some(credential), cancel)?;
        self.check_derivatives()?;
        Ok(self.positions.clone())
    }
}
