//! Venue abstraction for fetching balances, fills, income and positions.

use crate::domain::{
    AssetBalance, Credential, Decimal, OpenOrder, OpenPosition, PriceTable, RawFill,
    RawIncomeEntry, Symbol, SymbolCatalog, TimeWindow, Venue,
};
use async_trait::async_trait;
use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod binance;
pub mod bybit;
pub mod client;
pub mod mexc;
pub mod mock;
mod parse;
pub mod signing;

pub use binance::BinanceSource;
pub use bybit::BybitSource;
pub use client::SignedClient;
pub use mexc::MexcSource;
pub use mock::MockVenueSource;
pub use signing::{signer_for, HeaderSigner, QuerySigner, RequestSigner, SignedParts};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Spot,
    Derivatives,
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::Spot => write!(f, "spot"),
            Market::Derivatives => write!(f, "derivatives"),
        }
    }
}

/// Maximum query spans the venue accepts per endpoint family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VenueLimits {
    pub spot_window_ms: i64,
    pub derivatives_window_ms: i64,
    pub income_window_ms: i64,
}

impl VenueLimits {
    pub const fn days(spot: i64, derivatives: i64, income: i64) -> Self {
        Self {
            spot_window_ms: spot * DAY_MS,
            derivatives_window_ms: derivatives * DAY_MS,
            income_window_ms: income * DAY_MS,
        }
    }
}

/// One venue account's data, behind signed REST calls.
///
/// Implementations never retry: a failed call is reported and the caller
/// decides. Every call races `cancel` and yields [`VenueError::Cancelled`]
/// once it fires. Derivatives methods default to [`VenueError::Unsupported`]
/// for spot-only venues.
#[async_trait]
pub trait VenueSource: Send + Sync + fmt::Debug {
    fn venue(&self) -> Venue;

    fn limits(&self) -> VenueLimits;

    async fn fetch_balances(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<AssetBalance>, VenueError>;

    /// Public last-price table for every spot symbol.
    async fn fetch_ticker_prices(&self, cancel: &CancellationToken)
        -> Result<PriceTable, VenueError>;

    async fn fetch_open_orders(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<OpenOrder>, VenueError>;

    async fn fetch_symbol_catalog(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SymbolCatalog, VenueError>;

    /// Spot fills for one symbol inside one venue-legal window.
    async fn fetch_spot_fills(
        &self,
        credential: &Credential,
        symbol: &Symbol,
        window: TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawFill>, VenueError>;

    /// Derivatives account equity in the settlement currency.
    async fn fetch_derivatives_equity(
        &self,
        _credential: &Credential,
        _cancel: &CancellationToken,
    ) -> Result<Decimal, VenueError> {
        Err(VenueError::unsupported(self.venue(), Market::Derivatives))
    }

    /// Realized-PnL income records inside one window.
    async fn fetch_income(
        &self,
        _credential: &Credential,
        _window: TimeWindow,
        _cancel: &CancellationToken,
    ) -> Result<Vec<RawIncomeEntry>, VenueError> {
        Err(VenueError::unsupported(self.venue(), Market::Derivatives))
    }

    async fn fetch_derivative_fills(
        &self,
        _credential: &Credential,
        _symbol: &Symbol,
        _window: TimeWindow,
        _cancel: &CancellationToken,
    ) -> Result<Vec<RawFill>, VenueError> {
        Err(VenueError::unsupported(self.venue(), Market::Derivatives))
    }

    async fn fetch_open_positions(
        &self,
        _credential: &Credential,
        _cancel: &CancellationToken,
    ) -> Result<Vec<OpenPosition>, VenueError> {
        Err(VenueError::unsupported(self.venue(), Market::Derivatives))
    }
}

/// Error type for venue operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VenueError {
    /// Missing or rejected credential. Not retried.
    #[error("Authentication error: {0}")]
    Authentication(String),
    /// Network-level failure (connect, timeout, reset).
    #[error("Transport error: {0}")]
    Transport(String),
    /// Non-success response, with the venue's own message when parseable.
    #[error("Venue error {status}: {message}")]
    Venue { status: u16, message: String },
    /// Response body did not have the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("{venue} does not offer {market} data")]
    Unsupported { venue: Venue, market: Market },
    /// A window too narrow to split still filled a whole page.
    #[error("Window {window} still returned the {limit} row limit; rows may be missing")]
    Truncated { window: TimeWindow, limit: usize },
    /// Cooperative abort; distinct from failure.
    #[error("Cancelled")]
    Cancelled,
}

impl VenueError {
    pub fn unsupported(venue: Venue, market: Market) -> Self {
        VenueError::Unsupported { venue, market }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, VenueError::Cancelled)
    }
}

/// A symbol or window that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceFailure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<Symbol>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<TimeWindow>,
    #[serde(serialize_with = "serialize_display")]
    pub error: VenueError,
}

impl SliceFailure {
    pub fn new(symbol: Option<Symbol>, window: Option<TimeWindow>, error: VenueError) -> Self {
        Self {
            symbol,
            window,
            error,
        }
    }
}

impl fmt::Display for SliceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.symbol, &self.window) {
            (Some(s), Some(w)) => write!(f, "{} {}: {}", s, w, self.error),
            (Some(s), None) => write!(f, "{}: {}", s, self.error),
            (None, Some(w)) => write!(f, "{}: {}", w, self.error),
            (None, None) => write!(f, "{}", self.error),
        }
    }
}

fn serialize_display<S: Serializer, T: fmt::Display>(value: &T, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TimeMs;

    #[test]
    fn test_venue_error_display() {
        let err = VenueError::Transport("connection reset".to_string());
        assert_eq!(err.to_string(), "Transport error: connection reset");

        let err = VenueError::Venue {
            status: 400,
            message: "Invalid symbol.".to_string(),
        };
        assert_eq!(err.to_string(), "Venue error 400: Invalid symbol.");

        let err = VenueError::unsupported(Venue::Mexc, Market::Derivatives);
        assert_eq!(err.to_string(), "mexc does not offer derivatives data");
    }

    #[test]
    fn test_slice_failure_serializes_error_as_text() {
        let failure = SliceFailure::new(
            Some(Symbol::from("BTCUSDT")),
            TimeWindow::new(TimeMs::new(0), TimeMs::new(9)),
            VenueError::Transport("timeout".to_string()),
        );
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["symbol"], "BTCUSDT");
        assert_eq!(json["window"]["start"], 0);
        assert_eq!(json["error"], "Transport error: timeout");
        assert_eq!(failure.to_string(), "BTCUSDT [0, 9]: Transport error: timeout");
    }

    #[test]
    fn test_limits_in_days() {
        let limits = VenueLimits::days(1, 7, 7);
        assert_eq!(limits.spot_window_ms, 86_400_000);
        assert_eq!(limits.derivatives_window_ms, 7 * 86_400_000);
    }
}
