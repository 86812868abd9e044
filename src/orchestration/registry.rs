use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::LedgerError;
use crate::config::Config;
use crate::datasource::{BinanceSource, BybitSource, MexcSource, VenueSource};
use crate::domain::Venue;

/// One [`VenueSource`] per supported venue.
#[derive(Debug, Clone, Default)]
pub struct VenueRegistry {
    sources: HashMap<Venue, Arc<dyn VenueSource>>,
}

impl VenueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live REST adapters for every venue.
    pub fn from_config(config: &Config) -> Self {
        let timeout = Duration::from_millis(config.http_timeout_ms);
        Self::new()
            .with_source(Arc::new(BinanceSource::new(
                &config.binance_spot_url,
                &config.binance_futures_url,
                config.recv_window_ms,
                timeout,
            )))
            .with_source(Arc::new(BybitSource::new(
                &config.bybit_api_url,
                config.recv_window_ms,
                timeout,
                config.max_cursor_pages,
            )))
            .with_source(Arc::new(MexcSource::new(
                &config.mexc_api_url,
                config.recv_window_ms,
                timeout,
            )))
    }

    /// Register `source` under its own venue, replacing any previous one.
    pub fn with_source(mut self, source: Arc<dyn VenueSource>) -> Self {
        self.sources.insert(source.venue(), source);
        self
    }

    pub fn get(&self, venue: Venue) -> Result<Arc<dyn VenueSource>, LedgerError> {
        self.sources
            .get(&venue)
            .cloned()
            .ok_or(LedgerError::UnknownVenue(venue))
    }
}
