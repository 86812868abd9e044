pub mod api;
pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod pagination;

pub use config::Config;
pub use datasource::{
    BinanceSource, BybitSource, MexcSource, MockVenueSource, SliceFailure, VenueError, VenueSource,
};
pub use domain::{
    Asset, BalanceSnapshot, Credential, Decimal, PositionSide, RawFill, RawIncomeEntry,
    RunningPosition, Side, Symbol, TimeMs, TimeWindow, Trade, Venue,
};
pub use error::AppError;
pub use orchestration::{ImportReport, Ledger, LedgerError, PartialCoverage, VenueRegistry};
