//! Domain types for ledger reconstruction.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Domain primitives: TimeMs, Symbol, Asset, Side, PositionSide, Venue
//! - Venue-native inputs (RawFill, RawIncomeEntry, balances, positions)
//! - The Trade output record and deterministic trade ids
//! - Stable fill ordering for deterministic netting

pub mod balance;
pub mod credential;
pub mod decimal;
pub mod fill;
pub mod income;
pub mod market;
pub mod ordering;
pub mod position;
pub mod primitives;
pub mod trade;
pub mod window;

pub use balance::{AssetBalance, BalanceSnapshot};
pub use credential::Credential;
pub use decimal::Decimal;
pub use fill::RawFill;
pub use income::{IncomeType, RawIncomeEntry};
pub use market::{OpenOrder, PriceTable, SymbolCatalog, SymbolInfo};
pub use ordering::{merge_window_fills, sort_fills_deterministic, FillOrderingKey};
pub use position::{OpenPosition, PositionOrigin, RunningPosition};
pub use primitives::{Asset, PositionSide, Side, Symbol, TimeMs, UnknownVenue, Venue};
pub use trade::{source_tag, sort_trades, Trade, TradeIdGenerator, TradeKind};
pub use window::TimeWindow;
