//! Pure computation engines for deterministic ledger logic.
//!
//! Nothing here performs I/O: the netters consume fills already merged and
//! sorted by [`crate::domain::merge_window_fills`], and valuation, discovery
//! and projection work on snapshots fetched by the orchestration layer.

pub mod derivatives_netting;
pub mod fees;
pub mod projector;
pub mod spot_netting;
pub mod symbols;
pub mod valuation;

pub use derivatives_netting::{starting_legs, DerivativesNetter, LegState, StartingLeg};
pub use fees::{fee_in_quote, ExcludedFee};
pub use projector::project_running;
pub use spot_netting::{net_spot_fills, SpotNetter, SpotPosition};
pub use symbols::discover_symbols;
pub use valuation::{SpotValuation, ValuationPolicy, STABLE_ASSETS};
