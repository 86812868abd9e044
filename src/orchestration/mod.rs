//! Caller-facing ledger operations over the venue and engine layers.

pub mod balance;
pub mod derivatives_import;
pub mod ledger;
pub mod registry;
pub mod report;
pub mod running;
pub mod spot_import;

pub use balance::BalanceAggregator;
pub use derivatives_import::DerivativesImporter;
pub use ledger::Ledger;
pub use registry::VenueRegistry;
pub use report::{ImportReport, PartialCoverage};
pub use running::RunningProjector;
pub use spot_import::SpotImporter;

use thiserror::Error;

use crate::datasource::VenueError;
use crate::domain::Venue;
use crate::pagination::WindowError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// A call the operation cannot proceed without failed.
    #[error(transparent)]
    Venue(VenueError),
    /// Rejected before any network call.
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("Import cancelled")]
    Cancelled,
    #[error("Venue {0} is not configured")]
    UnknownVenue(Venue),
}

impl From<VenueError> for LedgerError {
    fn from(err: VenueError) -> Self {
        match err {
            VenueError::Cancelled => LedgerError::Cancelled,
            other => LedgerError::Venue(other),
        }
    }
}
