use serde::Serialize;
use tracing::warn;

use crate::datasource::SliceFailure;
use crate::domain::Trade;

/// Symbols and windows an import had to skip. An empty list means full
/// coverage of the requested range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialCoverage {
    pub failures: Vec<SliceFailure>,
}

impl PartialCoverage {
    pub fn record(&mut self, failure: SliceFailure) {
        warn!("Skipping {}", failure);
        self.failures.push(failure);
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub trades: Vec<Trade>,
    pub coverage: PartialCoverage,
    pub symbols_scanned: usize,
    /// Legs still open when the range ended.
    pub open_positions: usize,
}
