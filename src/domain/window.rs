use serde::{Deserialize, Serialize};

use crate::domain::TimeMs;

/// Inclusive millisecond range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub start: TimeMs,
    pub end: TimeMs,
}

impl TimeWindow {
    /// `None` when `start > end`.
    pub fn new(start: TimeMs, end: TimeMs) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Number of milliseconds covered, both ends included.
    pub fn span_ms(&self) -> i64 {
        self.end.as_ms() - self.start.as_ms() + 1
    }

    pub fn contains(&self, t: TimeMs) -> bool {
        self.start <= t && t <= self.end
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start.as_ms(), self.end.as_ms())
    }
}
