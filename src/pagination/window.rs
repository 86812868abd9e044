//! Splitting a requested range into venue-legal query windows.

use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::datasource::VenueError;
use crate::domain::{TimeMs, TimeWindow};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange { start: i64, end: i64 },
    #[error("Invalid window span: {0}ms (must be positive)")]
    InvalidSpan(i64),
    #[error("Range needs {count} windows of {span_ms}ms; at most {max} are allowed")]
    TooManyWindows { count: u128, span_ms: i64, max: usize },
}

/// Validate a caller-supplied range before any network call.
pub fn validate_range(start: TimeMs, end: TimeMs) -> Result<TimeWindow, WindowError> {
    TimeWindow::new(start, end).ok_or(WindowError::InvalidRange {
        start: start.as_ms(),
        end: end.as_ms(),
    })
}

/// Split `[start, end]` into contiguous windows of at most `max_span_ms`
/// milliseconds each (both ends inclusive).
///
/// The first window starts at `start`, the last one ends at `end`, and each
/// window begins one millisecond after the previous one ends. Ranges that
/// would need more than `max_windows` windows are rejected before anything
/// is allocated.
pub fn split_windows(
    start: TimeMs,
    end: TimeMs,
    max_span_ms: i64,
    max_windows: usize,
) -> Result<Vec<TimeWindow>, WindowError> {
    let range = validate_range(start, end)?;
    if max_span_ms <= 0 {
        return Err(WindowError::InvalidSpan(max_span_ms));
    }
    let count = window_count(range, max_span_ms);
    if count > max_windows as u128 {
        return Err(WindowError::TooManyWindows {
            count,
            span_ms: max_span_ms,
            max: max_windows,
        });
    }

    let mut windows = Vec::new();
    let mut cursor = range.start.as_ms();
    let last = range.end.as_ms();
    loop {
        let window_end = cursor.saturating_add(max_span_ms - 1).min(last);
        windows.push(TimeWindow {
            start: TimeMs::new(cursor),
            end: TimeMs::new(window_end),
        });
        if window_end >= last {
            break;
        }
        cursor = window_end + 1;
    }
    Ok(windows)
}

fn window_count(range: TimeWindow, max_span_ms: i64) -> u128 {
    let total = (range.end.as_ms() as i128 - range.start.as_ms() as i128 + 1) as u128;
    total.div_ceil(max_span_ms as u128)
}

/// Rows a single window query returned, next to the ones that parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPage<T> {
    pub rows: usize,
    pub items: Vec<T>,
}

impl<T> WindowPage<T> {
    pub fn new(rows: usize, items: Vec<T>) -> Self {
        Self { rows, items }
    }
}

/// Fetch everything inside `window` from an endpoint that returns at most
/// `limit` rows per call.
///
/// A full page may hide rows, so its window is halved and both halves are
/// fetched again, earliest first. A full page for a 1 ms window yields
/// [`VenueError::Truncated`].
pub async fn fetch_window_exhaustive<T, F, Fut>(
    window: TimeWindow,
    limit: usize,
    cancel: &CancellationToken,
    mut fetch: F,
) -> Result<Vec<T>, VenueError>
where
    F: FnMut(TimeWindow) -> Fut,
    Fut: Future<Output = Result<WindowPage<T>, VenueError>>,
{
    let mut items = Vec::new();
    let mut pending = vec![window];

    while let Some(next) = pending.pop() {
        if cancel.is_cancelled() {
            return Err(VenueError::Cancelled);
        }
        let page = fetch(next).await?;
        if page.rows < limit {
            items.extend(page.items);
            continue;
        }
        let Some((earlier, later)) = halve(next) else {
            return Err(VenueError::Truncated {
                window: next,
                limit,
            });
        };
        debug!("{} returned {} rows, splitting", next, page.rows);
        pending.push(later);
        pending.push(earlier);
    }
    Ok(items)
}

fn halve(window: TimeWindow) -> Option<(TimeWindow, TimeWindow)> {
    let (start, end) = (window.start.as_ms(), window.end.as_ms());
    if start >= end {
        return None;
    }
    let mid = (start as i128 + end as i128).div_euclid(2) as i64;
    Some((
        TimeWindow {
            start: window.start,
            end: TimeMs::new(mid),
        },
        TimeWindow {
            start: TimeMs::new(mid + 1),
            end: window.end,
        },
    ))
}
