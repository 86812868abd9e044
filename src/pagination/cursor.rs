//! Continuation-token pagination.

use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::datasource::VenueError;

/// One page of a cursor-paginated endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> CursorPage<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }
}

/// Drive `fetch_page` until the venue signals the end.
///
/// Stops on an empty page, a missing or empty next token, a token equal to
/// the one just used, or after `max_pages` requests. Cancellation is checked
/// before every request.
pub async fn paginate_cursor<T, F, Fut>(
    cancel: &CancellationToken,
    max_pages: usize,
    mut fetch_page: F,
) -> Result<Vec<T>, VenueError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<CursorPage<T>, VenueError>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;

    for page_no in 0..max_pages {
        if cancel.is_cancelled() {
            return Err(VenueError::Cancelled);
        }

        let page = fetch_page(cursor.clone()).await?;
        if page.items.is_empty() {
            break;
        }
        items.extend(page.items);

        match page.next_cursor.filter(|c| !c.is_empty()) {
            None => break,
            Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                warn!("Venue repeated cursor {} on page {}, stopping", next, page_no);
                break;
            }
            Some(next) => {
                if page_no + 1 == max_pages {
                    warn!(
                        "Cursor pagination hit the {} page cap; results may be truncated",
                        max_pages
                    );
                }
                cursor = Some(next);
            }
        }
    }

    debug!("Cursor pagination collected {} items", items.len());
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_follows_cursor_until_missing_token() {
        let cancel = CancellationToken::new();
        let items = paginate_cursor(&cancel, 10, |cursor| async move {
            Ok(match cursor.as_deref() {
                None => CursorPage::new(vec![1, 2], Some("p2".to_string())),
                Some("p2") => CursorPage::new(vec![3], None),
                Some(other) => panic!("unexpected cursor {}", other),
            })
        })
        .await
        .unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_token_ends_pagination() {
        let cancel = CancellationToken::new();
        let items = paginate_cursor(&cancel, 10, |_| async {
            Ok(CursorPage::new(vec!["a"], Some(String::new())))
        })
        .await
        .unwrap();
        assert_eq!(items, vec!["a"]);
    }

    #[tokio::test]
    async fn test_error_propagates() {
        let cancel = CancellationToken::new();
        let result: Result<Vec<u8>, _> = paginate_cursor(&cancel, 10, |_| async {
            Err(VenueError::Transport("reset".to_string()))
        })
        .await;
        assert_eq!(result, Err(VenueError::Transport("reset".to_string())));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_request() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicUsize::new(0);
        let result: Result<Vec<u8>, _> = paginate_cursor(&cancel, 10, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(CursorPage::new(vec![1], None)) }
        })
        .await;
        assert_eq!(result, Err(VenueError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
