//! Time-window splitting and cursor pagination.

pub mod cursor;
pub mod window;

pub use cursor::{paginate_cursor, CursorPage};
pub use window::{
    fetch_window_exhaustive, split_windows, validate_range, WindowError, WindowPage,
};
