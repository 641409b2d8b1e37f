//! Utility functions for common operations.
//!
//! - **Locators**: telling remote catalogs from local files
//! - **Text processing**: terminal-safe, width-aware rendering of catalog text

mod locator;
mod text;

pub use locator::{parse_locator, Locator, LocatorError};
pub use text::{display_width, format_date_millis, strip_control_chars, truncate_to_width};

/// Maximum allowed search query length, shared by the CLI and FTS5 validation.
pub const MAX_SEARCH_QUERY_LENGTH: usize = 256;
