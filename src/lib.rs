//! Read-only query layer over a podcast-feed catalog stored as an SQLite file.
//!
//! The catalog usually sits on a static HTTP server; [`storage::Database`]
//! reads it through [`remote`], fetching only the pages each query touches.
//!
//! ```no_run
//! use newspod::remote::BackendConfig;
//! use newspod::storage::Database;
//!
//! # async fn run() -> Result<(), newspod::storage::CatalogError> {
//! let db = Database::open("https://example.com/feeds.db", BackendConfig::default())?;
//! for feed in db.list_feeds().await? {
//!     println!("{} ({} episodes)", feed.title, feed.entry_count);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod remote;
pub mod storage;
pub mod util;
