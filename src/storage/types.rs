use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by the catalog handle and its queries.
///
/// A query that matches nothing is not an error: one-or-absent operations
/// return `Ok(None)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// Remote resource unreachable, open rejected, or a page fetch failed.
    /// The handle is `Failed` afterwards; open a new one instead of retrying.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed statement, binding mismatch, decode failure or rejected
    /// full-text syntax. The handle stays usable.
    #[error("Query error: {0}")]
    Query(String),

    /// Invalid locator or backend parameters.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CatalogError {
    /// SQLite primary result codes that mean the storage itself is gone.
    const SQLITE_IOERR: i64 = 10;
    const SQLITE_CANTOPEN: i64 = 14;
    const SQLITE_NOTADB: i64 = 26;

    /// Classify a sqlx error into the connection/query taxonomy.
    ///
    /// I/O-class engine codes and pool/worker failures are connection errors;
    /// everything else is local to the statement.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                let primary = db_err
                    .code()
                    .and_then(|code| code.parse::<i64>().ok())
                    .map(|code| code & 0xff);
                match primary {
                    Some(Self::SQLITE_IOERR | Self::SQLITE_CANTOPEN | Self::SQLITE_NOTADB) => {
                        CatalogError::Connection(db_err.message().to_string())
                    }
                    _ => CatalogError::Query(db_err.message().to_string()),
                }
            }
            // A busy single-connection pool is contention, not a dead catalog.
            sqlx::Error::PoolTimedOut => CatalogError::Query(err.to_string()),
            sqlx::Error::Io(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Tls(_) => CatalogError::Connection(err.to_string()),
            _ => CatalogError::Query(err.to_string()),
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, CatalogError::Connection(_))
    }
}

// ============================================================================
// Connection State
// ============================================================================

/// Lifecycle of a catalog handle: `Opening -> Ready`, or `-> Failed` from either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Opening,
    Ready,
    Failed(String),
}

// ============================================================================
// Data Structures
// ============================================================================

/// Feed as listed in the catalog; only feeds with at least one entry appear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feed {
    pub id: i64,
    pub title: String,
    #[serde(rename = "nEntries")]
    pub entry_count: i64,
}

/// Extended feed metadata. Every field except `url` may be missing upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedDetails {
    pub id: i64,
    pub home: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub image: Option<String>,
    pub author: Option<String>,
    pub url: String,
}

/// Entry listing row. `date_millis` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub id: i64,
    #[serde(rename = "feedid")]
    pub feed_id: i64,
    pub title: String,
    #[serde(rename = "date")]
    pub date_millis: i64,
    pub url: String,
}

/// Full-text search result. Ordered by publish time, never by relevance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub id: i64,
    #[serde(rename = "feedid")]
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    #[serde(rename = "date")]
    pub date_millis: i64,
}

/// Plain entry body. `content` is `None` when the entry exists but has no body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryContent {
    pub id: i64,
    #[serde(rename = "feedid")]
    pub feed_id: i64,
    pub content: Option<String>,
}

/// Entry body with every match wrapped in [`HIGHLIGHT_DELIMITER`] on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightedContent {
    pub id: i64,
    #[serde(rename = "feedid")]
    pub feed_id: i64,
    pub content: String,
}

/// Delimiter placed before and after every highlighted span.
pub const HIGHLIGHT_DELIMITER: &str = "```";

/// Result of an entry-detail lookup; the variant tells which query ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntryDetail {
    Plain(EntryContent),
    Highlighted(HighlightedContent),
}

impl EntryDetail {
    pub fn id(&self) -> i64 {
        match self {
            EntryDetail::Plain(c) => c.id,
            EntryDetail::Highlighted(c) => c.id,
        }
    }

    pub fn feed_id(&self) -> i64 {
        match self {
            EntryDetail::Plain(c) => c.feed_id,
            EntryDetail::Highlighted(c) => c.feed_id,
        }
    }

    /// Body text, empty when a plain entry has no content.
    pub fn content(&self) -> &str {
        match self {
            EntryDetail::Plain(c) => c.content.as_deref().unwrap_or_default(),
            EntryDetail::Highlighted(c) => &c.content,
        }
    }
}

/// Catalog-wide aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    #[serde(rename = "nPodcasts")]
    pub feed_count: i64,
    #[serde(rename = "nEntries")]
    pub entry_count: i64,
    /// `page_size * page_count` of the backing file, in bytes.
    #[serde(rename = "dbSize")]
    pub db_size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// Everything a client needs to draw its first screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub feeds: Vec<Feed>,
    pub stats: Stats,
    pub tags: Vec<String>,
}
