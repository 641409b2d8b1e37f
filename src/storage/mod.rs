mod entries;
mod executor;
mod feeds;
mod schema;
mod search;
mod stats;
mod tags;
mod types;

#[cfg(test)]
pub(crate) mod fixture;

pub use executor::{Bindings, Statement, Value};
pub use schema::Database;
pub use types::{
    CatalogError, ConnectionState, Entry, EntryContent, EntryDetail, Feed, FeedDetails,
    HighlightedContent, SearchHit, Snapshot, Stats, Tag, HIGHLIGHT_DELIMITER,
};
