//! Builds small catalog files on disk for tests.
//!
//! The layout matches what the crawler publishes. Shared with the
//! integration tests through `#[path]`, so it must not use crate items.

#![allow(dead_code)]

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::{Path, PathBuf};

pub const SCHEMA: &[&str] = &[
    "CREATE TABLE feeds (
        id    INTEGER PRIMARY KEY,
        title TEXT,
        url   TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE feeds_details (
        feedid      INTEGER NOT NULL,
        home        TEXT,
        description TEXT,
        language    TEXT,
        image       TEXT,
        author      TEXT,
        FOREIGN KEY (feedid) REFERENCES feeds(id)
    )",
    "CREATE TABLE feeds_metadata (
        feedid       INTEGER NOT NULL,
        lastentry    DATETIME,
        lastfetch    DATETIME,
        lastmodified DATETIME,
        etag         TEXT,
        FOREIGN KEY (feedid) REFERENCES feeds(id)
    )",
    "CREATE TABLE entries (
        id         INTEGER PRIMARY KEY,
        feedid     INTEGER NOT NULL,
        datemillis INTEGER,
        title      TEXT,
        url        TEXT NOT NULL UNIQUE,
        FOREIGN KEY (feedid) REFERENCES feeds(id)
    )",
    "CREATE TABLE entries_content (
        entriesid   INTEGER NOT NULL,
        title       TEXT,
        description TEXT,
        FOREIGN KEY (entriesid) REFERENCES entries(id)
    )",
    "CREATE VIRTUAL TABLE search USING fts5(
        title,
        description,
        content='entries_content',
        content_rowid='entriesid'
    )",
    "CREATE TRIGGER entries_content_ai AFTER INSERT ON entries_content BEGIN
        INSERT INTO search(rowid, title, description)
        VALUES (new.entriesid, new.title, new.description);
    END",
    "CREATE TABLE tags (
        id   INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE feed_tags (
        feedid INTEGER NOT NULL,
        tagid  INTEGER NOT NULL,
        FOREIGN KEY (feedid) REFERENCES feeds(id),
        FOREIGN KEY (tagid) REFERENCES tags(id)
    )",
    "CREATE INDEX idx_entries_feedid ON entries(feedid)",
    "CREATE INDEX idx_entries_datemillis ON entries(datemillis)",
    "CREATE INDEX idx_feeds_details_feedid ON feeds_details(feedid)",
    "CREATE INDEX idx_feeds_metadata_feedid ON feeds_metadata(feedid)",
];

/// Reference data used across the test suite.
///
/// Feed 2 published most recently, so it lists first. Feed 3 has no entries
/// and never lists. Entry 5 has an empty body.
pub const DATA: &[&str] = &[
    "INSERT INTO feeds (id, title, url) VALUES
        (1, 'Alpha Cast', 'https://alpha.example.com/rss'),
        (2, 'Beta Show',  'https://beta.example.com/rss'),
        (3, 'Empty Feed', 'https://empty.example.com/rss')",
    "INSERT INTO feeds_details (feedid, home, description, language, image, author) VALUES
        (1, 'https://alpha.example.com', 'Talk about systems programming', 'en',
            'https://alpha.example.com/cover.png', 'Alice'),
        (3, NULL, NULL, NULL, NULL, NULL)",
    "INSERT INTO feeds_metadata (feedid, lastentry) VALUES
        (1, 3000), (2, 5000), (3, 9000)",
    "INSERT INTO entries (id, feedid, datemillis, title, url) VALUES
        (1, 1, 1000, 'Intro to Rust',            'https://alpha.example.com/1.mp3'),
        (2, 1, 3000, 'Borrow checker deep dive', 'https://alpha.example.com/2.mp3'),
        (3, 1, 2000, 'Async in practice',        'https://alpha.example.com/3.mp3'),
        (4, 2, 5000, 'Gardening basics',         'https://beta.example.com/4.mp3'),
        (5, 2, 4000, 'Listener mail',            'https://beta.example.com/5.mp3')",
    "INSERT INTO entries_content (entriesid, title, description) VALUES
        (1, 'Intro to Rust',            'We talk about rust and cargo.'),
        (2, 'Borrow checker deep dive', 'Ownership and borrowing in rust explained.'),
        (3, 'Async in practice',        'A tokio runtime walkthrough.'),
        (4, 'Gardening basics',         'Tomatoes and soil.'),
        (5, 'Listener mail',            '')",
    "INSERT INTO tags (id, name) VALUES (1, 'tech'), (2, 'garden')",
    "INSERT INTO feed_tags (feedid, tagid) VALUES (1, 1), (2, 2), (3, 1)",
];

/// Page size of fixture files; small so a handful of rows spans many pages.
pub const PAGE_SIZE: u32 = 1024;

/// Write the reference catalog to `dir/feeds.db`.
pub async fn build_catalog(dir: &Path) -> PathBuf {
    build_catalog_with(dir, DATA).await
}

/// Write a catalog with the standard schema and the given inserts.
pub async fn build_catalog_with(dir: &Path, data: &[&str]) -> PathBuf {
    let path = dir.join("feeds.db");
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete)
        .pragma("page_size", PAGE_SIZE.to_string());
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    for statement in SCHEMA.iter().chain(data) {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;
    path
}
