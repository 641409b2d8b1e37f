use super::executor::{Bindings, Statement};
use super::schema::Database;
use super::search::validate_fts_query;
use super::types::{
    CatalogError, Entry, EntryContent, EntryDetail, HighlightedContent, HIGHLIGHT_DELIMITER,
};

// ============================================================================
// Statements
// ============================================================================

/// (id, title, date millis, url)
type EntryListRow = (i64, Option<String>, i64, String);

/// (id, feed id, title, date millis, url)
type EntryRow = (i64, i64, Option<String>, i64, String);

/// (feed id, body)
type ContentRow = (i64, Option<String>);

const LIST_ENTRIES: Statement = Statement::new(
    "list_entries",
    r#"
    SELECT id, title, datemillis, url
      FROM entries
     WHERE feedid = ?1
     ORDER BY datemillis DESC, id DESC
    "#,
    &["fid"],
);

const GET_ENTRY_CONTENT: Statement = Statement::new(
    "get_entry_content",
    r#"
    SELECT entries.feedid, entries_content.description
      FROM entries
      JOIN entries_content ON entries_content.entriesid = entries.id
     WHERE entries.id = ?1
    "#,
    &["eid"],
);

// Column 1 of the index is the entry body.
const GET_ENTRY_HIGHLIGHTED: Statement = Statement::new(
    "get_entry_highlighted",
    r#"
    SELECT entries.feedid, highlight(search, 1, ?3, ?3)
      FROM entries
      JOIN search ON entries.id = search.rowid
     WHERE entries.id = ?1
       AND search MATCH ?2
    "#,
    &["eid", "needle", "mark"],
);

const LATEST_ENTRIES: Statement = Statement::new(
    "latest_entries",
    r#"
    SELECT id, feedid, title, datemillis, url
      FROM entries
     ORDER BY datemillis DESC, id DESC
     LIMIT ?1
    "#,
    &["limit"],
);

impl Database {
    // ========================================================================
    // Entry Operations
    // ========================================================================

    /// Entries of one feed, newest first. An unknown feed yields an empty list.
    pub async fn list_entries(&self, feed_id: i64) -> Result<Vec<Entry>, CatalogError> {
        let mut entries = Vec::new();
        self.execute(
            &LIST_ENTRIES,
            &Bindings::new().bind("fid", feed_id),
            |(id, title, date_millis, url): EntryListRow| {
                entries.push(Entry {
                    id,
                    feed_id,
                    title: title.unwrap_or_default(),
                    date_millis,
                    url,
                })
            },
        )
        .await?;
        Ok(entries)
    }

    /// Body of one entry.
    ///
    /// `Ok(None)` means the entry (or its content row) does not exist;
    /// `Some` with `content: None` means it exists with a null body.
    pub async fn get_entry_content(
        &self,
        entry_id: i64,
    ) -> Result<Option<EntryContent>, CatalogError> {
        let row: Option<ContentRow> = self
            .fetch_optional(&GET_ENTRY_CONTENT, &Bindings::new().bind("eid", entry_id))
            .await?;
        Ok(row.map(|(feed_id, content)| EntryContent {
            id: entry_id,
            feed_id,
            content,
        }))
    }

    /// Body of one entry with every match of `needle` wrapped in
    /// [`HIGHLIGHT_DELIMITER`].
    ///
    /// `Ok(None)` when the entry does not exist or does not match. A blank
    /// needle matches nothing, as in [`Database::search`].
    pub async fn get_entry_highlighted(
        &self,
        entry_id: i64,
        needle: &str,
    ) -> Result<Option<HighlightedContent>, CatalogError> {
        self.check_failed()?;

        let needle = needle.trim();
        if needle.is_empty() {
            return Ok(None);
        }
        validate_fts_query(needle)?;
        let bindings = Bindings::new()
            .bind("eid", entry_id)
            .bind("needle", needle)
            .bind("mark", HIGHLIGHT_DELIMITER);
        let row: Option<ContentRow> = self.fetch_optional(&GET_ENTRY_HIGHLIGHTED, &bindings).await?;
        Ok(row.map(|(feed_id, content)| HighlightedContent {
            id: entry_id,
            feed_id,
            content: content.unwrap_or_default(),
        }))
    }

    /// Entry body, highlighted when `term` is a non-empty search term.
    ///
    /// `None` and `Some("")` read the plain body; any other term takes the
    /// highlighted branch.
    pub async fn get_entry_detail(
        &self,
        entry_id: i64,
        term: Option<&str>,
    ) -> Result<Option<EntryDetail>, CatalogError> {
        match term.filter(|t| !t.is_empty()) {
            Some(needle) => Ok(self
                .get_entry_highlighted(entry_id, needle)
                .await?
                .map(EntryDetail::Highlighted)),
            None => Ok(self
                .get_entry_content(entry_id)
                .await?
                .map(EntryDetail::Plain)),
        }
    }

    /// The `limit` most recent entries across all feeds.
    pub async fn latest_entries(&self, limit: u32) -> Result<Vec<Entry>, CatalogError> {
        let rows: Vec<EntryRow> = self
            .fetch_all(&LATEST_ENTRIES, &Bindings::new().bind("limit", i64::from(limit)))
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, feed_id, title, date_millis, url)| Entry {
                id,
                feed_id,
                title: title.unwrap_or_default(),
                date_millis,
                url,
            })
            .collect())
    }
}
