use super::executor::{Bindings, Statement};
use super::schema::Database;
use super::types::{CatalogError, Feed, FeedDetails};

// ============================================================================
// Statements
// ============================================================================

/// (id, title, entry count)
type FeedRow = (i64, Option<String>, i64);

/// (home, description, language, image, author, url)
type FeedDetailsRow = (
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

// Feeds without entries drop out of the inner join. Missing or duplicated
// metadata rows must not change the count or hide the feed.
const LIST_FEEDS: Statement = Statement::new(
    "list_feeds",
    r#"
    SELECT feeds.id, feeds.title, count(DISTINCT entries.id)
      FROM feeds
      JOIN entries ON feeds.id = entries.feedid
      LEFT JOIN feeds_metadata ON feeds.id = feeds_metadata.feedid
     GROUP BY entries.feedid
    HAVING count(DISTINCT entries.id) > 0
     ORDER BY coalesce(max(feeds_metadata.lastentry), 0) DESC, feeds.id
    "#,
    &[],
);

const LIST_FEEDS_TAGGED: Statement = Statement::new(
    "list_feeds_tagged",
    r#"
    SELECT feeds.id, feeds.title, count(DISTINCT entries.id)
      FROM feeds
      JOIN entries ON feeds.id = entries.feedid
      JOIN feed_tags ON feeds.id = feed_tags.feedid
      JOIN tags ON tags.id = feed_tags.tagid
      LEFT JOIN feeds_metadata ON feeds.id = feeds_metadata.feedid
     WHERE tags.name = ?1
     GROUP BY entries.feedid
    HAVING count(DISTINCT entries.id) > 0
     ORDER BY coalesce(max(feeds_metadata.lastentry), 0) DESC, feeds.id
    "#,
    &["tag"],
);

const GET_FEED_DETAILS: Statement = Statement::new(
    "get_feed_details",
    r#"
    SELECT fd.home, fd.description, fd.language, fd.image, fd.author, feeds.url
      FROM feeds_details fd
      JOIN feeds ON feeds.id = fd.feedid
     WHERE feeds.id = ?1
    "#,
    &["id"],
);

fn feed_from_row((id, title, entry_count): FeedRow) -> Feed {
    Feed {
        id,
        title: title.unwrap_or_default(),
        entry_count,
    }
}

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Feeds with at least one entry, most recently published first.
    pub async fn list_feeds(&self) -> Result<Vec<Feed>, CatalogError> {
        let mut feeds = Vec::new();
        self.execute(&LIST_FEEDS, &Bindings::new(), |row: FeedRow| {
            feeds.push(feed_from_row(row))
        })
        .await?;
        tracing::debug!(count = feeds.len(), "Listed feeds");
        Ok(feeds)
    }

    /// Like [`Database::list_feeds`], restricted to feeds carrying `tag`.
    ///
    /// An unknown tag yields an empty list.
    pub async fn list_feeds_tagged(&self, tag: &str) -> Result<Vec<Feed>, CatalogError> {
        let rows: Vec<FeedRow> = self
            .fetch_all(&LIST_FEEDS_TAGGED, &Bindings::new().bind("tag", tag))
            .await?;
        Ok(rows.into_iter().map(feed_from_row).collect())
    }

    /// Extended metadata for one feed, or `None` if the feed has no details row.
    pub async fn get_feed_details(&self, feed_id: i64) -> Result<Option<FeedDetails>, CatalogError> {
        let row: Option<FeedDetailsRow> = self
            .fetch_optional(&GET_FEED_DETAILS, &Bindings::new().bind("id", feed_id))
            .await?;

        Ok(row.map(
            |(home, description, language, image, author, url)| FeedDetails {
                id: feed_id,
                home,
                description,
                language,
                image,
                author,
                url,
            },
        ))
    }
}
