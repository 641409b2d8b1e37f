use super::executor::{Bindings, Statement};
use super::schema::Database;
use super::types::{CatalogError, Snapshot, Stats};

/// (feed count, entry count, file size in bytes)
type StatsRow = (i64, i64, i64);

const GET_STATS: Statement = Statement::new(
    "get_stats",
    r#"
    SELECT *
      FROM (SELECT count(1) FROM feeds)
      JOIN (SELECT count(1) FROM entries)
      JOIN (SELECT page_size * page_count FROM pragma_page_count(), pragma_page_size())
    "#,
    &[],
);

impl Database {
    /// Catalog-wide counts and the size of the backing file.
    ///
    /// `feed_count` counts every feed, including those without entries.
    pub async fn get_stats(&self) -> Result<Stats, CatalogError> {
        let (feed_count, entry_count, db_size): StatsRow =
            self.fetch_one(&GET_STATS, &Bindings::new()).await?;
        Ok(Stats {
            feed_count,
            entry_count,
            db_size,
        })
    }

    /// Feed list, stats and tag names in one value, for a client's first screen.
    pub async fn snapshot(&self) -> Result<Snapshot, CatalogError> {
        let feeds = self.list_feeds().await?;
        let stats = self.get_stats().await?;
        let tags = self
            .list_tags()
            .await?
            .into_iter()
            .map(|tag| tag.name)
            .collect();
        tracing::debug!(
            feeds = feeds.len(),
            entries = stats.entry_count,
            "Built catalog snapshot"
        );
        Ok(Snapshot { feeds, stats, tags })
    }
}
