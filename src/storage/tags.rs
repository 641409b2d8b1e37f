use super::executor::{Bindings, Statement};
use super::schema::Database;
use super::types::{CatalogError, Tag};

const LIST_TAGS: Statement = Statement::new(
    "list_tags",
    "SELECT id, name FROM tags ORDER BY id",
    &[],
);

impl Database {
    /// All tags in catalog order.
    ///
    /// Catalogs published before tagging existed have no `tags` table; that
    /// surfaces as a query error.
    pub async fn list_tags(&self) -> Result<Vec<Tag>, CatalogError> {
        let rows: Vec<(i64, String)> = self.fetch_all(&LIST_TAGS, &Bindings::new()).await?;
        Ok(rows.into_iter().map(|(id, name)| Tag { id, name }).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::remote::BackendConfig;
    use crate::storage::fixture::{build_catalog, build_catalog_with};
    use crate::storage::{CatalogError, ConnectionState, Database, Tag};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_list_tags_in_id_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_catalog(dir.path()).await;
        let db = Database::open(path.to_str().unwrap(), BackendConfig::default()).unwrap();

        assert_eq!(
            db.list_tags().await.unwrap(),
            vec![
                Tag {
                    id: 1,
                    name: "tech".to_string()
                },
                Tag {
                    id: 2,
                    name: "garden".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_catalog_has_no_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = build_catalog_with(dir.path(), &[]).await;
        let db = Database::open(path.to_str().unwrap(), BackendConfig::default()).unwrap();

        assert!(db.list_tags().await.unwrap().is_empty());
        assert!(db.list_feeds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_table_is_query_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.db");
        {
            let options = sqlx::sqlite::SqliteConnectOptions::new()
                .filename(&path)
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Delete);
            let pool = sqlx::SqlitePool::connect_with(options).await.unwrap();
            sqlx::query("CREATE TABLE feeds (id INTEGER PRIMARY KEY, title TEXT, url TEXT)")
                .execute(&pool)
                .await
                .unwrap();
            pool.close().await;
        }
        let db = Database::open(path.to_str().unwrap(), BackendConfig::default()).unwrap();

        let err = db.list_tags().await.unwrap_err();
        assert!(matches!(err, CatalogError::Query(_)));
        assert_eq!(db.state(), ConnectionState::Ready);
    }
}
