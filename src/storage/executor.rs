use futures::TryStreamExt;
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::time::Instant;

use super::schema::Database;
use super::types::CatalogError;

// ============================================================================
// Statements and Bindings
// ============================================================================

/// A fixed, parameterized catalog statement.
///
/// `sql` uses numbered placeholders: `?1` is `params[0]`, `?2` is `params[1]`
/// and so on. Callers bind by name through [`Bindings`]; the executor turns
/// names into positions.
#[derive(Debug, Clone, Copy)]
pub struct Statement {
    pub name: &'static str,
    pub sql: &'static str,
    pub params: &'static [&'static str],
}

impl Statement {
    pub const fn new(
        name: &'static str,
        sql: &'static str,
        params: &'static [&'static str],
    ) -> Self {
        Self { name, sql, params }
    }

    /// Order `bindings` by placeholder position.
    ///
    /// Every declared parameter must be bound, and nothing else may be.
    pub(crate) fn resolve(&self, bindings: &Bindings) -> Result<Vec<Value>, CatalogError> {
        if let Some(unknown) = bindings.0.keys().find(|k| !self.params.contains(&k.as_str())) {
            return Err(CatalogError::Query(format!(
                "{}: unknown binding `{}`",
                self.name, unknown
            )));
        }
        self.params
            .iter()
            .map(|param| {
                bindings.0.get(*param).cloned().ok_or_else(|| {
                    CatalogError::Query(format!("{}: missing binding `{}`", self.name, param))
                })
            })
            .collect()
    }
}

/// Scalar accepted by a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Text(String),
    Null,
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Placeholder name to value.
#[derive(Debug, Clone, Default)]
pub struct Bindings(BTreeMap<String, Value>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

// ============================================================================
// Executor
// ============================================================================

impl Database {
    /// Run `stmt` and hand every decoded row to `on_row`, in engine order.
    ///
    /// Rows are decoded positionally into `R` (normally a tuple declared beside
    /// the statement) from a lazy stream that is drained before this returns.
    /// On error, rows already delivered must be treated as invalid.
    ///
    /// Returns the number of rows delivered.
    pub async fn execute<R, F>(
        &self,
        stmt: &Statement,
        bindings: &Bindings,
        mut on_row: F,
    ) -> Result<usize, CatalogError>
    where
        R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        F: FnMut(R),
    {
        let values = stmt.resolve(bindings)?;
        let engine = self.engine().await?;
        let started = Instant::now();

        let mut query = sqlx::query_as::<_, R>(stmt.sql);
        for value in values {
            query = match value {
                Value::Integer(v) => query.bind(v),
                Value::Text(v) => query.bind(v),
                Value::Null => query.bind(None::<String>),
            };
        }

        let mut rows = query.fetch(engine.pool());
        let mut delivered = 0usize;
        loop {
            match rows.try_next().await {
                Ok(Some(row)) => {
                    on_row(row);
                    delivered += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    let err = self.classify(engine, e);
                    tracing::debug!(statement = stmt.name, error = %err, "Statement failed");
                    return Err(err);
                }
            }
        }

        tracing::debug!(
            statement = stmt.name,
            rows = delivered,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Statement complete"
        );
        Ok(delivered)
    }

    /// All rows, in order.
    pub(crate) async fn fetch_all<R>(
        &self,
        stmt: &Statement,
        bindings: &Bindings,
    ) -> Result<Vec<R>, CatalogError>
    where
        R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let mut rows = Vec::new();
        self.execute(stmt, bindings, |row| rows.push(row)).await?;
        Ok(rows)
    }

    /// First row, or `None` when nothing matched.
    pub(crate) async fn fetch_optional<R>(
        &self,
        stmt: &Statement,
        bindings: &Bindings,
    ) -> Result<Option<R>, CatalogError>
    where
        R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let mut first = None;
        self.execute(stmt, bindings, |row| {
            if first.is_none() {
                first = Some(row);
            }
        })
        .await?;
        Ok(first)
    }

    /// Exactly one row; zero or several is a query error.
    pub(crate) async fn fetch_one<R>(
        &self,
        stmt: &Statement,
        bindings: &Bindings,
    ) -> Result<R, CatalogError>
    where
        R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let mut rows: Vec<R> = self.fetch_all(stmt, bindings).await?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            n => Err(CatalogError::Query(format!(
                "{}: expected exactly one row, got {}",
                stmt.name, n
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PARAMS: Statement = Statement::new(
        "two_params",
        "SELECT ?1 + 0, ?2 || ''",
        &["eid", "needle"],
    );

    #[test]
    fn test_resolve_orders_by_declaration() {
        let bindings = Bindings::new().bind("needle", "rust").bind("eid", 4i64);
        let values = TWO_PARAMS.resolve(&bindings).unwrap();
        assert_eq!(
            values,
            vec![Value::Integer(4), Value::Text("rust".to_string())]
        );
    }

    #[test]
    fn test_resolve_rejects_missing_binding() {
        let bindings = Bindings::new().bind("eid", 4i64);
        let err = TWO_PARAMS.resolve(&bindings).unwrap_err();
        assert!(matches!(err, CatalogError::Query(_)));
        assert!(err.to_string().contains("missing binding `needle`"));
    }

    #[test]
    fn test_resolve_rejects_unknown_binding() {
        let bindings = Bindings::new()
            .bind("eid", 4i64)
            .bind("needle", "x")
            .bind("fid", 1i64);
        let err = TWO_PARAMS.resolve(&bindings).unwrap_err();
        assert!(err.to_string().contains("unknown binding `fid`"));
    }

    #[test]
    fn test_optional_values_become_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::Text("a".to_string()));
    }

    #[tokio::test]
    async fn test_binding_mismatch_fails_before_connecting() {
        // Nothing listens here; a resolved statement would fail with a
        // connection error instead.
        let db = Database::open("http://127.0.0.1:9/feeds.db", Default::default()).unwrap();
        let result = db
            .execute(&TWO_PARAMS, &Bindings::new(), |_: (i64, String)| {})
            .await;
        assert!(matches!(result, Err(CatalogError::Query(_))));
        assert_eq!(db.state(), crate::storage::ConnectionState::Opening);
    }
}
