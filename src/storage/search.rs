use super::executor::{Bindings, Statement};
use super::schema::Database;
use super::types::{CatalogError, SearchHit};

// ============================================================================
// FTS5 Query Validation
// ============================================================================

const MAX_QUERY_LENGTH: usize = crate::util::MAX_SEARCH_QUERY_LENGTH;
const MAX_WILDCARDS: usize = 3;
const MAX_OR_OPERATORS: usize = 5;
const MAX_PARENTHESES: usize = 5;
const MAX_AND_OPERATORS: usize = 10;

/// Reject full-text queries whose expansion would make every page of the
/// index travel over the network.
///
/// Limits:
/// - Maximum query length: 256 bytes
/// - Maximum wildcards (*): 3
/// - Maximum OR operators: 5
/// - Maximum parentheses: 5, and they must balance
/// - Maximum AND operators: 10
pub(crate) fn validate_fts_query(query: &str) -> Result<(), CatalogError> {
    let reject = |msg: String| Err(CatalogError::Query(msg));

    if query.len() > MAX_QUERY_LENGTH {
        return reject(format!(
            "Search query exceeds maximum length of {} characters",
            MAX_QUERY_LENGTH
        ));
    }

    let wildcard_count = query.matches('*').count();
    if wildcard_count > MAX_WILDCARDS {
        return reject(format!(
            "Search query contains too many wildcards (max {})",
            MAX_WILDCARDS
        ));
    }

    let upper = query.to_uppercase();
    let or_count = upper.matches(" OR ").count();
    if or_count > MAX_OR_OPERATORS {
        return reject(format!(
            "Search query contains too many OR operators (max {})",
            MAX_OR_OPERATORS
        ));
    }

    let open_paren_count = query.chars().filter(|&c| c == '(').count();
    let close_paren_count = query.chars().filter(|&c| c == ')').count();
    if open_paren_count > MAX_PARENTHESES {
        return reject(format!(
            "Search query contains too many parentheses (max {})",
            MAX_PARENTHESES
        ));
    }
    if open_paren_count != close_paren_count {
        return reject("Search query has unbalanced parentheses".to_string());
    }

    let and_count = upper.matches(" AND ").count();
    if and_count > MAX_AND_OPERATORS {
        return reject(format!(
            "Search query contains too many AND operators (max {})",
            MAX_AND_OPERATORS
        ));
    }

    Ok(())
}

// ============================================================================
// Statements
// ============================================================================

/// (feed id, entry id, title, url, date millis)
type SearchRow = (i64, i64, Option<String>, String, i64);

const SEARCH: Statement = Statement::new(
    "search",
    r#"
    SELECT entries.feedid, entries.id, entries.title, entries.url, entries.datemillis
      FROM entries
      JOIN search ON search.rowid = entries.id
     WHERE search MATCH ?1
     ORDER BY entries.datemillis DESC, entries.id DESC
    "#,
    &["match"],
);

impl Database {
    // ========================================================================
    // Search Operations
    // ========================================================================

    /// Full-text search over entry titles and bodies, newest first. Every
    /// matching entry is returned.
    ///
    /// `term` uses FTS5 query syntax. Blank terms match nothing. Malformed or
    /// overly complex terms are a [`CatalogError::Query`]; there is no
    /// substring fallback, since it would scan the whole catalog remotely.
    pub async fn search(&self, term: &str) -> Result<Vec<SearchHit>, CatalogError> {
        self.check_failed()?;

        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        validate_fts_query(term)?;

        let bindings = Bindings::new().bind("match", term);
        let mut hits = Vec::new();
        self.execute(
            &SEARCH,
            &bindings,
            |(feed_id, id, title, url, date_millis): SearchRow| {
                hits.push(SearchHit {
                    id,
                    feed_id,
                    title: title.unwrap_or_default(),
                    url,
                    date_millis,
                })
            },
        )
        .await?;
        Ok(hits)
    }
}
