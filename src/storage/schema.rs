use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

use super::types::{CatalogError, ConnectionState};
use crate::remote::{BackendConfig, HttpBackend};
use crate::util::{parse_locator, Locator};

// ============================================================================
// Database
// ============================================================================

/// Read-only handle to one catalog file.
///
/// Cloning is cheap; clones share the connection and its state.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

struct Inner {
    locator: Locator,
    config: BackendConfig,
    engine: OnceCell<Result<Engine, String>>,
    // Set by the first connection-class error after a successful open.
    failure: Mutex<Option<String>>,
}

/// An open engine connection plus the backend serving it (remote only).
pub(crate) struct Engine {
    pool: SqlitePool,
    backend: Option<HttpBackend>,
}

impl Engine {
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("locator", &self.inner.locator)
            .field("state", &self.state())
            .finish()
    }
}

impl Database {
    /// Create a handle for the catalog at `locator`.
    ///
    /// No I/O happens here: the handle starts in [`ConnectionState::Opening`]
    /// and the file is opened by the first statement (or [`Database::ready`]).
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Config` if the locator cannot be interpreted or
    /// a backend parameter is zero.
    pub fn open(locator: &str, config: BackendConfig) -> Result<Self, CatalogError> {
        let locator = parse_locator(locator).map_err(|e| CatalogError::Config(e.to_string()))?;
        config
            .validate()
            .map_err(|e| CatalogError::Config(e.to_string()))?;
        tracing::debug!(%locator, "Created catalog handle");
        Ok(Self {
            inner: Arc::new(Inner {
                locator,
                config,
                engine: OnceCell::new(),
                failure: Mutex::new(None),
            }),
        })
    }

    /// [`Database::open`] followed by [`Database::ready`].
    pub async fn connect(locator: &str, config: BackendConfig) -> Result<Self, CatalogError> {
        let db = Self::open(locator, config)?;
        db.ready().await?;
        Ok(db)
    }

    /// Wait until the catalog is open and its header has been read.
    pub async fn ready(&self) -> Result<(), CatalogError> {
        self.engine().await.map(|_| ())
    }

    pub fn locator(&self) -> &Locator {
        &self.inner.locator
    }

    pub fn state(&self) -> ConnectionState {
        if let Some(reason) = self.failure() {
            return ConnectionState::Failed(reason);
        }
        match self.inner.engine.get() {
            None => ConnectionState::Opening,
            Some(Ok(_)) => ConnectionState::Ready,
            Some(Err(reason)) => ConnectionState::Failed(reason.clone()),
        }
    }

    /// Pages fetched over the network so far. `None` for local catalogs or
    /// before the remote file was opened.
    pub fn pages_fetched(&self) -> Option<u64> {
        match self.inner.engine.get() {
            Some(Ok(engine)) => engine.backend.as_ref().map(HttpBackend::pages_fetched),
            _ => None,
        }
    }

    /// Close the underlying connection. Statements issued afterwards fail.
    pub async fn close(&self) {
        if let Some(Ok(engine)) = self.inner.engine.get() {
            engine.pool.close().await;
        }
    }

    // ------------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------------

    /// Fail with the recorded reason if the handle has already failed.
    ///
    /// Operations that can answer without the engine call this first, so a
    /// failed handle never reports anything but its failure.
    pub(crate) fn check_failed(&self) -> Result<(), CatalogError> {
        if let Some(reason) = self.failure() {
            return Err(CatalogError::Connection(reason));
        }
        match self.inner.engine.get() {
            Some(Err(reason)) => Err(CatalogError::Connection(reason.clone())),
            _ => Ok(()),
        }
    }

    /// The open engine, opening it on first use.
    pub(crate) async fn engine(&self) -> Result<&Engine, CatalogError> {
        self.check_failed()?;
        match self.inner.engine.get_or_init(|| self.connect_engine()).await {
            Ok(engine) => Ok(engine),
            Err(reason) => Err(CatalogError::Connection(reason.clone())),
        }
    }

    async fn connect_engine(&self) -> Result<Engine, String> {
        let started = Instant::now();
        let config = self.inner.config;

        // The catalog never changes under a handle; immutable skips locking
        // and change detection, which would otherwise cost extra page reads.
        // Remote URIs carry the flag themselves.
        let (options, backend) = match &self.inner.locator {
            Locator::Remote(url) => {
                let backend = HttpBackend::register(config).map_err(|e| e.to_string())?;
                let options = SqliteConnectOptions::new().filename(backend.file_uri(url));
                (options, Some(backend))
            }
            Locator::Local(path) => (
                SqliteConnectOptions::new().filename(path).immutable(true),
                None,
            ),
        };

        let options = options.read_only(true).pragma("temp_store", "memory");

        // One connection: statements on a handle run one at a time.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(config.timeout.max(Duration::from_secs(30)))
            .connect_with(options)
            .await
            .map_err(|e| describe_open_error(e, backend.as_ref()))?;

        // Reads the header and schema so a corrupt or missing file fails here.
        let probe: Result<(i64,), _> = sqlx::query_as("SELECT count(*) FROM sqlite_master")
            .fetch_one(&pool)
            .await;
        if let Err(e) = probe {
            pool.close().await;
            return Err(describe_open_error(e, backend.as_ref()));
        }

        tracing::info!(
            locator = %self.inner.locator,
            elapsed_ms = started.elapsed().as_millis() as u64,
            pages = backend.as_ref().map(HttpBackend::pages_fetched),
            "Catalog ready"
        );
        Ok(Engine { pool, backend })
    }

    /// Convert a statement failure, marking the handle failed when the
    /// storage itself is gone.
    pub(crate) fn classify(&self, engine: &Engine, err: sqlx::Error) -> CatalogError {
        let err = match engine.backend.as_ref().and_then(HttpBackend::take_error) {
            Some(remote) => CatalogError::Connection(remote),
            None => CatalogError::from_sqlx(err),
        };
        if let CatalogError::Connection(reason) = &err {
            self.mark_failed(reason);
        }
        err
    }

    fn failure(&self) -> Option<String> {
        self.inner
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn mark_failed(&self, reason: &str) {
        let mut failure = self
            .inner
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if failure.is_none() {
            tracing::error!(locator = %self.inner.locator, reason, "Catalog connection failed");
            *failure = Some(reason.to_string());
        }
    }
}

/// Prefer the HTTP-level cause recorded by the backend over SQLite's generic
/// "unable to open database file".
fn describe_open_error(err: sqlx::Error, backend: Option<&HttpBackend>) -> String {
    let reason = backend
        .and_then(HttpBackend::take_error)
        .unwrap_or_else(|| match CatalogError::from_sqlx(err) {
            CatalogError::Connection(m) | CatalogError::Query(m) | CatalogError::Config(m) => m,
        });
    tracing::warn!(reason = %reason, "Failed to open catalog");
    reason
}
