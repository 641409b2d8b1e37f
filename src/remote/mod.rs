//! Read-only page-range backend for SQLite.
//!
//! A catalog served over plain HTTP is read by fetching only the byte ranges
//! ("pages") SQLite asks for. [`HttpBackend::register`] installs a named
//! handle on a single process-wide SQLite VFS ([`VFS_NAME`]). The handle's
//! [`HttpBackend::file_uri`] names the remote file together with the handle,
//! so each open file finds its own config, cache and error slot. Opening
//! probes the file size with a one-byte ranged `GET`, then every `xRead` is
//! served from an LRU page cache backed by ranged `GET`s.
//!
//! The backend never retries. A failed fetch turns into an SQLite I/O error
//! and is recorded so the caller can report the HTTP-level cause.

mod pages;
mod vfs;

use serde::Deserialize;
use std::num::NonZeroUsize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use url::Url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum RemoteError {
    /// A backend parameter was zero or otherwise unusable
    #[error("Invalid backend configuration: {0}")]
    InvalidConfig(&'static str),
    /// The HTTP client could not be built (TLS backend, resolver)
    #[error("HTTP client unavailable: {0}")]
    Client(String),
    /// Network-level error (DNS, connection, TLS, timeout)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with an unexpected status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Server ignored the Range header or did not report a total size
    #[error("Server does not support range requests")]
    RangeUnsupported,
    /// Response body shorter or longer than the requested range
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// SQLite refused the VFS registration
    #[error("VFS registration failed: {0}")]
    Register(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Remote-fetch parameters. All three must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Bytes per ranged request (and per cache slot).
    pub max_page_size: u32,
    /// Upper bound for one page fetch, connect included.
    #[serde(with = "duration_ms", rename = "timeout_ms")]
    pub timeout: Duration,
    /// Total bytes of page cache.
    pub cache_size: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            max_page_size: 1024,
            timeout: Duration::from_secs(10),
            cache_size: 4096 * 1024,
        }
    }
}

impl BackendConfig {
    pub fn validate(&self) -> Result<(), RemoteError> {
        if self.max_page_size == 0 {
            return Err(RemoteError::InvalidConfig("max_page_size must be positive"));
        }
        if self.timeout.is_zero() {
            return Err(RemoteError::InvalidConfig("timeout must be positive"));
        }
        if self.cache_size == 0 {
            return Err(RemoteError::InvalidConfig("cache_size must be positive"));
        }
        Ok(())
    }

    /// Number of pages the cache holds; at least one.
    pub fn cache_pages(&self) -> NonZeroUsize {
        let pages = self.cache_size / u64::from(self.max_page_size.max(1));
        NonZeroUsize::new(usize::try_from(pages).unwrap_or(usize::MAX)).unwrap_or(NonZeroUsize::MIN)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Name of the VFS serving every remote catalog in this process.
pub const VFS_NAME: &str = "newspod-http";

/// URI parameter carrying the backend id of a remote file.
pub(crate) const BACKEND_PARAM: &std::ffi::CStr = c"newspod_backend";

static VFS: OnceLock<Result<(), String>> = OnceLock::new();
static NEXT_BACKEND_ID: AtomicU64 = AtomicU64::new(0);

// Weak so a dropped handle (and its client and cache) is freed once its
// files are closed.
static BACKENDS: Mutex<BTreeMap<u64, Weak<Shared>>> = Mutex::new(BTreeMap::new());

fn ensure_vfs() -> Result<(), RemoteError> {
    VFS.get_or_init(|| vfs::register(VFS_NAME).map_err(|e| e.to_string()))
        .clone()
        .map_err(RemoteError::Register)
}

/// How many times the page-range VFS is registered with SQLite.
#[cfg(test)]
pub(crate) fn registered_vfs_count() -> usize {
    vfs::registered_count(VFS_NAME)
}

/// Backend state for the file opened with `id`, if its handle is alive.
pub(crate) fn lookup(id: i64) -> Option<Arc<Shared>> {
    let id = u64::try_from(id).ok()?;
    BACKENDS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .and_then(Weak::upgrade)
}

/// State shared between the Rust handle and the registered VFS.
pub(crate) struct Shared {
    config: BackendConfig,
    // Built lazily on the SQLite worker thread: the blocking client must not
    // be created inside an async runtime.
    client: OnceLock<Result<reqwest::blocking::Client, String>>,
    last_error: Mutex<Option<String>>,
    pages_fetched: AtomicU64,
}

impl Shared {
    fn new(config: BackendConfig) -> Self {
        Self {
            config,
            client: OnceLock::new(),
            last_error: Mutex::new(None),
            pages_fetched: AtomicU64::new(0),
        }
    }

    pub(crate) fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub(crate) fn client(&self) -> Result<&reqwest::blocking::Client, RemoteError> {
        self.client
            .get_or_init(|| {
                reqwest::blocking::Client::builder()
                    .timeout(self.config.timeout)
                    .connect_timeout(self.config.timeout)
                    .build()
                    .map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(|e| RemoteError::Client(e.clone()))
    }

    pub(crate) fn count_fetch(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    /// Remember the most recent failure for the layer above.
    pub(crate) fn record(&self, err: &RemoteError) {
        tracing::warn!(error = %err, "Remote page fetch failed");
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
    }
}

/// One handle's view of the page-range VFS.
///
/// Cloning shares the cache and counters. The VFS itself is registered once
/// per process and never unregistered; per-handle state is dropped with the
/// last clone and the last file opened through it.
#[derive(Clone)]
pub struct HttpBackend {
    id: u64,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("id", &self.id)
            .field("config", &self.shared.config)
            .finish()
    }
}

impl HttpBackend {
    /// Validate `config` and attach a new backend to the process-wide VFS,
    /// registering the VFS on first use.
    pub fn register(config: BackendConfig) -> Result<Self, RemoteError> {
        config.validate()?;
        ensure_vfs()?;
        let id = NEXT_BACKEND_ID.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(Shared::new(config));
        {
            let mut backends = BACKENDS.lock().unwrap_or_else(PoisonError::into_inner);
            backends.retain(|_, weak| weak.strong_count() > 0);
            backends.insert(id, Arc::downgrade(&shared));
        }
        tracing::debug!(vfs = VFS_NAME, id, ?config, "Attached HTTP page backend");
        Ok(Self { id, shared })
    }

    pub fn vfs_name(&self) -> &'static str {
        VFS_NAME
    }

    /// SQLite URI opening `url` read-only through this backend.
    ///
    /// The URL is percent-encoded whole, so its own query string survives;
    /// any fragment is dropped since it never reaches the server.
    pub fn file_uri(&self, url: &Url) -> String {
        let mut url = url.clone();
        url.set_fragment(None);
        let path: String = url::form_urlencoded::byte_serialize(url.as_str().as_bytes()).collect();
        format!(
            "file:{path}?vfs={VFS_NAME}&immutable=1&{}={}",
            BACKEND_PARAM.to_string_lossy(),
            self.id
        )
    }

    pub fn config(&self) -> &BackendConfig {
        self.shared.config()
    }

    /// Pages fetched over the network so far (cache hits excluded).
    pub fn pages_fetched(&self) -> u64 {
        self.shared.pages_fetched.load(Ordering::Relaxed)
    }

    /// Take the most recent fetch failure, if any.
    pub fn take_error(&self) -> Option<String> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
