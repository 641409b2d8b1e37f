use lru::LruCache;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use std::sync::{Arc, Mutex, PoisonError};

use super::{RemoteError, Shared};

/// One remote file opened through the page backend.
pub(crate) struct RemoteFile {
    url: String,
    size: u64,
    page_size: u64,
    shared: Arc<Shared>,
    cache: Mutex<LruCache<u64, Arc<[u8]>>>,
}

impl RemoteFile {
    /// Probe `url` for its total size with a one-byte ranged request.
    pub(crate) fn open(shared: Arc<Shared>, url: &str) -> Result<Self, RemoteError> {
        let client = shared.client()?;
        let response = client.get(url).header(RANGE, "bytes=0-0").send()?;
        let status = response.status();
        if status == StatusCode::OK {
            return Err(RemoteError::RangeUnsupported);
        }
        if status != StatusCode::PARTIAL_CONTENT {
            return Err(RemoteError::HttpStatus(status.as_u16()));
        }
        let size = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total)
            .ok_or(RemoteError::RangeUnsupported)?;

        tracing::info!(url = %url, size, "Opened remote database");

        let config = *shared.config();
        Ok(Self {
            url: url.to_string(),
            size,
            page_size: u64::from(config.max_page_size),
            cache: Mutex::new(LruCache::new(config.cache_pages())),
            shared,
        })
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Fill `buf` from `offset`. Returns fewer bytes than requested only at
    /// end of file.
    pub(crate) fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, RemoteError> {
        let mut filled = 0usize;
        while filled < buf.len() {
            let pos = offset + filled as u64;
            if pos >= self.size {
                break;
            }
            let index = pos / self.page_size;
            let page = self.page(index)?;
            let within = (pos - index * self.page_size) as usize;
            let available = page.len().saturating_sub(within);
            if available == 0 {
                break;
            }
            let n = available.min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&page[within..within + n]);
            filled += n;
        }
        Ok(filled)
    }

    fn page(&self, index: u64) -> Result<Arc<[u8]>, RemoteError> {
        if let Some(page) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&index)
        {
            return Ok(Arc::clone(page));
        }

        let start = index * self.page_size;
        let end = (start + self.page_size).min(self.size);
        let page: Arc<[u8]> = Arc::from(self.fetch_range(start, end)?);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(index, Arc::clone(&page));
        Ok(page)
    }

    /// Fetch `[start, end)`.
    fn fetch_range(&self, start: u64, end: u64) -> Result<Vec<u8>, RemoteError> {
        let expected = end - start;
        let client = self.shared.client()?;
        let response = client
            .get(&self.url)
            .header(RANGE, format!("bytes={}-{}", start, end - 1))
            .send()?;
        let status = response.status();
        if status != StatusCode::PARTIAL_CONTENT {
            return Err(RemoteError::HttpStatus(status.as_u16()));
        }
        let body = response.bytes()?;
        self.shared.count_fetch();
        if body.len() as u64 != expected {
            return Err(RemoteError::IncompleteResponse {
                expected,
                received: body.len(),
            });
        }
        tracing::trace!(url = %self.url, start, end, "Fetched page");
        Ok(body.to_vec())
    }
}

/// Total length from a `Content-Range: bytes a-b/total` header.
fn content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.split_once('/')?;
    total.trim().parse().ok()
}
