//! Shared helpers: fixture catalogs and a ranged HTTP server for them.

#![allow(dead_code)]

#[path = "../../src/storage/fixture.rs"]
pub mod fixture;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Answer `Range: bytes=a-b` from `body`; a request without a range gets
/// the whole body with 200. Once `broken` is set every request gets 500.
pub fn ranged(
    body: Arc<Vec<u8>>,
    broken: Arc<AtomicBool>,
) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync {
    move |req: &Request| {
        if broken.load(Ordering::SeqCst) {
            return ResponseTemplate::new(500);
        }
        let range = req
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("bytes="))
            .and_then(|v| v.split_once('-'))
            .and_then(|(a, b)| Some((a.parse::<usize>().ok()?, b.parse::<usize>().ok()?)));
        match range {
            Some((start, _)) if start >= body.len() => ResponseTemplate::new(416),
            Some((start, end)) => {
                let end = end.min(body.len() - 1);
                ResponseTemplate::new(206)
                    .insert_header(
                        "content-range",
                        format!("bytes {}-{}/{}", start, end, body.len()).as_str(),
                    )
                    .set_body_bytes(body[start..=end].to_vec())
            }
            None => ResponseTemplate::new(200).set_body_bytes(body.to_vec()),
        }
    }
}

/// A fixture catalog served over HTTP.
pub struct RemoteCatalog {
    pub server: MockServer,
    pub url: String,
    pub local_path: std::path::PathBuf,
    pub size: usize,
    broken: Arc<AtomicBool>,
    _dir: tempfile::TempDir,
}

impl RemoteCatalog {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let local_path = fixture::build_catalog(dir.path()).await;
        let body = Arc::new(std::fs::read(&local_path).unwrap());
        let size = body.len();
        let broken = Arc::new(AtomicBool::new(false));

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feeds.db"))
            .respond_with(ranged(body, Arc::clone(&broken)))
            .mount(&server)
            .await;

        let url = format!("{}/feeds.db", server.uri());
        Self {
            server,
            url,
            local_path,
            size,
            broken,
            _dir: dir,
        }
    }

    pub fn local_locator(&self) -> &str {
        self.local_path.to_str().unwrap()
    }

    /// Make every further request fail with 500.
    pub fn break_server(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    /// Number of pages in the served file.
    pub fn page_count(&self) -> u64 {
        (self.size as u64).div_ceil(u64::from(fixture::PAGE_SIZE))
    }
}
