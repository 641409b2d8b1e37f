use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

/// Errors that can occur while interpreting a catalog locator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocatorError {
    /// Nothing but whitespace was given.
    #[error("Empty database locator")]
    Empty,
    /// The locator looked like a URL but could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// An http(s) URL without a host.
    #[error("URL has no host: {0}")]
    MissingHost(String),
}

/// Where the catalog file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Served over HTTP; read page by page with range requests.
    Remote(Url),
    /// A file on local disk, opened through SQLite's default VFS.
    Local(PathBuf),
}

impl Locator {
    pub fn is_remote(&self) -> bool {
        matches!(self, Locator::Remote(_))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Remote(url) => write!(f, "{url}"),
            Locator::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Interpret `input` as a catalog locator.
///
/// Anything with a `scheme://` prefix must be http or https; everything else
/// is a local path.
///
/// # Examples
///
/// ```
/// use newspod::util::{parse_locator, Locator};
///
/// let remote = parse_locator("https://example.com/feeds.db").unwrap();
/// assert!(remote.is_remote());
///
/// let local = parse_locator("./feeds.db").unwrap();
/// assert!(!local.is_remote());
///
/// assert!(parse_locator("ftp://example.com/feeds.db").is_err());
/// ```
pub fn parse_locator(input: &str) -> Result<Locator, LocatorError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(LocatorError::Empty);
    }
    if !input.contains("://") {
        return Ok(Locator::Local(PathBuf::from(input)));
    }

    let url = Url::parse(input)?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(LocatorError::UnsupportedScheme(scheme.to_owned())),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(LocatorError::MissingHost(input.to_owned()));
    }
    Ok(Locator::Remote(url))
}
