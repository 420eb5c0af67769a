//! PDF source identifiers
//!
//! A source is what the viewer hands to the renderer. It is one of:
//!
//! - an absolute `http(s)` URL (probed for reachability before use)
//! - a same-origin path such as `/pdfs/a.pdf`
//! - a `blob:` object URL minted by the viewer for an uploaded file
//!
//! Also holds the helpers for the `?pdf=` page link and cache-busting.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use thiserror::Error;
use url::Url;

/// Scheme prefix of object URLs minted for uploads
pub const OBJECT_URL_PREFIX: &str = "blob:";

/// Public directory prefix used for bare file names in `?pdf=` links
pub const PUBLIC_PDF_PREFIX: &str = "/pdfs/";

/// Query parameter carrying the selected source in the page link
pub const LINK_PARAM: &str = "pdf";

/// Query parameter appended to defeat intermediate HTTP caches
const CACHE_BUST_PARAM: &str = "v";

/// Rejected source identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceValidationError {
    #[error("Enter a PDF URL or a path starting with '/'")]
    Empty,

    #[error("Only http(s) URLs or paths starting with '/' are supported (got '{0}')")]
    Disallowed(String),

    #[error("Invalid URL '{input}': {reason}")]
    Malformed { input: String, reason: String },
}

/// A validated document source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PdfSource {
    /// Absolute http(s) URL
    Remote(Url),
    /// Same-origin path, always starting with a single '/'
    SitePath(String),
    /// Object URL of an uploaded document
    Object(String),
}

impl PdfSource {
    /// Parse text typed by the user.
    ///
    /// Accepts only absolute `http(s)://` URLs and paths beginning with `/`.
    /// Object URLs are minted by the viewer itself and never accepted here.
    pub fn parse_user_input(input: &str) -> Result<Self, SourceValidationError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SourceValidationError::Empty);
        }

        // "//host/file.pdf" is protocol-relative, not same-origin
        if input.starts_with('/') && !input.starts_with("//") {
            return Ok(Self::SitePath(input.to_string()));
        }

        let lower = input.to_ascii_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return Err(SourceValidationError::Disallowed(input.to_string()));
        }

        let url = Url::parse(input).map_err(|e| SourceValidationError::Malformed {
            input: input.to_string(),
            reason: e.to_string(),
        })?;

        if url.host_str().map_or(true, str::is_empty) {
            return Err(SourceValidationError::Malformed {
                input: input.to_string(),
                reason: "missing host".to_string(),
            });
        }

        Ok(Self::Remote(url))
    }

    /// Wrap an object URL produced by [`crate::object_url::ObjectUrlStore`]
    pub fn object(url: impl Into<String>) -> Self {
        Self::Object(url.into())
    }

    /// The identifier as the viewer shows it
    pub fn as_str(&self) -> &str {
        match self {
            Self::Remote(url) => url.as_str(),
            Self::SitePath(path) => path,
            Self::Object(url) => url,
        }
    }

    /// Object URLs are local to this viewer session
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Location to fetch with a cache-busting stamp appended.
    ///
    /// Object URLs are already unique per upload and come back untouched.
    pub fn cache_busted(&self, stamp: i64) -> String {
        match self {
            Self::Object(url) => url.clone(),
            Self::Remote(url) => {
                let mut url = url.clone();
                url.query_pairs_mut()
                    .append_pair(CACHE_BUST_PARAM, &stamp.to_string());
                url.to_string()
            }
            Self::SitePath(path) => {
                let separator = if path.contains('?') { '&' } else { '?' };
                format!("{path}{separator}{CACHE_BUST_PARAM}={stamp}")
            }
        }
    }
}

impl fmt::Display for PdfSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic millisecond stamps for cache-busting.
///
/// Two reloads within the same millisecond still get distinct stamps.
#[derive(Debug, Default)]
pub struct CacheBuster {
    last: AtomicI64,
}

impl CacheBuster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_stamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Expand a `?pdf=` value into a source identifier.
///
/// Values that already look like URLs or absolute paths are kept; anything
/// else is taken as a file name in the public PDF directory.
pub fn normalize_link_value(value: &str) -> String {
    let value = value.trim();
    if value.starts_with("http") || value.starts_with('/') {
        value.to_string()
    } else {
        format!("{PUBLIC_PDF_PREFIX}{value}")
    }
}

/// Read the `pdf` parameter from a page link
pub fn read_link(page: &Url) -> Option<String> {
    page.query_pairs()
        .find(|(key, _)| key == LINK_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.trim().is_empty())
}

/// Return `page` with the `pdf` parameter replaced (or removed for `None`).
///
/// Other query parameters are preserved in order.
pub fn write_link(page: &Url, value: Option<&str>) -> Url {
    let kept: Vec<(String, String)> = page
        .query_pairs()
        .filter(|(key, _)| key != LINK_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut out = page.clone();
    out.set_query(None);
    if kept.is_empty() && value.is_none() {
        return out;
    }

    {
        let mut pairs = out.query_pairs_mut();
        for (key, val) in &kept {
            pairs.append_pair(key, val);
        }
        if let Some(value) = value {
            pairs.append_pair(LINK_PARAM, value);
        }
    }
    out
}
