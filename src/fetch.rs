//! Document fetching
//!
//! Resolves a [`PdfSource`] into document bytes:
//!
//! - object URLs come from the in-memory upload store
//! - absolute URLs are downloaded with a cache-busting stamp
//! - same-origin paths are downloaded from the configured public origin, or
//!   read straight from the public directory when no origin is configured

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::object_url::ObjectUrlStore;
use crate::source::{CacheBuster, PdfSource};
use crate::viewer::LoadError;

#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, source: &PdfSource) -> Result<Arc<Vec<u8>>, LoadError>;
}

/// Fetcher used by the server
pub struct SourceFetcher {
    client: reqwest::Client,
    objects: ObjectUrlStore,
    public_dir: PathBuf,
    public_origin: Option<Url>,
    buster: CacheBuster,
}

impl SourceFetcher {
    pub fn new(
        objects: ObjectUrlStore,
        public_dir: impl Into<PathBuf>,
        public_origin: Option<Url>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            objects,
            public_dir: public_dir.into(),
            public_origin,
            buster: CacheBuster::new(),
        })
    }

    async fn download(&self, location: &str) -> Result<Arc<Vec<u8>>, LoadError> {
        tracing::debug!("Downloading PDF from {}", location);

        let response = self
            .client
            .get(location)
            .send()
            .await
            .map_err(|e| LoadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Http {
                status: status.as_u16(),
                url: location.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| LoadError::Network(e.to_string()))?;

        Ok(Arc::new(bytes.to_vec()))
    }

    async fn read_public(&self, site_path: &str) -> Result<Arc<Vec<u8>>, LoadError> {
        let path = resolve_public_path(&self.public_dir, site_path)
            .ok_or_else(|| LoadError::NotFound(site_path.to_string()))?;

        tracing::debug!("Reading PDF from {}", path.display());

        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Arc::new(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(LoadError::NotFound(site_path.to_string()))
            }
            Err(e) => Err(LoadError::Network(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl DocumentFetcher for SourceFetcher {
    async fn fetch(&self, source: &PdfSource) -> Result<Arc<Vec<u8>>, LoadError> {
        match source {
            PdfSource::Object(url) => self
                .objects
                .get(url)
                .ok_or_else(|| LoadError::Revoked(url.clone())),
            PdfSource::Remote(_) => {
                let location = source.cache_busted(self.buster.next_stamp());
                self.download(&location).await
            }
            PdfSource::SitePath(path) => match &self.public_origin {
                Some(origin) => {
                    let busted = source.cache_busted(self.buster.next_stamp());
                    let location = origin
                        .join(&busted)
                        .map_err(|e| LoadError::Network(e.to_string()))?;
                    self.download(location.as_str()).await
                }
                None => self.read_public(path).await,
            },
        }
    }
}

/// Map a same-origin path onto the public directory.
///
/// Query and fragment are dropped and the path is percent-decoded. Paths that
/// would escape the directory yield `None`.
fn resolve_public_path(public_dir: &Path, site_path: &str) -> Option<PathBuf> {
    let path = site_path.split(['?', '#']).next().unwrap_or_default();
    let decoded = urlencoding::decode(path).ok()?;
    let relative = Path::new(decoded.trim_start_matches('/'));

    if relative.as_os_str().is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }

    Some(public_dir.join(relative))
}
