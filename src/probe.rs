//! Reachability probe for remote PDFs
//!
//! Checks that an absolute URL answers before the viewer commits to it, so a
//! bad link is reported next to the input instead of as a failed load.
//! `HEAD` is tried first; servers that refuse it get a two-byte ranged `GET`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RANGE;
use thiserror::Error;
use url::Url;

/// The probe could not reach the document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("PDF URL is unreachable or blocked by cross-origin policy")]
pub struct UnreachableError {
    pub url: String,
    pub detail: String,
}

#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self, url: &Url) -> Result<(), UnreachableError>;
}

/// Probe backed by reqwest
#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self, url: &Url) -> Result<(), UnreachableError> {
        match self.client.head(url.clone()).send().await {
            Ok(response) if response.status().is_success() => return Ok(()),
            Ok(response) => {
                tracing::debug!(
                    "HEAD {} answered {}, retrying with ranged GET",
                    url,
                    response.status()
                );
            }
            Err(e) => {
                tracing::debug!("HEAD {} failed: {}, retrying with ranged GET", url, e);
            }
        }

        let response = self
            .client
            .get(url.clone())
            .header(RANGE, "bytes=0-1")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Reachability probe failed for {}: {}", url, e);
                UnreachableError {
                    url: url.to_string(),
                    detail: e.to_string(),
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            tracing::warn!(
                "Reachability probe for {} answered {}",
                url,
                response.status()
            );
            Err(UnreachableError {
                url: url.to_string(),
                detail: format!("server responded {}", response.status()),
            })
        }
    }
}
