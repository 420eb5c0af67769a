//! Viewer shell
//!
//! Owns the selected document source. Sources come from three places: a URL
//! typed by the user, an uploaded file, or the `?pdf=` parameter of the page
//! link. A source is validated (and probed, for absolute URLs) before it is
//! committed; on failure the previous selection stays in place and the error
//! is kept for display next to the input.
//!
//! Probing is split out as a [`PendingSource`] so callers sharing the shell
//! behind a lock can run it unlocked. Only the latest request commits.

use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::object_url::ObjectUrlStore;
use crate::probe::ReachabilityProbe;
use crate::source::{normalize_link_value, read_link, write_link, PdfSource, SourceValidationError};

use super::book::{BookNavigator, BookView};
use super::error::ShellError;
use super::renderer::{ProgressiveRenderer, RendererSnapshot};

pub struct ViewerShell {
    renderer: ProgressiveRenderer,
    probe: Arc<dyn ReachabilityProbe>,
    objects: ObjectUrlStore,
    book: BookNavigator,
    /// Page link, with `?pdf=` kept in sync with the selection
    page_url: Url,
    input: String,
    selected: Option<PdfSource>,
    /// Object URL minted for the current upload, if any
    object_url: Option<String>,
    file_name: Option<String>,
    error: Option<ShellError>,
    /// Bumped by every selection request; stale probe results are dropped
    request: u64,
}

/// User input parsed into a source, waiting for its reachability check
pub struct PendingSource {
    request: u64,
    parsed: Result<PdfSource, ShellError>,
    probe: Arc<dyn ReachabilityProbe>,
}

/// Outcome of [`PendingSource::check`], to be committed with
/// [`ViewerShell::finish_use_url`]
pub struct CheckedSource {
    request: u64,
    result: Result<PdfSource, ShellError>,
}

impl PendingSource {
    /// Probe absolute URLs. Site paths and object URLs pass as-is.
    pub async fn check(self) -> CheckedSource {
        let result = match self.parsed {
            Ok(PdfSource::Remote(url)) => match self.probe.probe(&url).await {
                Ok(()) => Ok(PdfSource::Remote(url)),
                Err(e) => Err(ShellError::from(e)),
            },
            other => other,
        };
        CheckedSource {
            request: self.request,
            result,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellSnapshot {
    pub selected: Option<String>,
    pub input: String,
    pub file_name: Option<String>,
    pub error: Option<String>,
    /// Shareable page link; `None` while an upload is shown
    pub link: Option<String>,
    pub page_url: String,
    pub book: BookView,
    pub renderer: RendererSnapshot,
}

impl ViewerShell {
    pub fn new(
        renderer: ProgressiveRenderer,
        probe: Arc<dyn ReachabilityProbe>,
        objects: ObjectUrlStore,
        page_url: Url,
    ) -> Self {
        Self {
            book: BookNavigator::new(renderer.clone()),
            renderer,
            probe,
            objects,
            page_url,
            input: String::new(),
            selected: None,
            object_url: None,
            file_name: None,
            error: None,
            request: 0,
        }
    }

    pub fn renderer(&self) -> &ProgressiveRenderer {
        &self.renderer
    }

    pub fn book_mut(&mut self) -> &mut BookNavigator {
        &mut self.book
    }

    pub fn selected(&self) -> Option<&PdfSource> {
        self.selected.as_ref()
    }

    pub fn error(&self) -> Option<&ShellError> {
        self.error.as_ref()
    }

    pub fn page_url(&self) -> &Url {
        &self.page_url
    }

    /// Select the URL or path typed by the user.
    ///
    /// Blank input is ignored. Errors are also kept as the inline error.
    pub async fn handle_use_url(&mut self, input: &str) -> Result<(), ShellError> {
        match self.begin_use_url(input) {
            Some(pending) => {
                let checked = pending.check().await;
                self.finish_use_url(checked)
            }
            None => Ok(()),
        }
    }

    /// Record `input` and parse it. `None` for blank input.
    pub fn begin_use_url(&mut self, input: &str) -> Option<PendingSource> {
        let input = input.trim();
        self.input = input.to_string();
        if input.is_empty() {
            return None;
        }

        Some(PendingSource {
            request: self.next_request(),
            parsed: PdfSource::parse_user_input(input).map_err(ShellError::from),
            probe: Arc::clone(&self.probe),
        })
    }

    /// Commit a checked source unless a newer request came in meanwhile
    pub fn finish_use_url(&mut self, checked: CheckedSource) -> Result<(), ShellError> {
        if checked.request != self.request {
            tracing::debug!("Dropping superseded source request {}", checked.request);
            return Ok(());
        }

        let source = match checked.result {
            Ok(source) => source,
            Err(e) => {
                tracing::info!("Rejected PDF source '{}': {}", self.input, e);
                self.error = Some(e.clone());
                return Err(e);
            }
        };

        self.error = None;
        self.release_object_url();
        self.page_url = write_link(&self.page_url, Some(source.as_str()));
        self.select(source);
        Ok(())
    }

    /// Select an uploaded file. The bytes are kept under a fresh object URL.
    pub fn handle_file(&mut self, file_name: &str, data: Vec<u8>) -> PdfSource {
        self.next_request();
        self.release_object_url();

        let url = self.objects.create(data);
        tracing::info!("Uploaded {} as {}", file_name, url);
        self.object_url = Some(url.clone());
        self.file_name = Some(file_name.to_string());
        self.error = None;

        // Object URLs are not shareable
        self.page_url = write_link(&self.page_url, None);

        let source = PdfSource::object(url);
        self.select(source.clone());
        source
    }

    /// Preselect the document named by the `pdf` parameter of `href`.
    ///
    /// Links without the parameter only update the page URL.
    pub async fn preselect_from_link(&mut self, href: &str) -> Result<(), ShellError> {
        match self.begin_link(href)? {
            Some(pending) => {
                let checked = pending.check().await;
                self.finish_use_url(checked)
            }
            None => Ok(()),
        }
    }

    /// Adopt `href` as the page URL and parse its `pdf` parameter
    pub fn begin_link(&mut self, href: &str) -> Result<Option<PendingSource>, ShellError> {
        let page_url = Url::parse(href.trim()).map_err(|e| {
            let err = ShellError::from(SourceValidationError::Malformed {
                input: href.to_string(),
                reason: e.to_string(),
            });
            self.error = Some(err.clone());
            err
        })?;
        self.page_url = page_url;

        let Some(value) = read_link(&self.page_url) else {
            return Ok(None);
        };
        let normalized = normalize_link_value(&value);
        tracing::debug!("Preselecting {} from page link", normalized);
        Ok(self.begin_use_url(&normalized))
    }

    /// Drop the selection and release any upload
    pub fn teardown(&mut self) {
        self.next_request();
        self.release_object_url();
        self.selected = None;
        self.file_name = None;
        self.error = None;
        self.input.clear();
        self.book.reset();
        self.renderer.clear();
    }

    pub fn snapshot(&self) -> ShellSnapshot {
        let link = self
            .selected
            .as_ref()
            .filter(|source| !source.is_local())
            .map(|_| self.page_url.to_string());

        ShellSnapshot {
            selected: self.selected.as_ref().map(|s| s.to_string()),
            input: self.input.clone(),
            file_name: self.file_name.clone(),
            error: self.error.as_ref().map(|e| e.to_string()),
            link,
            page_url: self.page_url.to_string(),
            book: self.book.view(),
            renderer: self.renderer.snapshot(),
        }
    }

    fn next_request(&mut self) -> u64 {
        self.request += 1;
        self.request
    }

    /// Commit `source` and start loading it. Re-selecting the current
    /// source is a no-op.
    fn select(&mut self, source: PdfSource) -> bool {
        if self.selected.as_ref() == Some(&source) {
            tracing::debug!("{} is already selected", source);
            return false;
        }

        tracing::info!("Selected {}", source);
        self.selected = Some(source.clone());
        self.book.reset();
        // Runs detached; progress is observed through the renderer
        drop(self.renderer.load(source));
        true
    }

    fn release_object_url(&mut self) {
        if let Some(url) = self.object_url.take() {
            self.objects.revoke(&url);
            self.file_name = None;
        }
    }
}

impl Drop for ViewerShell {
    fn drop(&mut self) {
        self.release_object_url();
    }
}
