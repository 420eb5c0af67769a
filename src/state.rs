//! Application state management

use std::sync::Arc;

use tokio::sync::Mutex;
use url::Url;

use crate::config::Config;
use crate::fetch::{DocumentFetcher, SourceFetcher};
use crate::object_url::ObjectUrlStore;
use crate::probe::{HttpProbe, ReachabilityProbe};
use crate::raster::{default_rasterizer, Rasterizer};
use crate::viewer::{ProgressiveRenderer, ViewerShell, ViewportObserver};

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid page URL: {0}")]
    PageUrl(#[from] url::ParseError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    objects: ObjectUrlStore,
    renderer: ProgressiveRenderer,
    viewport: ViewportObserver,
    shell: Mutex<ViewerShell>,
}

impl AppState {
    /// Build the state with the HTTP fetcher, HTTP probe and the compiled-in
    /// rasterizer.
    ///
    /// Must be called inside a Tokio runtime (starts the viewport debounce task).
    pub fn new(config: Config) -> Result<Self, StateError> {
        let objects = ObjectUrlStore::new();
        let fetcher = SourceFetcher::new(
            objects.clone(),
            config.public.dir.clone(),
            config.public.origin.clone(),
            config.http_timeout(),
        )?;
        let probe = HttpProbe::new(config.http_timeout())?;

        Self::with_parts(
            config,
            objects,
            Arc::new(fetcher),
            Arc::new(probe),
            default_rasterizer(),
        )
    }

    /// Build the state from explicit collaborators
    pub fn with_parts(
        config: Config,
        objects: ObjectUrlStore,
        fetcher: Arc<dyn DocumentFetcher>,
        probe: Arc<dyn ReachabilityProbe>,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Result<Self, StateError> {
        let renderer = ProgressiveRenderer::new(fetcher, rasterizer, config.renderer_config());
        let viewport = ViewportObserver::spawn(renderer.clone(), config.resize_debounce());

        let page_url = match &config.public.origin {
            Some(origin) => origin.clone(),
            None => Url::parse(&format!("http://localhost:{}/", config.server.port))?,
        };
        let shell = ViewerShell::new(renderer.clone(), probe, objects.clone(), page_url);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                objects,
                renderer,
                viewport,
                shell: Mutex::new(shell),
            }),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the upload store
    pub fn objects(&self) -> &ObjectUrlStore {
        &self.inner.objects
    }

    /// Get the page renderer
    pub fn renderer(&self) -> &ProgressiveRenderer {
        &self.inner.renderer
    }

    pub fn viewport(&self) -> &ViewportObserver {
        &self.inner.viewport
    }

    /// Get the viewer shell. Not held across reachability probes; see
    /// [`crate::viewer::PendingSource`].
    pub fn shell(&self) -> &Mutex<ViewerShell> {
        &self.inner.shell
    }
}
