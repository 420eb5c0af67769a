//! Progressive page renderer
//!
//! Turns one document source into a sequence of page images:
//!
//! ```text
//! idle ─▶ loading ─▶ partial-ready ⇄ rendering-more ─▶ ready
//!            │
//!            └─▶ error
//! ```
//!
//! After the document opens, the first few pages are rendered in order
//! (eager prefetch) before the document is shown. The rest are rendered on
//! demand around the read position (lazy neighbor fill).
//!
//! Every load gets a new generation number. Work started for an older
//! generation may finish, but its result is dropped on arrival instead of
//! being written into the current slots. The same check covers viewport
//! changes: a render finished for an outdated page width is discarded.
//!
//! State lives behind a `parking_lot::Mutex` that is only taken for short,
//! synchronous sections and never held across an `.await`.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::fetch::DocumentFetcher;
use crate::raster::{encode_jpeg, DocumentHandle, Rasterizer};
use crate::source::PdfSource;

use super::error::{LoadError, PageRenderError};
use super::slots::{neighbor_window, PageImage, PageSlots};
use super::viewport::{render_scale, BookSize};

const EVENT_CAPACITY: usize = 256;

/// Renderer tuning
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Pages rendered before the document is shown
    pub eager_pages: usize,
    /// Lazy window: pages behind the read position
    pub window_before: usize,
    /// Lazy window: pages ahead of the read position
    pub window_after: usize,
    pub jpeg_quality: u8,
    /// Page size used until the first viewport observation
    pub initial_size: BookSize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            eager_pages: 4,
            window_before: 2,
            window_after: 3,
            jpeg_quality: 92,
            initial_size: BookSize::from_container_width(720.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    Loading,
    PartialReady,
    RenderingMore,
    Ready,
    Error,
}

/// Published on every state change, tagged with the load generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RenderEvent {
    Loading { generation: u64, source: String },
    Opened { generation: u64, page_count: usize },
    SlotFilled { generation: u64, index: usize },
    SlotFailed { generation: u64, index: usize, message: String },
    PartialReady { generation: u64 },
    RenderingMore { generation: u64 },
    Ready { generation: u64 },
    Failed { generation: u64, message: String },
    Cleared { generation: u64 },
}

impl RenderEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Loading { generation, .. }
            | Self::Opened { generation, .. }
            | Self::SlotFilled { generation, .. }
            | Self::SlotFailed { generation, .. }
            | Self::PartialReady { generation }
            | Self::RenderingMore { generation }
            | Self::Ready { generation }
            | Self::Failed { generation, .. }
            | Self::Cleared { generation } => *generation,
        }
    }
}

/// Point-in-time view of the renderer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererSnapshot {
    pub generation: u64,
    pub source: Option<String>,
    pub phase: Phase,
    pub error: Option<String>,
    pub page_count: Option<usize>,
    pub filled: Vec<bool>,
    pub read_position: usize,
    pub book_size: BookSize,
}

/// Shared handle to the renderer; clones drive the same state
#[derive(Clone)]
pub struct ProgressiveRenderer {
    inner: Arc<Inner>,
}

struct Inner {
    fetcher: Arc<dyn DocumentFetcher>,
    rasterizer: Arc<dyn Rasterizer>,
    config: RendererConfig,
    state: Mutex<RenderState>,
    events: broadcast::Sender<RenderEvent>,
}

struct RenderState {
    generation: u64,
    source: Option<PdfSource>,
    phase: Phase,
    error: Option<String>,
    document: Option<Arc<dyn DocumentHandle>>,
    slots: PageSlots,
    book_size: BookSize,
    read_position: usize,
    filler_active: bool,
    in_flight: HashSet<usize>,
    /// Pages that failed since the read position last changed
    failed: HashSet<usize>,
}

/// One page render, bound to the generation and width it was started for
struct PageJob {
    generation: u64,
    index: usize,
    target_width: u32,
    document: Arc<dyn DocumentHandle>,
}

impl ProgressiveRenderer {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        rasterizer: Arc<dyn Rasterizer>,
        config: RendererConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = RenderState {
            generation: 0,
            source: None,
            phase: Phase::Idle,
            error: None,
            document: None,
            slots: PageSlots::default(),
            book_size: config.initial_size,
            read_position: 0,
            filler_active: false,
            in_flight: HashSet::new(),
            failed: HashSet::new(),
        };

        tracing::info!("Page renderer using {} backend", rasterizer.name());

        Self {
            inner: Arc::new(Inner {
                fetcher,
                rasterizer,
                config,
                state: Mutex::new(state),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RenderEvent> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self) -> RendererSnapshot {
        let state = self.inner.state.lock();
        RendererSnapshot {
            generation: state.generation,
            source: state.source.as_ref().map(|s| s.to_string()),
            phase: state.phase,
            error: state.error.clone(),
            page_count: state.document.as_ref().map(|_| state.slots.len()),
            filled: state.slots.filled_mask(),
            read_position: state.read_position,
            book_size: state.book_size,
        }
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    pub fn book_size(&self) -> BookSize {
        self.inner.state.lock().book_size
    }

    /// Page count of the open document, if any
    pub fn page_count(&self) -> Option<usize> {
        let state = self.inner.state.lock();
        state.document.as_ref().map(|_| state.slots.len())
    }

    pub fn read_position(&self) -> usize {
        self.inner.state.lock().read_position
    }

    pub fn is_filled(&self, index: usize) -> bool {
        self.inner.state.lock().slots.is_filled(index)
    }

    pub fn page(&self, index: usize) -> Option<Arc<PageImage>> {
        self.inner.state.lock().slots.get(index)
    }

    /// Start loading `source` in the background.
    ///
    /// The renderer switches to `loading` before this returns; earlier loads
    /// are void from that point on.
    pub fn load(&self, source: PdfSource) -> JoinHandle<Result<usize, LoadError>> {
        let (generation, target_width) = self.begin(&source);
        let renderer = self.clone();
        tokio::spawn(async move { renderer.run_load(generation, target_width, source).await })
    }

    /// Load `source` and wait until the eager pages are rendered.
    ///
    /// Returns the page count. Lazy fill continues in the background.
    pub async fn open(&self, source: PdfSource) -> Result<usize, LoadError> {
        let (generation, target_width) = self.begin(&source);
        self.run_load(generation, target_width, source).await
    }

    /// Render page `index` unless it is already filled or being rendered.
    ///
    /// Returns whether this call stored a new image. A no-op while the
    /// document is still loading; eager prefetch owns that phase.
    pub async fn fill_slot(&self, index: usize) -> Result<bool, PageRenderError> {
        let job = {
            let mut state = self.inner.state.lock();
            let Some(document) = state.document.clone() else {
                return Err(PageRenderError::NoDocument);
            };
            if index >= state.slots.len() {
                return Err(PageRenderError::OutOfRange {
                    index,
                    page_count: state.slots.len(),
                });
            }
            if state.phase == Phase::Loading
                || state.slots.is_filled(index)
                || state.in_flight.contains(&index)
            {
                return Ok(false);
            }

            state.in_flight.insert(index);
            PageJob {
                generation: state.generation,
                index,
                target_width: state.book_size.width,
                document,
            }
        };

        self.run_job(job).await
    }

    /// Move the read position and fill empty pages around it.
    ///
    /// Never blocks. A render already in progress keeps running; the new
    /// position only decides which page comes next.
    pub fn set_read_position(&self, position: usize) {
        let generation = {
            let mut state = self.inner.state.lock();
            let position = match state.slots.len() {
                0 => position,
                len => position.min(len - 1),
            };
            state.read_position = position;
            state.failed.clear();
            state.generation
        };
        self.spawn_filler(generation);
    }

    /// Apply a container width observation.
    ///
    /// When the page width changes and a document is selected, the document
    /// is reloaded at the new width. The read position carries over, so the
    /// lazy window is refilled around the page being read.
    pub fn resize(&self, container_width: f32) -> Option<JoinHandle<Result<usize, LoadError>>> {
        let size = BookSize::from_container_width(container_width);
        let (generation, source) = {
            let mut state = self.inner.state.lock();
            if state.book_size == size {
                return None;
            }
            tracing::debug!(
                "Page size {}x{} -> {}x{}",
                state.book_size.width,
                state.book_size.height,
                size.width,
                size.height
            );
            state.book_size = size;
            let source = state.source.clone()?;
            let read_position = state.read_position;
            let (generation, _) = self.restart(&mut state, &source, read_position);
            (generation, source)
        };

        tracing::info!("Viewport changed, reloading {} at width {}", source, size.width);
        let renderer = self.clone();
        Some(tokio::spawn(async move {
            renderer.run_load(generation, size.width, source).await
        }))
    }

    /// Drop the current document and return to idle
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        state.source = None;
        state.document = None;
        state.slots = PageSlots::default();
        state.error = None;
        state.read_position = 0;
        state.filler_active = false;
        state.in_flight.clear();
        state.failed.clear();
        state.phase = Phase::Idle;
        self.emit(RenderEvent::Cleared {
            generation: state.generation,
        });
    }

    fn emit(&self, event: RenderEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn set_phase(&self, state: &mut RenderState, phase: Phase) {
        if state.phase == phase {
            return;
        }
        state.phase = phase;

        let generation = state.generation;
        match phase {
            Phase::PartialReady => self.emit(RenderEvent::PartialReady { generation }),
            Phase::RenderingMore => self.emit(RenderEvent::RenderingMore { generation }),
            Phase::Ready => self.emit(RenderEvent::Ready { generation }),
            // Loading, Error and Idle carry details and are emitted by their callers
            Phase::Loading | Phase::Error | Phase::Idle => {}
        }
    }

    /// Start a new generation for `source` and reset all per-document state
    fn begin(&self, source: &PdfSource) -> (u64, u32) {
        let mut state = self.inner.state.lock();
        self.restart(&mut state, source, 0)
    }

    fn restart(
        &self,
        state: &mut RenderState,
        source: &PdfSource,
        read_position: usize,
    ) -> (u64, u32) {
        state.generation += 1;
        state.source = Some(source.clone());
        state.document = None;
        state.slots = PageSlots::default();
        state.error = None;
        state.read_position = read_position;
        state.filler_active = false;
        state.in_flight.clear();
        state.failed.clear();
        state.phase = Phase::Loading;

        self.emit(RenderEvent::Loading {
            generation: state.generation,
            source: source.to_string(),
        });
        (state.generation, state.book_size.width)
    }

    async fn run_load(
        &self,
        generation: u64,
        target_width: u32,
        source: PdfSource,
    ) -> Result<usize, LoadError> {
        tracing::info!(
            "Loading {} (generation {}, page width {})",
            source,
            generation,
            target_width
        );

        let document = match self.fetch_and_open(&source).await {
            Ok(document) => document,
            Err(e) => return Err(self.fail(generation, e)),
        };
        let page_count = document.page_count();

        if !self.install(generation, document) {
            return Err(LoadError::Superseded);
        }

        let eager = self.inner.config.eager_pages.min(page_count);
        for index in 0..eager {
            let job = {
                let mut state = self.inner.state.lock();
                if state.generation != generation {
                    return Err(LoadError::Superseded);
                }
                self.claim(&mut state, index)
            };
            if let Some(job) = job {
                // Page failures leave the slot empty and do not stop the load
                let _ = self.run_job(job).await;
            }
        }

        {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                return Err(LoadError::Superseded);
            }
            let phase = if state.slots.all_filled() {
                Phase::Ready
            } else {
                Phase::PartialReady
            };
            self.set_phase(&mut state, phase);
        }

        tracing::info!(
            "Generation {} ready to show: {} pages, {} prefetched",
            generation,
            page_count,
            eager
        );

        self.spawn_filler(generation);
        Ok(page_count)
    }

    async fn fetch_and_open(
        &self,
        source: &PdfSource,
    ) -> Result<Arc<dyn DocumentHandle>, LoadError> {
        let data = self.inner.fetcher.fetch(source).await?;
        tracing::debug!("Fetched {} bytes from {}", data.len(), source);
        let document = self.inner.rasterizer.open(data).await?;
        Ok(document)
    }

    /// Record a load failure if `generation` is still current
    fn fail(&self, generation: u64, err: LoadError) -> LoadError {
        let mut state = self.inner.state.lock();
        if state.generation != generation {
            tracing::debug!("Ignoring failure of superseded generation {}: {}", generation, err);
            return LoadError::Superseded;
        }

        tracing::error!("Failed to load generation {}: {}", generation, err);
        state.phase = Phase::Error;
        state.error = Some(err.to_string());
        state.slots = PageSlots::default();
        state.document = None;
        self.emit(RenderEvent::Failed {
            generation,
            message: err.to_string(),
        });
        err
    }

    /// Attach the opened document and create its empty slots
    fn install(&self, generation: u64, document: Arc<dyn DocumentHandle>) -> bool {
        let mut state = self.inner.state.lock();
        if state.generation != generation {
            tracing::debug!("Dropping document of superseded generation {}", generation);
            return false;
        }

        let page_count = document.page_count();
        state.slots = PageSlots::new(page_count);
        state.read_position = state.read_position.min(page_count.saturating_sub(1));
        state.document = Some(document);
        self.emit(RenderEvent::Opened {
            generation,
            page_count,
        });
        true
    }

    /// Reserve page `index` for rendering in the current generation
    fn claim(&self, state: &mut RenderState, index: usize) -> Option<PageJob> {
        let document = state.document.clone()?;
        if index >= state.slots.len()
            || state.slots.is_filled(index)
            || state.in_flight.contains(&index)
        {
            return None;
        }

        state.in_flight.insert(index);
        Some(PageJob {
            generation: state.generation,
            index,
            target_width: state.book_size.width,
            document,
        })
    }

    fn spawn_filler(&self, generation: u64) {
        {
            let mut state = self.inner.state.lock();
            if state.generation != generation
                || state.filler_active
                || !matches!(state.phase, Phase::PartialReady | Phase::RenderingMore)
            {
                return;
            }
            state.filler_active = true;
        }

        let renderer = self.clone();
        tokio::spawn(async move { renderer.fill_neighbors(generation).await });
    }

    /// Render empty pages in the window around the read position, lowest
    /// index first. The window is recomputed before every page.
    async fn fill_neighbors(&self, generation: u64) {
        let config = &self.inner.config;
        loop {
            let job = {
                let mut state = self.inner.state.lock();
                if state.generation != generation {
                    return;
                }

                let next = neighbor_window(
                    state.read_position,
                    state.slots.len(),
                    config.window_before,
                    config.window_after,
                )
                .and_then(|window| {
                    state.slots.first_empty_in(window, |index| {
                        !state.failed.contains(&index) && !state.in_flight.contains(&index)
                    })
                });

                let job = next.and_then(|index| self.claim(&mut state, index));
                match job {
                    Some(job) => {
                        self.set_phase(&mut state, Phase::RenderingMore);
                        job
                    }
                    None => {
                        state.filler_active = false;
                        let phase = if state.slots.all_filled() {
                            Phase::Ready
                        } else {
                            Phase::PartialReady
                        };
                        self.set_phase(&mut state, phase);
                        return;
                    }
                }
            };

            let _ = self.run_job(job).await;
        }
    }

    /// Render, encode and commit one page
    async fn run_job(&self, job: PageJob) -> Result<bool, PageRenderError> {
        let result = self.rasterize(&job).await;

        let mut state = self.inner.state.lock();
        let current = state.generation == job.generation;
        if current {
            state.in_flight.remove(&job.index);
        }

        match result {
            Ok(image) => {
                if !current || state.book_size.width != job.target_width {
                    tracing::debug!(
                        "Discarding page {} from generation {} at width {}",
                        job.index,
                        job.generation,
                        job.target_width
                    );
                    return Ok(false);
                }
                if !state.slots.fill(job.index, Arc::new(image)) {
                    return Ok(false);
                }

                tracing::debug!("Page {} ready (generation {})", job.index, job.generation);
                state.failed.remove(&job.index);
                self.emit(RenderEvent::SlotFilled {
                    generation: job.generation,
                    index: job.index,
                });
                if state.slots.all_filled()
                    && matches!(state.phase, Phase::PartialReady | Phase::RenderingMore)
                {
                    self.set_phase(&mut state, Phase::Ready);
                }
                Ok(true)
            }
            Err(message) => {
                if current {
                    tracing::warn!("Page {} failed to render: {}", job.index, message);
                    state.failed.insert(job.index);
                    self.emit(RenderEvent::SlotFailed {
                        generation: job.generation,
                        index: job.index,
                        message: message.clone(),
                    });
                }
                Err(PageRenderError::Render {
                    index: job.index,
                    message,
                })
            }
        }
    }

    async fn rasterize(&self, job: &PageJob) -> Result<PageImage, String> {
        let size = job
            .document
            .page_size(job.index)
            .await
            .map_err(|e| e.to_string())?;
        let scale = render_scale(job.target_width, size.width)
            .ok_or_else(|| format!("invalid page width {}", size.width))?;

        let buffer = job
            .document
            .render(job.index, scale)
            .await
            .map_err(|e| e.to_string())?;

        let quality = self.inner.config.jpeg_quality;
        let image = tokio::task::spawn_blocking(move || encode_jpeg(&buffer, quality))
            .await
            .map_err(|e| format!("Task join error: {}", e))?
            .map_err(|e| e.to_string())?;

        Ok(PageImage {
            index: job.index,
            generation: job.generation,
            target_width: job.target_width,
            image,
        })
    }
}
