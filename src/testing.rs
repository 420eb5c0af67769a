//! Test doubles for the rendering pipeline
//!
//! `FakeRasterizer` reads a tiny text description instead of a PDF:
//! `tag=a;pages=10;width=612;height=792;gate;fail=2;flaky=1,3`
//!
//! - `gate`: every render waits for a permit on [`FakeRasterizer::gate`]
//! - `fail`: pages that always fail
//! - `flaky`: pages that fail on their first attempt only
//!
//! Anything not starting with `tag=` or `pages=` is rejected as corrupt.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use crate::fetch::DocumentFetcher;
use crate::raster::{DocumentHandle, PageSize, RasterBuffer, RasterError, Rasterizer};
use crate::source::PdfSource;
use crate::viewer::{BookSize, LoadError, ProgressiveRenderer, RendererConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct RenderCall {
    pub tag: String,
    pub index: usize,
    pub scale: f32,
}

#[derive(Clone)]
pub struct FakeRasterizer {
    pub gate: Arc<Semaphore>,
    pub started: Arc<Notify>,
    pub calls: Arc<Mutex<Vec<RenderCall>>>,
}

impl FakeRasterizer {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            started: Arc::new(Notify::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Indices rendered for documents tagged `tag`, in call order
    pub fn rendered(&self, tag: &str) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.tag == tag)
            .map(|call| call.index)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn open(&self, data: Arc<Vec<u8>>) -> Result<Arc<dyn DocumentHandle>, RasterError> {
        let text = String::from_utf8_lossy(&data);
        if !(text.starts_with("tag=") || text.starts_with("pages=")) {
            return Err(RasterError::Open("no objects found".into()));
        }

        let mut doc = FakeDocument {
            tag: String::new(),
            pages: 1,
            size: PageSize {
                width: 612.0,
                height: 792.0,
            },
            gated: false,
            fail: HashSet::new(),
            flaky: Mutex::new(HashSet::new()),
            rasterizer: self.clone(),
        };

        for part in text.split(';') {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            match key.trim() {
                "tag" => doc.tag = value.to_string(),
                "pages" => doc.pages = value.parse().unwrap_or(1),
                "width" => doc.size.width = value.parse().unwrap_or(612.0),
                "height" => doc.size.height = value.parse().unwrap_or(792.0),
                "gate" => doc.gated = true,
                "fail" => doc.fail = parse_indices(value),
                "flaky" => doc.flaky = Mutex::new(parse_indices(value)),
                _ => {}
            }
        }

        Ok(Arc::new(doc))
    }
}

fn parse_indices(value: &str) -> HashSet<usize> {
    value
        .split(',')
        .filter_map(|v| v.trim().parse().ok())
        .collect()
}

struct FakeDocument {
    tag: String,
    pages: usize,
    size: PageSize,
    gated: bool,
    fail: HashSet<usize>,
    flaky: Mutex<HashSet<usize>>,
    rasterizer: FakeRasterizer,
}

#[async_trait]
impl DocumentHandle for FakeDocument {
    fn page_count(&self) -> usize {
        self.pages
    }

    async fn page_size(&self, index: usize) -> Result<PageSize, RasterError> {
        if index >= self.pages {
            return Err(RasterError::PageNotFound(index));
        }
        Ok(self.size)
    }

    async fn render(&self, index: usize, scale: f32) -> Result<RasterBuffer, RasterError> {
        self.rasterizer.calls.lock().push(RenderCall {
            tag: self.tag.clone(),
            index,
            scale,
        });
        self.rasterizer.started.notify_one();

        if self.gated {
            self.rasterizer
                .gate
                .acquire()
                .await
                .map_err(|e| RasterError::Render(e.to_string()))?
                .forget();
        }

        if self.fail.contains(&index) || self.flaky.lock().remove(&index) {
            return Err(RasterError::Render(format!("page {} is broken", index)));
        }

        let width = ((self.size.width * scale).round() as u32).max(1);
        let height = ((self.size.height * scale).round() as u32).max(1);
        Ok(RasterBuffer {
            width,
            height,
            pixels: vec![255; width as usize * height as usize * 4],
        })
    }
}

/// Fetcher serving fixed documents by source string
#[derive(Default)]
pub struct MemoryFetcher {
    documents: Mutex<HashMap<String, Arc<Vec<u8>>>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, source: &str, description: &str) {
        self.documents
            .lock()
            .insert(source.to_string(), Arc::new(description.as_bytes().to_vec()));
    }
}

#[async_trait]
impl DocumentFetcher for MemoryFetcher {
    async fn fetch(&self, source: &PdfSource) -> Result<Arc<Vec<u8>>, LoadError> {
        self.documents
            .lock()
            .get(source.as_str())
            .cloned()
            .ok_or_else(|| LoadError::NotFound(source.to_string()))
    }
}

/// Renderer over fake documents keyed by source string
pub fn fake_renderer(
    documents: &[(&str, &str)],
    container_width: f32,
) -> (ProgressiveRenderer, FakeRasterizer) {
    let fetcher = MemoryFetcher::new();
    for (source, description) in documents {
        fetcher.insert(source, description);
    }
    let rasterizer = FakeRasterizer::new();
    let config = RendererConfig {
        initial_size: BookSize::from_container_width(container_width),
        ..RendererConfig::default()
    };
    let renderer =
        ProgressiveRenderer::new(Arc::new(fetcher), Arc::new(rasterizer.clone()), config);
    (renderer, rasterizer)
}
