//! MuPDF rasterization backend
//!
//! MuPDF documents are not thread-safe. The handle keeps only the document
//! bytes and opens a fresh `mupdf::Document` for every operation, serialized
//! through a mutex and run on the blocking pool.

use std::sync::Arc;

use async_trait::async_trait;
use mupdf::{Colorspace, Document, Matrix};
use parking_lot::Mutex;

use super::{DocumentHandle, PageSize, RasterBuffer, RasterError, Rasterizer};

const PDF_MIME: &str = "application/pdf";

/// Scale bounds passed to MuPDF
const MIN_SCALE: f32 = 0.05;
const MAX_SCALE: f32 = 8.0;

impl From<mupdf::Error> for RasterError {
    fn from(err: mupdf::Error) -> Self {
        RasterError::Render(err.to_string())
    }
}

#[derive(Default)]
pub struct MupdfRasterizer;

impl MupdfRasterizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Rasterizer for MupdfRasterizer {
    fn name(&self) -> &'static str {
        "mupdf"
    }

    async fn open(&self, data: Arc<Vec<u8>>) -> Result<Arc<dyn DocumentHandle>, RasterError> {
        let doc = tokio::task::spawn_blocking(move || MupdfDocument::open(data))
            .await
            .map_err(|e| RasterError::Open(format!("Task join error: {}", e)))??;
        Ok(Arc::new(doc))
    }
}

struct MupdfDocument {
    data: Arc<Vec<u8>>,
    page_count: usize,
    lock: Arc<Mutex<()>>,
}

impl MupdfDocument {
    fn open(data: Arc<Vec<u8>>) -> Result<Self, RasterError> {
        let doc =
            Document::from_bytes(&data, PDF_MIME).map_err(|e| RasterError::Open(e.to_string()))?;
        let page_count = doc
            .page_count()
            .map_err(|e| RasterError::Open(e.to_string()))?;

        Ok(Self {
            data,
            page_count: page_count.max(0) as usize,
            lock: Arc::new(Mutex::new(())),
        })
    }

    /// Run `f` on a freshly opened document on the blocking pool
    async fn with_doc<F, R>(&self, f: F) -> Result<R, RasterError>
    where
        F: FnOnce(&Document) -> Result<R, RasterError> + Send + 'static,
        R: Send + 'static,
    {
        let data = Arc::clone(&self.data);
        let lock = Arc::clone(&self.lock);

        tokio::task::spawn_blocking(move || {
            let _guard = lock.lock();
            let doc = Document::from_bytes(&data, PDF_MIME)?;
            f(&doc)
        })
        .await
        .map_err(|e| RasterError::Render(format!("Task join error: {}", e)))?
    }

    fn check_index(&self, index: usize) -> Result<(), RasterError> {
        if index >= self.page_count {
            Err(RasterError::PageNotFound(index))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentHandle for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    async fn page_size(&self, index: usize) -> Result<PageSize, RasterError> {
        self.check_index(index)?;
        self.with_doc(move |doc| {
            let bounds = doc.load_page(index as i32)?.bounds()?;
            Ok(PageSize {
                width: bounds.x1 - bounds.x0,
                height: bounds.y1 - bounds.y0,
            })
        })
        .await
    }

    async fn render(&self, index: usize, scale: f32) -> Result<RasterBuffer, RasterError> {
        self.check_index(index)?;
        let scale = scale.clamp(MIN_SCALE, MAX_SCALE);

        self.with_doc(move |doc| {
            let page = doc.load_page(index as i32)?;
            let matrix = Matrix::new_scale(scale, scale);
            let pixmap = page.to_pixmap(&matrix, &Colorspace::device_rgb(), false, true)?;
            pixmap_to_rgba(&pixmap)
        })
        .await
    }
}

fn pixmap_to_rgba(pixmap: &mupdf::Pixmap) -> Result<RasterBuffer, RasterError> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    if n < 3 {
        return Err(RasterError::Render(format!(
            "unexpected pixmap with {} components",
            n
        )));
    }

    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = (y * width as usize + x) * n;
            let r = samples.get(offset).copied().unwrap_or(0);
            let g = samples.get(offset + 1).copied().unwrap_or(0);
            let b = samples.get(offset + 2).copied().unwrap_or(0);
            let a = if n >= 4 {
                samples.get(offset + 3).copied().unwrap_or(255)
            } else {
                255
            };
            pixels.extend_from_slice(&[r, g, b, a]);
        }
    }

    Ok(RasterBuffer {
        width,
        height,
        pixels,
    })
}
