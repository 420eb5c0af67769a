//! Rasterization boundary
//!
//! The viewer never decodes PDF itself. It talks to a [`Rasterizer`] that
//! opens document bytes into a [`DocumentHandle`], which reports page sizes
//! and renders pages into RGBA buffers. Any backend honoring this contract
//! can be swapped in; MuPDF is the one shipped (feature `mupdf`).

mod encode;
#[cfg(feature = "mupdf")]
mod mupdf;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use encode::{encode_jpeg, EncodedImage};
#[cfg(feature = "mupdf")]
pub use self::mupdf::MupdfRasterizer;

/// Errors raised by a rasterization backend
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Failed to open document: {0}")]
    Open(String),

    #[error("Page {0} not found")]
    PageNotFound(usize),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("PDF backend unavailable: {0}")]
    Unavailable(String),
}

/// Page size in PDF points (1/72 inch)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// Rasterized page, RGBA8, row-major
#[derive(Debug, Clone)]
pub struct RasterBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Opens documents
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Decode document bytes
    async fn open(&self, data: Arc<Vec<u8>>) -> Result<Arc<dyn DocumentHandle>, RasterError>;
}

/// An opened document
#[async_trait]
pub trait DocumentHandle: Send + Sync {
    fn page_count(&self) -> usize;

    /// Native page size (index is 0-based)
    async fn page_size(&self, index: usize) -> Result<PageSize, RasterError>;

    /// Render a page at `scale` times its native size
    async fn render(&self, index: usize, scale: f32) -> Result<RasterBuffer, RasterError>;
}

/// Stand-in used when no backend is compiled in; every open fails.
pub struct UnavailableRasterizer;

#[async_trait]
impl Rasterizer for UnavailableRasterizer {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn open(&self, _data: Arc<Vec<u8>>) -> Result<Arc<dyn DocumentHandle>, RasterError> {
        Err(RasterError::Unavailable(
            "server was built without a PDF rendering backend".to_string(),
        ))
    }
}

/// The rasterizer this build ships with
pub fn default_rasterizer() -> Arc<dyn Rasterizer> {
    #[cfg(feature = "mupdf")]
    {
        Arc::new(MupdfRasterizer::new())
    }
    #[cfg(not(feature = "mupdf"))]
    {
        Arc::new(UnavailableRasterizer)
    }
}
