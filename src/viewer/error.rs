//! Viewer error types

use thiserror::Error;

use crate::probe::UnreachableError;
use crate::raster::RasterError;
use crate::source::SourceValidationError;

/// Errors surfaced inline by the viewer shell. Both block the load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShellError {
    #[error(transparent)]
    Validation(#[from] SourceValidationError),

    #[error(transparent)]
    Unreachable(#[from] UnreachableError),
}

/// The document could not be fetched or opened.
///
/// Terminal for the load attempt; a new source selection is needed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("Failed to fetch PDF: {0}")]
    Network(String),

    #[error("Failed to fetch PDF: server responded {status} for {url}")]
    Http { status: u16, url: String },

    #[error("PDF not found: {0}")]
    NotFound(String),

    #[error("Uploaded PDF is no longer available")]
    Revoked(String),

    #[error("Failed to render PDF: {0}")]
    Open(String),

    #[error("Load was superseded by a newer document")]
    Superseded,
}

impl From<RasterError> for LoadError {
    fn from(err: RasterError) -> Self {
        LoadError::Open(err.to_string())
    }
}

/// A single page failed. Never fatal for the document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageRenderError {
    #[error("No document is open")]
    NoDocument,

    #[error("Page {index} is out of range (document has {page_count} pages)")]
    OutOfRange { index: usize, page_count: usize },

    #[error("Failed to render page {index}: {message}")]
    Render { index: usize, message: String },
}
