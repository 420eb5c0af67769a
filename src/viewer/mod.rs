//! Flipbook viewer
//!
//! [`ViewerShell`] picks the document source, [`ProgressiveRenderer`] turns
//! it into page images, [`BookNavigator`] pages through them and
//! [`ViewportObserver`] feeds container resizes back into the renderer.

mod book;
mod error;
mod renderer;
mod shell;
mod slots;
mod viewport;

pub use book::{BookControls, BookNavigator, BookView, PageMode};
pub use error::{LoadError, PageRenderError, ShellError};
pub use renderer::{Phase, ProgressiveRenderer, RenderEvent, RendererConfig, RendererSnapshot};
pub use shell::{CheckedSource, PendingSource, ShellSnapshot, ViewerShell};
pub use slots::{neighbor_window, PageImage, PageSlots};
pub use viewport::{base_scale, render_scale, BookSize, ViewportObserver};
