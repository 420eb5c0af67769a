//! Viewport sizing
//!
//! The book is two pages wide. Container width is clamped to
//! [`MIN_CONTAINER_WIDTH`, `MAX_CONTAINER_WIDTH`], each page takes half of it,
//! and page height follows the A-series portrait ratio.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use super::renderer::ProgressiveRenderer;

pub const MIN_CONTAINER_WIDTH: f32 = 280.0;
pub const MAX_CONTAINER_WIDTH: f32 = 900.0;

/// Page height / page width
pub const PAGE_ASPECT_RATIO: f32 = 1.414;

/// Oversampling applied to the target width
pub const BASE_SCALE: f32 = 2.0;
/// Oversampling below [`NARROW_PAGE_WIDTH`], trades sharpness for latency
pub const NARROW_BASE_SCALE: f32 = 1.5;
pub const NARROW_PAGE_WIDTH: u32 = 240;

/// Size of one book page in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BookSize {
    pub width: u32,
    pub height: u32,
}

impl BookSize {
    pub fn from_container_width(container_width: f32) -> Self {
        let container = if container_width.is_finite() {
            container_width.clamp(MIN_CONTAINER_WIDTH, MAX_CONTAINER_WIDTH)
        } else {
            MIN_CONTAINER_WIDTH
        };
        let width = (container / 2.0).floor() as u32;
        let height = (width as f32 * PAGE_ASPECT_RATIO).floor() as u32;
        Self { width, height }
    }
}

/// Oversampling factor for a given target page width
pub fn base_scale(target_width: u32) -> f32 {
    if target_width < NARROW_PAGE_WIDTH {
        NARROW_BASE_SCALE
    } else {
        BASE_SCALE
    }
}

/// `baseScale * (targetWidth / nativePageWidth)`
pub fn render_scale(target_width: u32, native_width: f32) -> Option<f32> {
    if !(native_width.is_finite() && native_width > 0.0) {
        return None;
    }
    Some(base_scale(target_width) * (target_width as f32 / native_width))
}

/// Debounces container width observations into renderer resizes
#[derive(Clone)]
pub struct ViewportObserver {
    tx: watch::Sender<Option<f32>>,
}

impl ViewportObserver {
    /// Start the debounce task. It lives until every observer clone is dropped.
    pub fn spawn(renderer: ProgressiveRenderer, debounce: Duration) -> Self {
        let (tx, mut rx) = watch::channel(None::<f32>);

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                // Settle: wait until no new width arrives for `debounce`
                loop {
                    match tokio::time::timeout(debounce, rx.changed()).await {
                        Ok(Ok(())) => continue,
                        Ok(Err(_)) => return,
                        Err(_) => break,
                    }
                }

                let width = *rx.borrow_and_update();
                if let Some(width) = width {
                    tracing::debug!("Viewport settled at container width {}", width);
                    renderer.resize(width);
                }
            }
        });

        Self { tx }
    }

    /// Record a container width measurement
    pub fn observe(&self, container_width: f32) {
        self.tx.send_replace(Some(container_width));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PdfSource;
    use crate::testing::fake_renderer;

    #[test]
    fn test_book_size_clamps_container() {
        assert_eq!(
            BookSize::from_container_width(100.0),
            BookSize { width: 140, height: 197 }
        );
        assert_eq!(
            BookSize::from_container_width(720.0),
            BookSize { width: 360, height: 509 }
        );
        assert_eq!(
            BookSize::from_container_width(4000.0),
            BookSize { width: 450, height: 636 }
        );
        assert_eq!(
            BookSize::from_container_width(f32::NAN),
            BookSize::from_container_width(MIN_CONTAINER_WIDTH)
        );
    }

    #[test]
    fn test_narrow_viewports_use_lower_base_scale() {
        assert_eq!(base_scale(140), NARROW_BASE_SCALE);
        assert_eq!(base_scale(360), BASE_SCALE);
    }

    #[test]
    fn test_render_scale() {
        let scale = render_scale(306, 612.0).unwrap();
        assert!((scale - 1.0).abs() < f32::EPSILON);

        assert!(render_scale(360, 0.0).is_none());
        assert!(render_scale(360, f32::NAN).is_none());
    }

    #[tokio::test]
    async fn test_observer_debounces_into_one_reload() {
        let (renderer, _) = fake_renderer(&[("/pdfs/a.pdf", "tag=a;pages=2")], 720.0);
        renderer
            .open(PdfSource::SitePath("/pdfs/a.pdf".into()))
            .await
            .unwrap();
        assert_eq!(renderer.generation(), 1);

        let observer = ViewportObserver::spawn(renderer.clone(), Duration::from_millis(30));
        observer.observe(400.0);
        observer.observe(450.0);
        observer.observe(500.0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(renderer.book_size().width, 250);
        assert_eq!(renderer.generation(), 2);
    }
}
