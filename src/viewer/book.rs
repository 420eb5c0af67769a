//! Page-flip book navigation
//!
//! The book shows the cover alone, then two pages per spread. Narrow
//! viewports switch to portrait mode, one page per flip. Every turn moves the
//! renderer's read position so pages around it get filled.

use serde::Serialize;

use super::renderer::ProgressiveRenderer;
use super::viewport::NARROW_PAGE_WIDTH;

/// Paging primitive of the book widget
pub trait BookControls {
    fn flip_prev(&mut self) -> usize;
    fn flip_next(&mut self) -> usize;
    /// Jump to a 0-based page index, clamped to the document
    fn turn_to_page(&mut self, index: usize) -> usize;
    fn current_page(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageMode {
    Portrait,
    Spread,
}

impl PageMode {
    pub fn for_page_width(width: u32) -> Self {
        if width < NARROW_PAGE_WIDTH {
            Self::Portrait
        } else {
            Self::Spread
        }
    }

    /// First page of the view containing `index`
    fn view_start(self, index: usize) -> usize {
        match self {
            Self::Portrait => index,
            // cover alone, then (1, 2), (3, 4), ...
            Self::Spread if index == 0 => 0,
            Self::Spread => index - (index + 1) % 2,
        }
    }

    fn next_start(self, start: usize) -> usize {
        match self {
            Self::Portrait => start + 1,
            Self::Spread if start == 0 => 1,
            Self::Spread => start + 2,
        }
    }

    fn prev_start(self, start: usize) -> usize {
        match self {
            Self::Portrait => start.saturating_sub(1),
            Self::Spread if start <= 1 => 0,
            Self::Spread => start - 2,
        }
    }
}

/// Book state driving the renderer's read position
#[derive(Clone)]
pub struct BookNavigator {
    renderer: ProgressiveRenderer,
    current: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookView {
    pub current_page: usize,
    pub page_count: Option<usize>,
    pub mode: PageMode,
    /// Pages visible at the current position
    pub visible: Vec<usize>,
}

impl BookNavigator {
    pub fn new(renderer: ProgressiveRenderer) -> Self {
        Self {
            renderer,
            current: 0,
        }
    }

    pub fn mode(&self) -> PageMode {
        PageMode::for_page_width(self.renderer.book_size().width)
    }

    /// Back to the cover, e.g. after a new document was selected
    pub fn reset(&mut self) {
        self.current = 0;
    }

    pub fn view(&self) -> BookView {
        let mode = self.mode();
        let page_count = self.renderer.page_count();
        let visible = match page_count {
            None | Some(0) => Vec::new(),
            Some(count) => {
                let start = mode.view_start(self.current.min(count - 1));
                let end = match mode {
                    PageMode::Spread if start > 0 => (start + 1).min(count - 1),
                    _ => start,
                };
                (start..=end).collect()
            }
        };

        BookView {
            current_page: self.current,
            page_count,
            mode,
            visible,
        }
    }

    fn go_to(&mut self, start: usize) -> usize {
        let Some(count) = self.renderer.page_count().filter(|&count| count > 0) else {
            return self.current;
        };
        let target = self.mode().view_start(start.min(count - 1));
        if target != self.current {
            tracing::debug!("Turning to page {}", target);
        }
        self.current = target;
        self.renderer.set_read_position(target);
        target
    }
}

impl BookControls for BookNavigator {
    fn flip_prev(&mut self) -> usize {
        let start = self.mode().view_start(self.current);
        let prev = self.mode().prev_start(start);
        self.go_to(prev)
    }

    fn flip_next(&mut self) -> usize {
        let start = self.mode().view_start(self.current);
        let next = self.mode().next_start(start);
        self.go_to(next)
    }

    fn turn_to_page(&mut self, index: usize) -> usize {
        self.go_to(index)
    }

    fn current_page(&self) -> usize {
        self.current
    }
}
