//! Page slots
//!
//! One slot per page, empty until its image arrives. A filled slot is never
//! overwritten; the whole sequence is replaced when a new document loads.

use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::raster::EncodedImage;

/// A rendered page
#[derive(Debug, Clone)]
pub struct PageImage {
    pub index: usize,
    /// Load generation that produced this image
    pub generation: u64,
    /// Page width the image was rendered for
    pub target_width: u32,
    pub image: EncodedImage,
}

#[derive(Debug, Default, Clone)]
pub struct PageSlots {
    slots: Vec<Option<Arc<PageImage>>>,
}

impl PageSlots {
    /// `count` empty slots
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![None; count],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_filled(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    pub fn get(&self, index: usize) -> Option<Arc<PageImage>> {
        self.slots.get(index).cloned().flatten()
    }

    /// Store `image` if the slot is still empty. Returns whether it was stored.
    pub fn fill(&mut self, index: usize, image: Arc<PageImage>) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_none() => {
                *slot = Some(image);
                true
            }
            _ => false,
        }
    }

    pub fn filled_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn all_filled(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Fill state per slot, in page order
    pub fn filled_mask(&self) -> Vec<bool> {
        self.slots.iter().map(Option::is_some).collect()
    }

    /// Lowest empty index in `range` accepted by `eligible`
    pub fn first_empty_in(
        &self,
        range: RangeInclusive<usize>,
        mut eligible: impl FnMut(usize) -> bool,
    ) -> Option<usize> {
        range
            .filter(|&index| index < self.slots.len())
            .find(|&index| self.slots[index].is_none() && eligible(index))
    }
}

/// Pages worth rendering around `position`: `before` pages back through
/// `after` pages ahead, clamped to the document.
pub fn neighbor_window(
    position: usize,
    page_count: usize,
    before: usize,
    after: usize,
) -> Option<RangeInclusive<usize>> {
    if page_count == 0 {
        return None;
    }
    let last = page_count - 1;
    let position = position.min(last);
    let start = position.saturating_sub(before);
    let end = position.saturating_add(after).min(last);
    Some(start..=end)
}
