use std::collections::VecDeque;

use spreadpdf_core::RenderImage;

/// Recently rendered pages, newest first. Redraws that only touch the status
/// line reuse the spread's pages instead of rasterising them again.
pub struct RenderCache {
    entries: VecDeque<CacheEntry>,
    capacity: usize,
}

struct CacheEntry {
    page_index: usize,
    scale_milli: u32,
    image: RenderImage,
}

impl RenderCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&mut self, page_index: usize, scale: f32) -> Option<RenderImage> {
        let scale_milli = quantize_scale(scale);
        let position = self
            .entries
            .iter()
            .position(|entry| entry.page_index == page_index && entry.scale_milli == scale_milli)?;
        let entry = self.entries.remove(position)?;
        let image = entry.image.clone();
        self.entries.push_front(entry);
        Some(image)
    }

    pub fn insert(&mut self, page_index: usize, scale: f32, image: RenderImage) {
        let scale_milli = quantize_scale(scale);
        self.entries
            .retain(|entry| !(entry.page_index == page_index && entry.scale_milli == scale_milli));
        self.entries.push_front(CacheEntry {
            page_index,
            scale_milli,
            image,
        });
        self.entries.truncate(self.capacity);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn quantize_scale(scale: f32) -> u32 {
    let scaled = (scale * 1000.0).round();
    if !scaled.is_finite() || scaled <= 0.0 {
        1
    } else if scaled > u32::MAX as f32 {
        u32::MAX
    } else {
        scaled as u32
    }
}
