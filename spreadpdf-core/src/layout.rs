use tracing::warn;

use crate::{Document, RenderImage, RenderRequest};

/// One position of a spread, left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpreadSlot {
    pub virtual_index: usize,
    pub actual_page: Option<usize>,
}

/// Where and how large the pages of the current spread are drawn inside a
/// `width` x `height` context. Translations are in device units.
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadLayout {
    pub scale: f32,
    pub translate_x: f32,
    pub translate_y: f32,
    pub page_width: f32,
    pub page_height: f32,
    pub slots: Vec<SpreadSlot>,
}

impl SpreadLayout {
    /// Fits `split_count` pages of `page_size` into the context, keeping the
    /// whole spread visible and centred on the free axis.
    pub fn fit(
        page_size: (f32, f32),
        split_count: usize,
        width: f32,
        height: f32,
    ) -> Option<Self> {
        let (page_width, page_height) = page_size;
        if page_width <= 0.0 || page_height <= 0.0 || width <= 0.0 || height <= 0.0 {
            return None;
        }
        let splits = split_count.max(1) as f32;

        let (scale, translate_x, translate_y) =
            if width / height >= page_width * splits / page_height {
                let scale = height / page_height;
                (scale, (width - scale * splits * page_width) / 2.0, 0.0)
            } else {
                let scale = width / (page_width * splits);
                (scale, 0.0, (height - scale * page_height) / 2.0)
            };

        Some(Self {
            scale,
            translate_x,
            translate_y,
            page_width,
            page_height,
            slots: Vec::new(),
        })
    }

    /// Device-space origin of slot `position`.
    pub fn slot_origin(&self, position: usize) -> (f32, f32) {
        (
            self.translate_x + position as f32 * self.page_width * self.scale,
            self.translate_y,
        )
    }

    pub fn render_order(&self) -> Vec<usize> {
        self.slots.iter().map(|slot| slot.virtual_index).collect()
    }
}

/// Paints the document's current spread onto a white RGBA canvas. Pages that
/// fail to render are logged and left blank.
pub fn compose_spread(document: &Document, width: u32, height: u32) -> Option<RenderImage> {
    let layout = document.spread_layout(width as f32, height as f32)?;
    let mut canvas = RenderImage::blank(width, height);

    for (position, slot) in layout.slots.iter().enumerate() {
        let Some(page_index) = slot.actual_page else {
            continue;
        };
        let request = RenderRequest {
            page_index,
            scale: layout.scale,
        };
        match document.backend().render_page(request) {
            Ok(image) => {
                let (x, y) = layout.slot_origin(position);
                blit(&mut canvas, &image, x.round() as i64, y.round() as i64);
            }
            Err(err) => {
                warn!(
                    ?err,
                    page = page_index,
                    virtual_page = slot.virtual_index,
                    "skipping page that failed to render"
                );
            }
        }
    }

    Some(canvas)
}

fn blit(canvas: &mut RenderImage, image: &RenderImage, origin_x: i64, origin_y: i64) {
    let canvas_width = canvas.width as i64;
    let canvas_height = canvas.height as i64;
    let x0 = origin_x.max(0);
    let x1 = (origin_x + image.width as i64).min(canvas_width);
    if x0 >= x1 {
        return;
    }

    for row in 0..image.height as i64 {
        let y = origin_y + row;
        if y < 0 || y >= canvas_height {
            continue;
        }
        let src_start = ((row * image.width as i64 + (x0 - origin_x)) * 4) as usize;
        let src_end = src_start + ((x1 - x0) * 4) as usize;
        let dst_start = ((y * canvas_width + x0) * 4) as usize;
        let dst_end = dst_start + ((x1 - x0) * 4) as usize;
        if src_end > image.pixels.len() || dst_end > canvas.pixels.len() {
            return;
        }
        canvas.pixels[dst_start..dst_end].copy_from_slice(&image.pixels[src_start..src_end]);
    }
}
