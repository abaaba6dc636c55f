use crate::backend::{Bitmap, Color};
use crate::geometry::{PageTransform, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelRect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl PixelRect {
    fn clipped(rect: Rect, bitmap: &Bitmap) -> Option<Self> {
        if !rect.is_valid() || !rect.x0.is_finite() || !rect.y0.is_finite() {
            return None;
        }
        let clamp = |value: f32, max: u32| value.max(0.0).min(max as f32) as u32;
        let px = PixelRect {
            x0: clamp(rect.x0.floor(), bitmap.width),
            y0: clamp(rect.y0.floor(), bitmap.height),
            x1: clamp(rect.x1.ceil(), bitmap.width),
            y1: clamp(rect.y1.ceil(), bitmap.height),
        };
        (px.x0 < px.x1 && px.y0 < px.y1).then_some(px)
    }
}

pub fn fill_rect(bitmap: &mut Bitmap, rect: Rect, color: Color, alpha: f32) {
    let Some(px) = PixelRect::clipped(rect, bitmap) else {
        return;
    };
    for y in px.y0..px.y1 {
        let row_start = y as usize * bitmap.stride;
        for x in px.x0..px.x1 {
            let idx = row_start + x as usize * 4;
            if let Some(pixel) = bitmap.pixels.get_mut(idx..idx + 4) {
                blend_pixel(pixel, color, alpha);
            }
        }
    }
}

/// Draws a bar of `thickness` pixels along the bottom edge of `rect`.
pub fn underline(bitmap: &mut Bitmap, rect: Rect, color: Color, thickness: f32) {
    let bar = Rect::new(rect.x0, rect.y1 - thickness, rect.x1, rect.y1);
    fill_rect(bitmap, bar, color, 1.0);
}

pub fn stroke_rect(bitmap: &mut Bitmap, rect: Rect, color: Color, thickness: f32) {
    let t = thickness;
    fill_rect(bitmap, Rect::new(rect.x0, rect.y0, rect.x1, rect.y0 + t), color, 1.0);
    fill_rect(bitmap, Rect::new(rect.x0, rect.y1 - t, rect.x1, rect.y1), color, 1.0);
    fill_rect(bitmap, Rect::new(rect.x0, rect.y0, rect.x0 + t, rect.y1), color, 1.0);
    fill_rect(bitmap, Rect::new(rect.x1 - t, rect.y0, rect.x1, rect.y1), color, 1.0);
}

pub fn invert(bitmap: &mut Bitmap) {
    for chunk in bitmap.pixels.chunks_exact_mut(4) {
        chunk[0] = 255 - chunk[0];
        chunk[1] = 255 - chunk[1];
        chunk[2] = 255 - chunk[2];
    }
}

pub fn invert_region(bitmap: &mut Bitmap, rect: Rect) {
    let Some(px) = PixelRect::clipped(rect, bitmap) else {
        return;
    };
    for y in px.y0..px.y1 {
        let row_start = y as usize * bitmap.stride;
        let start = row_start + px.x0 as usize * 4;
        let end = row_start + px.x1 as usize * 4;
        if let Some(row) = bitmap.pixels.get_mut(start..end) {
            for chunk in row.chunks_exact_mut(4) {
                chunk[0] = 255 - chunk[0];
                chunk[1] = 255 - chunk[1];
                chunk[2] = 255 - chunk[2];
            }
        }
    }
}

fn blend_pixel(pixel: &mut [u8], color: Color, alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    let inv = 1.0 - alpha;
    let mix = |base: u8, over: u8| {
        ((base as f32 * inv) + (over as f32 * alpha))
            .round()
            .clamp(0.0, 255.0) as u8
    };
    pixel[0] = mix(pixel[0], color.r);
    pixel[1] = mix(pixel[1], color.g);
    pixel[2] = mix(pixel[2], color.b);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mark {
    Fill { color: Color, alpha: f32 },
    Underline { color: Color },
    Outline { color: Color },
}

/// Overlay marks for one page, in page space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageDecorations {
    marks: Vec<(Rect, Mark)>,
}

impl PageDecorations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn push(&mut self, rect: Rect, mark: Mark) {
        self.marks.push((rect, mark));
    }

    pub fn apply(&self, bitmap: &mut Bitmap, transform: &PageTransform, device_scale: f32) {
        let thickness = (1.5 * device_scale).max(1.0);
        for (rect, mark) in &self.marks {
            let on_bitmap = transform.rect_to_display(*rect).scaled(device_scale);
            match *mark {
                Mark::Fill { color, alpha } => fill_rect(bitmap, on_bitmap, color, alpha),
                Mark::Underline { color } => underline(bitmap, on_bitmap, color, thickness),
                Mark::Outline { color } => stroke_rect(bitmap, on_bitmap, color, thickness),
            }
        }
    }
}
