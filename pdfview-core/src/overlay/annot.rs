use std::time::Duration;

use crate::backend::Annotation;
use crate::geometry::{Point, Quad, Rect};

/// Quiet period between releasing the button and capturing an annotation position.
pub const CAPTURE_DELAY: Duration = Duration::from_millis(300);

/// Box that fits `text` set at `font_size`, anchored at `origin`.
pub fn inline_text_rect(origin: Point, font_size: f32, text: &str) -> Rect {
    let lines: Vec<&str> = text.split('\n').collect();
    let longest = lines
        .iter()
        .map(|line| line.chars().count())
        .max()
        .unwrap_or(0);
    let width = font_size / 1.5 * longest as f32;
    let height = font_size * 1.3 * lines.len() as f32;
    Rect::from_point_size(origin, width, height)
}

/// Same size as `rect`, with its top-left corner at `to`.
pub fn moved_rect(rect: Rect, to: Point) -> Rect {
    Rect::from_point_size(to, rect.width(), rect.height())
}

/// Bounding rect of every quad, or `None` for an empty list.
pub fn quads_bounds(quads: &[Quad]) -> Option<Rect> {
    quads.iter().map(Quad::bounds).reduce(|a, b| a.union(&b))
}

/// An annotation picked out on a page by the pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotTarget {
    pub page_index: usize,
    pub annotation: Annotation,
}
