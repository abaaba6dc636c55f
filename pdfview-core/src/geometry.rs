use std::ops::Range;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in top-left origin coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn from_point_size(origin: Point, width: f32, height: f32) -> Self {
        Self::new(origin.x, origin.y, origin.x + width, origin.y + height)
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.x0, self.y0)
    }

    pub fn bottom_right(&self) -> Point {
        Point::new(self.x1, self.y1)
    }

    /// A rect is valid when its corners are ordered.
    pub fn is_valid(&self) -> bool {
        self.x0 <= self.x1 && self.y0 <= self.y1
    }

    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x0 && point.x <= self.x1 && point.y >= self.y0 && point.y <= self.y1
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            self.x0.min(other.x0),
            self.y0.min(other.y0),
            self.x1.max(other.x1),
            self.y1.max(other.y1),
        )
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let rect = Rect::new(
            self.x0.max(other.x0),
            self.y0.max(other.y0),
            self.x1.min(other.x1),
            self.y1.min(other.y1),
        );
        (!rect.is_empty()).then_some(rect)
    }

    pub fn scaled(&self, factor: f32) -> Rect {
        Rect::new(
            self.x0 * factor,
            self.y0 * factor,
            self.x1 * factor,
            self.y1 * factor,
        )
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(self.x0 + dx, self.y0 + dy, self.x1 + dx, self.y1 + dy)
    }

    /// Swaps inverted corners so that the rect becomes valid.
    pub fn normalized(&self) -> Rect {
        Rect::new(
            self.x0.min(self.x1),
            self.y0.min(self.y1),
            self.x0.max(self.x1),
            self.y0.max(self.y1),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Quad {
    pub ul: Point,
    pub ur: Point,
    pub ll: Point,
    pub lr: Point,
}

impl Quad {
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            ul: Point::new(rect.x0, rect.y0),
            ur: Point::new(rect.x1, rect.y0),
            ll: Point::new(rect.x0, rect.y1),
            lr: Point::new(rect.x1, rect.y1),
        }
    }

    pub fn bounds(&self) -> Rect {
        let xs = [self.ul.x, self.ur.x, self.ll.x, self.lr.x];
        let ys = [self.ul.y, self.ur.y, self.ll.y, self.lr.y];
        Rect::new(
            xs.iter().copied().fold(f32::INFINITY, f32::min),
            ys.iter().copied().fold(f32::INFINITY, f32::min),
            xs.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            ys.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    pub fn clockwise(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg90,
            Rotation::Deg90 => Rotation::Deg180,
            Rotation::Deg180 => Rotation::Deg270,
            Rotation::Deg270 => Rotation::Deg0,
        }
    }

    pub fn counterclockwise(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg270,
            Rotation::Deg90 => Rotation::Deg0,
            Rotation::Deg180 => Rotation::Deg90,
            Rotation::Deg270 => Rotation::Deg180,
        }
    }

    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn rotated(self, rotation: Rotation) -> Self {
        if rotation.swaps_axes() {
            Self::new(self.height, self.width)
        } else {
            self
        }
    }
}

pub fn page_index_for_offset(
    offset: f32,
    scale: f32,
    page_height: f32,
    page_count: usize,
) -> usize {
    if page_count == 0 || scale <= 0.0 || page_height <= 0.0 {
        return 0;
    }
    let index = (offset / scale / page_height).floor();
    clamp_index(index, page_count - 1)
}

pub fn last_visible_page_index(
    offset: f32,
    viewport_height: f32,
    scale: f32,
    page_height: f32,
    page_count: usize,
) -> usize {
    if page_count == 0 || scale <= 0.0 || page_height <= 0.0 {
        return 0;
    }
    let index = ((offset + viewport_height) / scale / page_height).floor() + 1.0;
    clamp_index(index, page_count)
}

pub fn max_scroll_offset(
    scale: f32,
    page_height: f32,
    page_count: usize,
    viewport_height: f32,
) -> f32 {
    (scale * page_height * page_count as f32 - viewport_height).max(0.0)
}

pub fn page_top_offset(index: usize, scale: f32, page_height: f32) -> f32 {
    index as f32 * scale * page_height
}

/// Left edge of a page of `render_width` centered in the viewport. Wide pages in custom zoom
/// pan with `horizontal_offset` and never leave a gap at either side.
pub fn render_x(
    viewport_width: f32,
    render_width: f32,
    horizontal_offset: f32,
    custom_zoom: bool,
) -> f32 {
    let centered = (viewport_width - render_width) / 2.0;
    if custom_zoom && render_width >= viewport_width {
        (centered + horizontal_offset).clamp(viewport_width - render_width, 0.0)
    } else {
        centered
    }
}

fn clamp_index(value: f32, max: usize) -> usize {
    if !value.is_finite() || value <= 0.0 {
        0
    } else if value >= max as f32 {
        max
    } else {
        value as usize
    }
}

/// Maps a point in rotated display space (unscaled) back into page space.
/// `display` is the page size as displayed, i.e. already rotated.
pub fn display_point_to_page(point: Point, rotation: Rotation, display: PageSize) -> Point {
    match rotation {
        Rotation::Deg0 => point,
        Rotation::Deg90 => Point::new(point.y, display.width - point.x),
        Rotation::Deg180 => Point::new(display.width - point.x, display.height - point.y),
        Rotation::Deg270 => Point::new(display.height - point.y, point.x),
    }
}

/// Maps a page-space point onto the rotated display. `page` is the unrotated page size.
pub fn page_point_to_display(point: Point, rotation: Rotation, page: PageSize) -> Point {
    match rotation {
        Rotation::Deg0 => point,
        Rotation::Deg90 => Point::new(page.height - point.y, point.x),
        Rotation::Deg180 => Point::new(page.width - point.x, page.height - point.y),
        Rotation::Deg270 => Point::new(point.y, page.width - point.x),
    }
}

pub fn page_rect_to_display(rect: Rect, rotation: Rotation, page: PageSize) -> Rect {
    let a = page_point_to_display(rect.top_left(), rotation, page);
    let b = page_point_to_display(rect.bottom_right(), rotation, page);
    Rect::new(a.x, a.y, b.x, b.y).normalized()
}

/// Maps between page space and the scaled, rotated pixels of one rendered page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageTransform {
    /// Top-left of the visible region in page space (the crop origin when trimming).
    pub origin: Point,
    /// Unrotated size of the visible region.
    pub size: PageSize,
    pub rotation: Rotation,
    pub scale: f32,
}

impl PageTransform {
    pub fn display_size(&self) -> PageSize {
        self.size.rotated(self.rotation)
    }

    pub fn rect_to_display(&self, rect: Rect) -> Rect {
        let local = rect.translated(-self.origin.x, -self.origin.y);
        page_rect_to_display(local, self.rotation, self.size).scaled(self.scale)
    }

    /// `point` is relative to the page's top-left corner on screen, in scaled pixels.
    pub fn point_to_page(&self, point: Point) -> Point {
        let unscaled = Point::new(point.x / self.scale, point.y / self.scale);
        let local = display_point_to_page(unscaled, self.rotation, self.display_size());
        Point::new(local.x + self.origin.x, local.y + self.origin.y)
    }
}

/// Vertical placement of every page of a document, in unscaled document units.
#[derive(Debug, Clone, PartialEq)]
pub enum PageLayout {
    Uniform { page_height: f32, page_count: usize },
    /// `tops[i]` is the top of page `i`; the last element is the total height.
    Mixed { tops: Vec<f32> },
}

impl PageLayout {
    pub fn uniform(page_height: f32, page_count: usize) -> Self {
        PageLayout::Uniform {
            page_height,
            page_count,
        }
    }

    pub fn from_heights<I: IntoIterator<Item = f32>>(heights: I) -> Self {
        let heights: Vec<f32> = heights.into_iter().collect();
        match heights.first() {
            None => PageLayout::uniform(0.0, 0),
            Some(first) if heights.iter().all(|h| (h - first).abs() < f32::EPSILON) => {
                PageLayout::uniform(*first, heights.len())
            }
            Some(_) => {
                let mut tops = Vec::with_capacity(heights.len() + 1);
                let mut acc = 0.0;
                tops.push(acc);
                for height in heights {
                    acc += height;
                    tops.push(acc);
                }
                PageLayout::Mixed { tops }
            }
        }
    }

    pub fn page_count(&self) -> usize {
        match self {
            PageLayout::Uniform { page_count, .. } => *page_count,
            PageLayout::Mixed { tops } => tops.len().saturating_sub(1),
        }
    }

    pub fn page_top(&self, index: usize) -> f32 {
        match self {
            PageLayout::Uniform { page_height, .. } => index as f32 * page_height,
            PageLayout::Mixed { tops } => tops
                .get(index)
                .or_else(|| tops.last())
                .copied()
                .unwrap_or(0.0),
        }
    }

    pub fn page_height(&self, index: usize) -> f32 {
        match self {
            PageLayout::Uniform { page_height, .. } => *page_height,
            PageLayout::Mixed { tops } => match (tops.get(index), tops.get(index + 1)) {
                (Some(top), Some(bottom)) => bottom - top,
                _ => 0.0,
            },
        }
    }

    pub fn total_height(&self) -> f32 {
        self.page_top(self.page_count())
    }

    /// Screen-space top of page `index` including the padding of every page before it.
    pub fn page_top_px(&self, index: usize, scale: f32, padding: f32) -> f32 {
        self.page_top(index) * scale + index as f32 * padding
    }

    pub fn total_height_px(&self, scale: f32, padding: f32) -> f32 {
        let count = self.page_count();
        self.total_height() * scale + count.saturating_sub(1) as f32 * padding
    }

    pub fn max_scroll_offset(&self, scale: f32, padding: f32, viewport_height: f32) -> f32 {
        match self {
            PageLayout::Uniform {
                page_height,
                page_count,
            } if padding == 0.0 => {
                max_scroll_offset(scale, *page_height, *page_count, viewport_height)
            }
            _ => (self.total_height_px(scale, padding) - viewport_height).max(0.0),
        }
    }

    pub fn page_index_for_offset(&self, offset: f32, scale: f32, padding: f32) -> usize {
        let count = self.page_count();
        if count == 0 || scale <= 0.0 {
            return 0;
        }
        match self {
            PageLayout::Uniform { page_height, .. } => {
                let pitch = page_height + padding / scale;
                page_index_for_offset(offset, scale, pitch, count)
            }
            PageLayout::Mixed { .. } => {
                // first page whose top lies below the offset
                let (mut lo, mut hi) = (0usize, count);
                while lo < hi {
                    let mid = lo + (hi - lo) / 2;
                    if self.page_top_px(mid, scale, padding) <= offset {
                        lo = mid + 1;
                    } else {
                        hi = mid;
                    }
                }
                lo.saturating_sub(1).min(count - 1)
            }
        }
    }

    pub fn last_visible_page_index(
        &self,
        offset: f32,
        viewport_height: f32,
        scale: f32,
        padding: f32,
    ) -> usize {
        let count = self.page_count();
        if count == 0 || scale <= 0.0 {
            return 0;
        }
        match self {
            PageLayout::Uniform { page_height, .. } => {
                let pitch = page_height + padding / scale;
                last_visible_page_index(offset, viewport_height, scale, pitch, count)
            }
            PageLayout::Mixed { .. } => {
                (self.page_index_for_offset(offset + viewport_height, scale, padding) + 1)
                    .min(count)
            }
        }
    }

    /// Pages to rasterize for a viewport: the visible pages plus one page of lookahead.
    pub fn render_range(
        &self,
        offset: f32,
        viewport_height: f32,
        scale: f32,
        padding: f32,
    ) -> Range<usize> {
        let count = self.page_count();
        if count == 0 {
            return 0..0;
        }
        let start = self.page_index_for_offset(offset, scale, padding);
        let last = (self.last_visible_page_index(offset, viewport_height, scale, padding) + 1)
            .min(count)
            .max(start + 1);
        start..last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_offset_maps_to_last_page() {
        for &scale in &[0.25f32, 0.5, 1.0, 1.37, 2.0, 3.5] {
            for &page_height in &[100.0f32, 792.0, 800.0, 1123.5] {
                for &page_count in &[1usize, 2, 10, 57] {
                    for &viewport in &[0.0f32, 300.0, 600.0, 5000.0] {
                        if viewport >= scale * page_height {
                            continue;
                        }
                        let max = max_scroll_offset(scale, page_height, page_count, viewport);
                        let index = page_index_for_offset(max, scale, page_height, page_count);
                        assert_eq!(
                            index,
                            page_count - 1,
                            "{scale} {page_height} {page_count} {viewport}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn visible_range_for_ten_pages() {
        let layout = PageLayout::uniform(800.0, 10);
        assert_eq!(layout.render_range(0.0, 600.0, 1.0, 0.0), 0..2);
        assert_eq!(layout.render_range(7500.0, 600.0, 1.0, 0.0), 9..10);
        assert_eq!(last_visible_page_index(0.0, 600.0, 1.0, 800.0, 10), 1);
        assert_eq!(last_visible_page_index(7500.0, 600.0, 1.0, 800.0, 10), 10);
    }

    #[test]
    fn empty_document_has_empty_range() {
        let layout = PageLayout::from_heights(Vec::new());
        assert_eq!(layout.page_count(), 0);
        assert_eq!(layout.render_range(100.0, 600.0, 1.0, 10.0), 0..0);
        assert_eq!(layout.max_scroll_offset(1.0, 10.0, 600.0), 0.0);
        assert_eq!(max_scroll_offset(1.0, 800.0, 0, 600.0), 0.0);
    }

    #[test]
    fn mixed_layout_binary_search_matches_uniform() {
        let uniform = PageLayout::uniform(500.0, 6);
        let mixed = PageLayout::Mixed {
            tops: (0..=6).map(|i| i as f32 * 500.0).collect(),
        };
        for offset in [0.0f32, 10.0, 499.0, 500.0, 1234.0, 2999.0, 4000.0] {
            assert_eq!(
                uniform.page_index_for_offset(offset, 1.5, 10.0),
                mixed.page_index_for_offset(offset, 1.5, 10.0),
                "offset {offset}"
            );
        }
    }

    #[test]
    fn mixed_layout_uses_cumulative_heights() {
        let layout = PageLayout::from_heights([100.0, 300.0, 50.0]);
        assert_eq!(layout.page_count(), 3);
        assert_eq!(layout.page_top(2), 400.0);
        assert_eq!(layout.page_height(1), 300.0);
        assert_eq!(layout.total_height(), 450.0);
        assert_eq!(layout.page_index_for_offset(99.0, 1.0, 0.0), 0);
        assert_eq!(layout.page_index_for_offset(100.0, 1.0, 0.0), 1);
        assert_eq!(layout.page_index_for_offset(420.0, 1.0, 0.0), 2);
        assert_eq!(layout.page_index_for_offset(10_000.0, 1.0, 0.0), 2);
    }

    #[test]
    fn equal_heights_collapse_to_uniform() {
        let layout = PageLayout::from_heights([792.0, 792.0, 792.0]);
        assert_eq!(layout, PageLayout::uniform(792.0, 3));
    }

    #[test]
    fn render_x_centres_and_clamps() {
        assert_eq!(render_x(1000.0, 600.0, 0.0, false), 200.0);
        assert_eq!(render_x(1000.0, 600.0, 150.0, true), 200.0);
        assert_eq!(render_x(1000.0, 1400.0, 0.0, true), -200.0);
        assert_eq!(render_x(1000.0, 1400.0, 500.0, true), 0.0);
        assert_eq!(render_x(1000.0, 1400.0, -500.0, true), -400.0);
    }

    #[test]
    fn rotation_round_trips_points() {
        let page = PageSize::new(600.0, 800.0);
        let point = Point::new(120.0, 45.0);
        for rotation in [
            Rotation::Deg0,
            Rotation::Deg90,
            Rotation::Deg180,
            Rotation::Deg270,
        ] {
            let display = page_point_to_display(point, rotation, page);
            let back = display_point_to_page(display, rotation, page.rotated(rotation));
            assert!((back.x - point.x).abs() < 1e-3, "{rotation:?}");
            assert!((back.y - point.y).abs() < 1e-3, "{rotation:?}");
        }
    }

    #[test]
    fn rotation_maps_cursor_quarter_turns() {
        let display = PageSize::new(800.0, 600.0);
        let p = display_point_to_page(Point::new(10.0, 20.0), Rotation::Deg90, display);
        assert_eq!(p, Point::new(20.0, 790.0));
        let p = display_point_to_page(Point::new(10.0, 20.0), Rotation::Deg270, display);
        assert_eq!(p, Point::new(580.0, 10.0));
        let p = display_point_to_page(Point::new(10.0, 20.0), Rotation::Deg180, display);
        assert_eq!(p, Point::new(790.0, 580.0));
    }

    #[test]
    fn page_transform_inverts_its_own_mapping() {
        let transform = PageTransform {
            origin: Point::new(40.0, 30.0),
            size: PageSize::new(500.0, 700.0),
            rotation: Rotation::Deg90,
            scale: 2.0,
        };
        let rect = Rect::new(100.0, 200.0, 110.0, 220.0);
        let on_screen = transform.rect_to_display(rect);
        assert_eq!(on_screen.width(), 40.0);
        assert_eq!(on_screen.height(), 20.0);
        let back = transform.point_to_page(on_screen.top_left());
        assert!(rect.contains(back), "{back:?}");
    }

    #[test]
    fn rotation_steps_cycle() {
        let mut rotation = Rotation::Deg0;
        for _ in 0..4 {
            rotation = rotation.clockwise();
        }
        assert_eq!(rotation, Rotation::Deg0);
        assert_eq!(Rotation::Deg0.counterclockwise(), Rotation::Deg270);
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn rect_intersection_excludes_touching_edges() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Rect::new(5.0, 5.0, 20.0, 20.0)));
        assert!(!a.intersects(&Rect::new(10.0, 0.0, 20.0, 10.0)));
        assert_eq!(a.intersection(&Rect::new(10.0, 0.0, 20.0, 10.0)), None);
    }
}
