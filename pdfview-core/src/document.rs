use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::backend::{Annotation, CharGlyph, DocumentBackend, DocumentInfo, Link};
use crate::error::ViewerError;
use crate::geometry::{PageLayout, PageSize, PageTransform, Point, Rect, Rotation};

/// A page as the viewer sees it: media size, the applied crop and lazily extracted content.
#[derive(Debug)]
pub struct PageView {
    pub index: usize,
    pub media: PageSize,
    pub clip: Option<Rect>,
    chars: OnceCell<Vec<CharGlyph>>,
    links: OnceCell<Vec<Link>>,
    annotations: OnceCell<Vec<Annotation>>,
}

impl PageView {
    fn new(index: usize, media: PageSize, clip: Option<Rect>) -> Self {
        Self {
            index,
            media,
            clip,
            chars: OnceCell::new(),
            links: OnceCell::new(),
            annotations: OnceCell::new(),
        }
    }

    pub fn visible_rect(&self) -> Rect {
        self.clip
            .unwrap_or_else(|| Rect::new(0.0, 0.0, self.media.width, self.media.height))
    }

    pub fn transform(&self, rotation: Rotation, scale: f32) -> PageTransform {
        let visible = self.visible_rect();
        PageTransform {
            origin: visible.top_left(),
            size: PageSize::new(visible.width(), visible.height()),
            rotation,
            scale,
        }
    }
}

/// Memoized page objects over a backend, with optional white-margin trimming.
pub struct DocumentView {
    backend: Arc<dyn DocumentBackend>,
    pages: HashMap<usize, PageView>,
    content_bounds: HashMap<usize, Option<Rect>>,
    trim_margin: bool,
    document_clip: Option<Rect>,
    clip_changed: bool,
}

impl DocumentView {
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self {
            backend,
            pages: HashMap::new(),
            content_bounds: HashMap::new(),
            trim_margin: false,
            document_clip: None,
            clip_changed: false,
        }
    }

    pub fn backend(&self) -> &Arc<dyn DocumentBackend> {
        &self.backend
    }

    pub fn info(&self) -> &DocumentInfo {
        self.backend.info()
    }

    pub fn page_count(&self) -> usize {
        self.backend.info().page_count
    }

    pub fn is_pdf(&self) -> bool {
        self.backend.info().is_pdf
    }

    pub fn trim_margin(&self) -> bool {
        self.trim_margin
    }

    /// Switching trim on starts a fresh clip union.
    pub fn set_trim_margin(&mut self, enabled: bool) {
        if self.trim_margin == enabled {
            return;
        }
        self.trim_margin = enabled;
        self.document_clip = None;
        self.content_bounds.clear();
        self.clip_changed = false;
        for page in self.pages.values_mut() {
            page.clip = None;
        }
    }

    pub fn document_clip(&self) -> Option<Rect> {
        if self.trim_margin {
            self.document_clip
        } else {
            None
        }
    }

    /// True once after the trim clip grew since the last call.
    pub fn take_clip_changed(&mut self) -> bool {
        std::mem::take(&mut self.clip_changed)
    }

    pub fn cached_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&mut self, index: usize) -> Result<&PageView> {
        let count = self.page_count();
        if index >= count {
            return Err(ViewerError::PageOutOfRange { index, count }.into());
        }
        if self.trim_margin {
            self.extend_clip(index);
        }
        let clip = self.document_clip();
        if !self.pages.contains_key(&index) {
            let media = self.backend.page_size(index)?;
            self.pages.insert(index, PageView::new(index, media, clip));
        }
        let page = self
            .pages
            .get_mut(&index)
            .ok_or_else(|| anyhow!("page {} missing from cache", index))?;
        page.clip = clip;
        Ok(&*page)
    }

    fn extend_clip(&mut self, index: usize) {
        let bounds = match self.content_bounds.get(&index) {
            Some(bounds) => *bounds,
            None => {
                let bounds = self.backend.content_bounds(index).unwrap_or_else(|err| {
                    warn!("failed to measure content of page {}: {err:#}", index);
                    None
                });
                self.content_bounds.insert(index, bounds);
                bounds
            }
        };
        let Some(bounds) = bounds.filter(|b| !b.is_empty()) else {
            return;
        };
        let merged = match self.document_clip {
            Some(clip) => clip.union(&bounds),
            None => bounds,
        };
        if self.document_clip != Some(merged) {
            debug!(page = index, ?merged, "trim clip grew");
            self.document_clip = Some(merged);
            self.clip_changed = true;
        }
    }

    pub fn chars(&mut self, index: usize) -> &[CharGlyph] {
        let backend = Arc::clone(&self.backend);
        match self.page(index) {
            Ok(page) => page
                .chars
                .get_or_init(|| {
                    backend.page_chars(index).unwrap_or_else(|err| {
                        warn!("failed to extract text of page {}: {err:#}", index);
                        Vec::new()
                    })
                })
                .as_slice(),
            Err(_) => &[],
        }
    }

    pub fn links(&mut self, index: usize) -> &[Link] {
        let backend = Arc::clone(&self.backend);
        match self.page(index) {
            Ok(page) => page
                .links
                .get_or_init(|| {
                    backend.page_links(index).unwrap_or_else(|err| {
                        warn!("failed to read links of page {}: {err:#}", index);
                        Vec::new()
                    })
                })
                .as_slice(),
            Err(_) => &[],
        }
    }

    pub fn annotations(&mut self, index: usize) -> &[Annotation] {
        let backend = Arc::clone(&self.backend);
        match self.page(index) {
            Ok(page) => page
                .annotations
                .get_or_init(|| {
                    backend.page_annotations(index).unwrap_or_else(|err| {
                        warn!("failed to read annotations of page {}: {err:#}", index);
                        Vec::new()
                    })
                })
                .as_slice(),
            Err(_) => &[],
        }
    }

    pub fn annotation_at(&mut self, index: usize, point: Point) -> Option<Annotation> {
        self.annotations(index)
            .iter()
            .find(|annot| annot.rect.contains(point))
            .cloned()
    }

    pub fn link_at(&mut self, index: usize, point: Point) -> Option<Link> {
        self.links(index)
            .iter()
            .find(|link| link.rect.contains(point))
            .cloned()
    }

    pub fn invalidate_annotations(&mut self) {
        for page in self.pages.values_mut() {
            page.annotations.take();
        }
    }

    pub fn release(&mut self, index: usize) {
        self.pages.remove(&index);
    }

    /// Swaps in `backend` once a layout can be built from it; on error nothing changes.
    #[instrument(skip(self, backend), fields(path = ?backend.info().path))]
    pub fn replace(
        &mut self,
        backend: Arc<dyn DocumentBackend>,
        rotation: Rotation,
    ) -> Result<()> {
        let mut candidate = DocumentView::new(backend);
        candidate.trim_margin = self.trim_margin;
        let rotation = if candidate.is_pdf() {
            rotation
        } else {
            Rotation::Deg0
        };
        candidate.layout(rotation)?;
        *self = candidate;
        Ok(())
    }

    /// Size used for fit computations: the trim clip, or the first page.
    pub fn reference_size(&self, rotation: Rotation) -> Result<PageSize> {
        if let Some(clip) = self.document_clip() {
            return Ok(PageSize::new(clip.width(), clip.height()).rotated(rotation));
        }
        if self.page_count() == 0 {
            return Err(ViewerError::EmptyDocument.into());
        }
        Ok(self.backend.page_size(0)?.rotated(rotation))
    }

    pub fn display_size(&mut self, index: usize, rotation: Rotation) -> Result<PageSize> {
        let page = self.page(index)?;
        let visible = page.visible_rect();
        Ok(PageSize::new(visible.width(), visible.height()).rotated(rotation))
    }

    pub fn layout(&self, rotation: Rotation) -> Result<PageLayout> {
        let count = self.page_count();
        let reference = self.reference_size(rotation)?;
        if self.document_clip().is_some() {
            return Ok(PageLayout::uniform(reference.height, count));
        }
        let heights = (0..count).map(|index| match self.backend.page_size(index) {
            Ok(size) => size.rotated(rotation).height,
            Err(err) => {
                warn!("failed to read size of page {}: {err:#}", index);
                reference.height
            }
        });
        Ok(PageLayout::from_heights(heights))
    }
}
