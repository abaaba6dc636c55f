use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;

use crate::backend::{
    document_id_for_path, Annotation, AnnotationEdit, AnnotationId, Bitmap, CharGlyph, Color,
    DocumentBackend, DocumentInfo, DocumentMetadata, DocumentProvider, Link, NewAnnotation,
    RenderRequest,
};
use crate::geometry::{PageSize, Quad, Rect};

pub const GLYPH_WIDTH: f32 = 6.0;
pub const GLYPH_HEIGHT: f32 = 12.0;
pub const LINE_PITCH: f32 = 20.0;
pub const TEXT_LEFT: f32 = 50.0;
pub const TEXT_TOP: f32 = 50.0;

#[derive(Debug, Clone)]
pub struct FakePage {
    pub size: PageSize,
    pub chars: Vec<CharGlyph>,
    pub links: Vec<Link>,
    pub images: Vec<Rect>,
}

impl FakePage {
    pub fn blank(width: f32, height: f32) -> Self {
        Self {
            size: PageSize::new(width, height),
            chars: Vec::new(),
            links: Vec::new(),
            images: Vec::new(),
        }
    }

    /// Lays `lines` out on a fixed grid, one glyph box per char.
    pub fn with_lines(width: f32, height: f32, lines: &[&str]) -> Self {
        let mut page = Self::blank(width, height);
        for (row, line) in lines.iter().enumerate() {
            let top = TEXT_TOP + row as f32 * LINE_PITCH;
            for (col, ch) in line.chars().enumerate() {
                let left = TEXT_LEFT + col as f32 * GLYPH_WIDTH;
                page.chars.push(CharGlyph {
                    ch,
                    bbox: Rect::new(left, top, left + GLYPH_WIDTH, top + GLYPH_HEIGHT),
                });
            }
        }
        page
    }

    pub fn with_link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    pub fn with_image(mut self, rect: Rect) -> Self {
        self.images.push(rect);
        self
    }
}

pub fn glyph_center(row: usize, col: usize) -> (f32, f32) {
    (
        TEXT_LEFT + col as f32 * GLYPH_WIDTH + GLYPH_WIDTH / 2.0,
        TEXT_TOP + row as f32 * LINE_PITCH + GLYPH_HEIGHT / 2.0,
    )
}

/// In-memory backend. The `AtomicBool` switches inject failures and id churn.
pub struct FakeBackend {
    info: DocumentInfo,
    pages: Vec<FakePage>,
    annotations: Mutex<HashMap<usize, Vec<Annotation>>>,
    next_id: AtomicUsize,
    /// Ignore requested ids and always hand out new ones.
    pub fresh_ids: AtomicBool,
    pub fail_annotation_writes: AtomicBool,
    pub fail_page_sizes: AtomicBool,
    pub saves: AtomicUsize,
    pub renders: Mutex<Vec<RenderRequest>>,
}

impl FakeBackend {
    pub fn new(path: &Path, pages: Vec<FakePage>) -> Self {
        Self {
            info: DocumentInfo {
                id: document_id_for_path(path),
                path: path.to_path_buf(),
                page_count: pages.len(),
                is_pdf: true,
                metadata: DocumentMetadata::default(),
            },
            pages,
            annotations: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            fresh_ids: AtomicBool::new(false),
            fail_annotation_writes: AtomicBool::new(false),
            fail_page_sizes: AtomicBool::new(false),
            saves: AtomicUsize::new(0),
            renders: Mutex::new(Vec::new()),
        }
    }

    pub fn uniform(page_count: usize, width: f32, height: f32) -> Self {
        let pages = (0..page_count)
            .map(|_| FakePage::blank(width, height))
            .collect();
        Self::new(Path::new("/tmp/fake.pdf"), pages)
    }

    pub fn not_pdf(mut self) -> Self {
        self.info.is_pdf = false;
        self
    }

    pub fn annotations_on(&self, page_index: usize) -> Vec<Annotation> {
        self.annotations
            .lock()
            .get(&page_index)
            .cloned()
            .unwrap_or_default()
    }

    pub fn insert_annotation(&self, page_index: usize, annotation: Annotation) {
        self.annotations
            .lock()
            .entry(page_index)
            .or_default()
            .push(annotation);
    }

    fn page(&self, page_index: usize) -> Result<&FakePage> {
        self.pages
            .get(page_index)
            .ok_or_else(|| anyhow!("page {} out of range", page_index))
    }
}

impl DocumentBackend for FakeBackend {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_size(&self, page_index: usize) -> Result<PageSize> {
        if self.fail_page_sizes.load(Ordering::SeqCst) {
            anyhow::bail!("page {} has no readable size", page_index);
        }
        Ok(self.page(page_index)?.size)
    }

    fn render_page(&self, request: &RenderRequest) -> Result<Bitmap> {
        let page = self.page(request.page_index)?;
        self.renders.lock().push(*request);
        let size = match request.clip {
            Some(clip) => PageSize::new(clip.width(), clip.height()),
            None => page.size,
        }
        .rotated(request.rotation);
        Ok(Bitmap::new(
            (size.width * request.scale).ceil() as u32,
            (size.height * request.scale).ceil() as u32,
            Color::WHITE,
        ))
    }

    fn page_chars(&self, page_index: usize) -> Result<Vec<CharGlyph>> {
        Ok(self.page(page_index)?.chars.clone())
    }

    fn page_links(&self, page_index: usize) -> Result<Vec<Link>> {
        Ok(self.page(page_index)?.links.clone())
    }

    fn page_annotations(&self, page_index: usize) -> Result<Vec<Annotation>> {
        Ok(self.annotations_on(page_index))
    }

    fn page_image_rects(&self, page_index: usize) -> Result<Vec<Rect>> {
        Ok(self.page(page_index)?.images.clone())
    }

    fn search_page(&self, page_index: usize, term: &str) -> Result<Vec<Quad>> {
        let page = self.page(page_index)?;
        let needle: Vec<char> = term.to_lowercase().chars().collect();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let haystack: Vec<char> = page
            .chars
            .iter()
            .map(|g| g.ch.to_lowercase().next().unwrap_or(g.ch))
            .collect();
        let mut quads = Vec::new();
        let mut start = 0;
        while start + needle.len() <= haystack.len() {
            if haystack[start..start + needle.len()] == needle[..] {
                let bounds = page.chars[start..start + needle.len()]
                    .iter()
                    .map(|g| g.bbox)
                    .reduce(|a, b| a.union(&b))
                    .unwrap_or_default();
                quads.push(Quad::from_rect(bounds));
                start += needle.len();
            } else {
                start += 1;
            }
        }
        Ok(quads)
    }

    fn add_annotation(
        &self,
        page_index: usize,
        annotation: &NewAnnotation,
    ) -> Result<AnnotationId> {
        self.page(page_index)?;
        if self.fail_annotation_writes.load(Ordering::SeqCst) {
            anyhow::bail!("annotation store is read-only");
        }
        let requested = annotation
            .id
            .clone()
            .filter(|_| !self.fresh_ids.load(Ordering::SeqCst));
        let id = requested.unwrap_or_else(|| {
            format!("annot-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
        });
        self.insert_annotation(
            page_index,
            Annotation {
                id: id.clone(),
                kind: annotation.kind,
                rect: annotation.rect,
                quads: annotation.quads.clone(),
                colors: annotation.colors,
                title: annotation.title.clone(),
                content: annotation.content.clone(),
            },
        );
        Ok(id)
    }

    fn update_annotation(
        &self,
        page_index: usize,
        id: &str,
        edit: &AnnotationEdit,
    ) -> Result<bool> {
        let mut annotations = self.annotations.lock();
        let Some(annotation) = annotations
            .get_mut(&page_index)
            .and_then(|list| list.iter_mut().find(|a| a.id == id))
        else {
            return Ok(false);
        };
        if let Some(content) = &edit.content {
            annotation.content = content.clone();
        }
        if let Some(rect) = edit.rect {
            annotation.rect = rect;
        }
        Ok(true)
    }

    fn delete_annotation(&self, page_index: usize, id: &str) -> Result<bool> {
        if self.fail_annotation_writes.load(Ordering::SeqCst) {
            anyhow::bail!("annotation store is read-only");
        }
        let mut annotations = self.annotations.lock();
        let Some(list) = annotations.get_mut(&page_index) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|a| a.id != id);
        Ok(list.len() != before)
    }

    fn save(&self) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Opens every path as the same set of pages; `fail_next` makes opens fail until cleared.
/// Documents opened while `broken_page_sizes` is set cannot report page sizes.
pub struct FakeProvider {
    pub pages: Mutex<Vec<FakePage>>,
    pub fail_next: AtomicBool,
    pub broken_page_sizes: AtomicBool,
}

impl FakeProvider {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            pages: Mutex::new(pages),
            fail_next: AtomicBool::new(false),
            broken_page_sizes: AtomicBool::new(false),
        }
    }

    pub fn uniform(page_count: usize, width: f32, height: f32) -> Self {
        Self::new(
            (0..page_count)
                .map(|_| FakePage::blank(width, height))
                .collect(),
        )
    }
}

#[async_trait::async_trait]
impl DocumentProvider for FakeProvider {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>> {
        if self.fail_next.load(Ordering::SeqCst) {
            anyhow::bail!("failed to open {:?}", path);
        }
        let backend = FakeBackend::new(path, self.pages.lock().clone());
        backend
            .fail_page_sizes
            .store(self.broken_page_sizes.load(Ordering::SeqCst), Ordering::SeqCst);
        Ok(Arc::new(backend))
    }
}
