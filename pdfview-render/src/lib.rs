use std::convert::TryFrom;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::imageops;
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use pdfview_core::backend::{
    document_id_for_path, Annotation, AnnotationColors, AnnotationEdit, AnnotationId,
    AnnotationKind, Bitmap, CharGlyph, DocumentBackend, DocumentInfo, DocumentMetadata,
    DocumentProvider, Link, LinkAction, NewAnnotation, RenderRequest,
};
use pdfview_core::error::ViewerError;
use pdfview_core::geometry::{page_rect_to_display, PageSize, Quad, Rect, Rotation};
use tracing::{debug, instrument, warn};

/// Overrides where the pdfium shared library is looked up.
pub const PDFIUM_LIBRARY_ENV: &str = "PDFVIEW_PDFIUM_LIBRARY";

pub struct PdfiumRenderFactory {
    pdfium: Arc<Pdfium>,
}

impl PdfiumRenderFactory {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumRenderFactory {
    #[instrument(skip(self))]
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let info = build_document_info(&self.pdfium, &absolute)?;
        debug!(pages = info.page_count, "document opened");
        Ok(Arc::new(PdfiumDocument::new(
            Arc::clone(&self.pdfium),
            absolute,
            info,
        )))
    }
}

/// Read-only pdfium document. Annotations are listed but never written back.
struct PdfiumDocument {
    document: Mutex<Option<PdfDocument<'static>>>,
    pdfium: Arc<Pdfium>,
    path: PathBuf,
    info: DocumentInfo,
}

impl PdfiumDocument {
    fn new(pdfium: Arc<Pdfium>, path: PathBuf, info: DocumentInfo) -> Self {
        Self {
            document: Mutex::new(None),
            pdfium,
            path,
            info,
        }
    }

    fn open_document(&self) -> Result<PdfDocument<'static>> {
        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .with_context(|| format!("failed to open {:?}", self.path))?;
        // SAFETY: the PdfDocument borrows the bindings owned by self.pdfium. It lives in
        // self.document, which is declared before pdfium and therefore dropped first.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        if guard.is_none() {
            *guard = Some(self.open_document()?);
        }
        let document = guard
            .as_ref()
            .ok_or_else(|| anyhow!("document {:?} is not loaded", self.path))?;
        f(document)
    }

    fn with_page<R, F>(&self, page_index: usize, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>, f32) -> Result<R>,
    {
        self.with_document(|document| {
            let index: PdfPageIndex = page_index
                .try_into()
                .map_err(|_| anyhow!("page {} is out of supported range", page_index))?;
            let page = document
                .pages()
                .get(index)
                .with_context(|| format!("page {} out of range", page_index))?;
            let page_height = page.height().value;
            f(&page, page_height)
        })
    }

    fn link_action_from_pdfium(&self, link: &PdfLink<'_>) -> Option<LinkAction> {
        if let Some(action) = link.action() {
            match action.action_type() {
                PdfActionType::GoToDestinationInSameDocument => {
                    if let Some(local) = action.as_local_destination_action() {
                        if let Ok(destination) = local.destination() {
                            if let Ok(page_index) = destination.page_index() {
                                return Some(LinkAction::GoTo {
                                    page: page_index as usize,
                                });
                            }
                        }
                    }
                }
                PdfActionType::Uri => {
                    if let Some(uri_action) = action.as_uri_action() {
                        if let Ok(uri) = uri_action.uri() {
                            if !uri.is_empty() {
                                return Some(LinkAction::Uri { uri });
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        if let Some(destination) = link.destination() {
            if let Ok(page_index) = destination.page_index() {
                return Some(LinkAction::GoTo {
                    page: page_index as usize,
                });
            }
        }

        None
    }

    fn unsupported(&self, what: &str) -> anyhow::Error {
        ViewerError::Unsupported(format!("{what} on {}", self.path.display())).into()
    }
}

impl DocumentBackend for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_size(&self, page_index: usize) -> Result<PageSize> {
        self.with_page(page_index, |page, height| {
            Ok(PageSize::new(page.width().value, height))
        })
    }

    #[instrument(skip(self))]
    fn render_page(&self, request: &RenderRequest) -> Result<Bitmap> {
        self.with_page(request.page_index, |page, height| {
            let media = PageSize::new(page.width().value, height);
            let config = PdfRenderConfig::new()
                .scale_page_by_factor(request.scale.max(0.01))
                .rotate(render_rotation(request.rotation), true);
            let rendered = page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {}", request.page_index))?;
            let mut image = rendered.as_image().to_rgba8();

            if let Some(clip) = request.clip {
                let (width, height) = image.dimensions();
                if let Some((x, y, w, h)) =
                    crop_region(clip, request.rotation, media, request.scale, width, height)
                {
                    image = imageops::crop_imm(&image, x, y, w, h).to_image();
                }
            }

            let (width, height) = image.dimensions();
            Ok(Bitmap {
                width,
                height,
                stride: width as usize * 4,
                pixels: image.into_raw(),
            })
        })
    }

    fn page_chars(&self, page_index: usize) -> Result<Vec<CharGlyph>> {
        self.with_page(page_index, |page, height| {
            let text = page
                .text()
                .with_context(|| format!("failed to extract text for page {}", page_index))?;
            let mut glyphs = Vec::new();
            for glyph in text.chars().iter() {
                let Some(ch) = glyph.unicode_char() else {
                    continue;
                };
                let bbox = match glyph.loose_bounds() {
                    Ok(bounds) => flip_rect(
                        bounds.left().value,
                        bounds.top().value,
                        bounds.right().value,
                        bounds.bottom().value,
                        height,
                    ),
                    Err(_) => continue,
                };
                glyphs.push(CharGlyph { ch, bbox });
            }
            Ok(glyphs)
        })
    }

    fn page_text(&self, page_index: usize) -> Result<String> {
        self.with_page(page_index, |page, _| {
            let text = page
                .text()
                .with_context(|| format!("failed to extract text for page {}", page_index))?;
            Ok(text.all())
        })
    }

    fn page_links(&self, page_index: usize) -> Result<Vec<Link>> {
        self.with_page(page_index, |page, height| {
            let mut links = Vec::new();
            for link in page.links().iter() {
                let rect = match link.rect() {
                    Ok(rect) => rect,
                    Err(err) => {
                        warn!(
                            ?err,
                            page = page_index,
                            path = %self.path.display(),
                            "failed to resolve link rectangle"
                        );
                        continue;
                    }
                };
                let rect = flip_rect(
                    rect.left().value,
                    rect.top().value,
                    rect.right().value,
                    rect.bottom().value,
                    height,
                );
                if !rect.is_valid() {
                    continue;
                }
                let Some(action) = self.link_action_from_pdfium(&link) else {
                    continue;
                };
                links.push(Link { rect, action });
            }
            Ok(links)
        })
    }

    fn page_annotations(&self, page_index: usize) -> Result<Vec<Annotation>> {
        self.with_page(page_index, |page, height| {
            let mut annotations = Vec::new();
            for (position, annotation) in page.annotations().iter().enumerate() {
                let Some(kind) = annotation_kind(annotation.annotation_type()) else {
                    continue;
                };
                let rect = match annotation.bounds() {
                    Ok(bounds) => flip_rect(
                        bounds.left().value,
                        bounds.top().value,
                        bounds.right().value,
                        bounds.bottom().value,
                        height,
                    ),
                    Err(_) => continue,
                };
                annotations.push(Annotation {
                    id: annotation
                        .name()
                        .filter(|name| !name.is_empty())
                        .unwrap_or_else(|| format!("p{}-{}", page_index, position)),
                    kind,
                    rect,
                    quads: vec![Quad::from_rect(rect)],
                    colors: AnnotationColors::default(),
                    title: annotation.creator().unwrap_or_default(),
                    content: annotation.contents().unwrap_or_default(),
                });
            }
            Ok(annotations)
        })
    }

    fn search_page(&self, page_index: usize, term: &str) -> Result<Vec<Quad>> {
        if term.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.with_page(page_index, |page, height| {
            let text = page
                .text()
                .with_context(|| format!("failed to extract text for page {}", page_index))?;
            let options = PdfSearchOptions::new();
            let search = text
                .search(term, &options)
                .with_context(|| format!("failed to perform search on page {}", page_index))?;

            let mut quads = Vec::new();
            while let Some(segments) = search.find_next() {
                for segment in segments.iter() {
                    let bounds = segment.bounds();
                    let rect = flip_rect(
                        bounds.left().value,
                        bounds.top().value,
                        bounds.right().value,
                        bounds.bottom().value,
                        height,
                    );
                    if rect.is_valid() {
                        quads.push(Quad::from_rect(rect));
                    }
                }
            }
            Ok(quads)
        })
    }

    fn page_image_rects(&self, page_index: usize) -> Result<Vec<Rect>> {
        self.with_page(page_index, |page, height| {
            let mut rects = Vec::new();
            for object in page.objects().iter() {
                if object.object_type() != PdfPageObjectType::Image {
                    continue;
                }
                if let Ok(bounds) = object.bounds() {
                    rects.push(flip_rect(
                        bounds.left().value,
                        bounds.top().value,
                        bounds.right().value,
                        bounds.bottom().value,
                        height,
                    ));
                }
            }
            Ok(rects)
        })
    }

    fn supports_annotation_editing(&self) -> bool {
        false
    }

    fn add_annotation(
        &self,
        _page_index: usize,
        _annotation: &NewAnnotation,
    ) -> Result<AnnotationId> {
        Err(self.unsupported("adding annotations"))
    }

    fn update_annotation(
        &self,
        _page_index: usize,
        _id: &str,
        _edit: &AnnotationEdit,
    ) -> Result<bool> {
        Err(self.unsupported("editing annotations"))
    }

    fn delete_annotation(&self, _page_index: usize, _id: &str) -> Result<bool> {
        Err(self.unsupported("deleting annotations"))
    }

    fn save(&self) -> Result<()> {
        Err(self.unsupported("saving"))
    }
}

fn annotation_kind(kind: PdfPageAnnotationType) -> Option<AnnotationKind> {
    match kind {
        PdfPageAnnotationType::Highlight => Some(AnnotationKind::Highlight),
        PdfPageAnnotationType::Underline => Some(AnnotationKind::Underline),
        PdfPageAnnotationType::Strikeout => Some(AnnotationKind::StrikeOut),
        PdfPageAnnotationType::Squiggly => Some(AnnotationKind::Squiggly),
        PdfPageAnnotationType::Text => Some(AnnotationKind::Text),
        PdfPageAnnotationType::FreeText => Some(AnnotationKind::FreeText),
        PdfPageAnnotationType::Link | PdfPageAnnotationType::Popup => None,
        _ => Some(AnnotationKind::Other),
    }
}

fn render_rotation(rotation: Rotation) -> PdfPageRenderRotation {
    match rotation {
        Rotation::Deg0 => PdfPageRenderRotation::None,
        Rotation::Deg90 => PdfPageRenderRotation::Degrees90,
        Rotation::Deg180 => PdfPageRenderRotation::Degrees180,
        Rotation::Deg270 => PdfPageRenderRotation::Degrees270,
    }
}

/// Converts pdfium's bottom-left based box into a top-left based page rect.
fn flip_rect(left: f32, top: f32, right: f32, bottom: f32, page_height: f32) -> Rect {
    Rect::new(left, page_height - top, right, page_height - bottom).normalized()
}

/// Pixel region of `clip` inside a page rendered at `scale` and `rotation`.
fn crop_region(
    clip: Rect,
    rotation: Rotation,
    media: PageSize,
    scale: f32,
    width: u32,
    height: u32,
) -> Option<(u32, u32, u32, u32)> {
    let region = page_rect_to_display(clip, rotation, media).scaled(scale);
    let x0 = region.x0.floor().clamp(0.0, width as f32) as u32;
    let y0 = region.y0.floor().clamp(0.0, height as f32) as u32;
    let x1 = region.x1.ceil().clamp(0.0, width as f32) as u32;
    let y1 = region.y1.ceil().clamp(0.0, height as f32) as u32;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0, y0, x1 - x0, y1 - y0))
}

#[instrument(skip(pdfium))]
fn build_document_info(pdfium: &Pdfium, path: &Path) -> Result<DocumentInfo> {
    let document = pdfium
        .load_pdf_from_file(path, None)
        .with_context(|| format!("failed to open {:?}", path))?;
    let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
    let metadata = document.metadata();

    let title = metadata
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().to_owned());
    let author = metadata
        .get(PdfDocumentMetadataTagType::Author)
        .map(|t| t.value().to_owned());

    Ok(DocumentInfo {
        id: document_id_for_path(path),
        path: path.to_path_buf(),
        page_count,
        is_pdf: true,
        metadata: DocumentMetadata { title, author },
    })
}

pub type PdfRenderFactory = PdfiumRenderFactory;

fn bind_pdfium_from_env() -> Option<Pdfium> {
    let path = std::env::var_os(PDFIUM_LIBRARY_ENV).filter(|path| !path.is_empty())?;
    match Pdfium::bind_to_library(&path) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!(
                "failed to load Pdfium from {}={:?}: {}",
                PDFIUM_LIBRARY_ENV, path, err
            );
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set {} or install it ({})",
                PDFIUM_LIBRARY_ENV,
                errors.join(", ")
            ))
        }
    }
}
