use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{PageSize, Quad, Rect, Rotation};

pub type DocumentId = Uuid;
pub type AnnotationId = String;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f0d4c56-8b0e-5d4a-9f4e-7c1a2b9e6d10").expect("valid namespace UUID")
});

pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&*DOCUMENT_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    pub page_count: usize,
    /// Non-PDF formats get no annotations, rotation or margin trimming.
    pub is_pdf: bool,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: usize,
    pub scale: f32,
    pub rotation: Rotation,
    /// Crop box in unrotated page space.
    pub clip: Option<Rect>,
}

/// RGBA8 pixels, `stride` bytes per row.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub pixels: Vec<u8>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32, fill: Color) -> Self {
        let stride = width as usize * 4;
        let mut pixels = Vec::with_capacity(stride * height as usize);
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(&[fill.r, fill.g, fill.b, 255]);
        }
        Self {
            width,
            height,
            stride,
            pixels,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y as usize * self.stride + x as usize * 4;
        self.pixels
            .get(idx..idx + 4)
            .map(|px| [px[0], px[1], px[2], px[3]])
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn inverted(self) -> Self {
        Self::rgb(255 - self.r, 255 - self.g, 255 - self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            anyhow::bail!("expected a #RRGGBB colour, got {:?}", s);
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16);
        Ok(Color::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharGlyph {
    pub ch: char,
    pub bbox: Rect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    GoTo { page: usize },
    Uri { uri: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub rect: Rect,
    pub action: LinkAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationKind {
    Highlight,
    Underline,
    StrikeOut,
    Squiggly,
    Text,
    FreeText,
    Other,
}

impl AnnotationKind {
    pub fn is_markup(self) -> bool {
        matches!(
            self,
            AnnotationKind::Highlight
                | AnnotationKind::Underline
                | AnnotationKind::StrikeOut
                | AnnotationKind::Squiggly
        )
    }

    /// Only text notes and free text can be moved or edited.
    pub fn is_text(self) -> bool {
        matches!(self, AnnotationKind::Text | AnnotationKind::FreeText)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnnotationColors {
    pub stroke: Option<Color>,
    pub fill: Option<Color>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: AnnotationId,
    pub kind: AnnotationKind,
    pub rect: Rect,
    pub quads: Vec<Quad>,
    pub colors: AnnotationColors,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAnnotation {
    /// Backends reuse this id when given, so re-created annotations keep their identity.
    pub id: Option<AnnotationId>,
    pub kind: AnnotationKind,
    pub rect: Rect,
    pub quads: Vec<Quad>,
    pub colors: AnnotationColors,
    pub title: String,
    pub content: String,
    pub font_size: Option<f32>,
}

impl From<&Annotation> for NewAnnotation {
    fn from(annotation: &Annotation) -> Self {
        Self {
            id: Some(annotation.id.clone()),
            kind: annotation.kind,
            rect: annotation.rect,
            quads: annotation.quads.clone(),
            colors: annotation.colors,
            title: annotation.title.clone(),
            content: annotation.content.clone(),
            font_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationEdit {
    pub content: Option<String>,
    pub rect: Option<Rect>,
}

pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;
    /// Unrotated media size of a page.
    fn page_size(&self, page_index: usize) -> Result<PageSize>;
    fn render_page(&self, request: &RenderRequest) -> Result<Bitmap>;
    fn page_chars(&self, page_index: usize) -> Result<Vec<CharGlyph>>;
    fn page_links(&self, page_index: usize) -> Result<Vec<Link>>;
    fn page_annotations(&self, page_index: usize) -> Result<Vec<Annotation>>;
    fn search_page(&self, page_index: usize, term: &str) -> Result<Vec<Quad>>;

    fn page_image_rects(&self, _page_index: usize) -> Result<Vec<Rect>> {
        Ok(Vec::new())
    }

    fn page_text(&self, page_index: usize) -> Result<String> {
        Ok(self.page_chars(page_index)?.iter().map(|g| g.ch).collect())
    }

    /// Tight bounding box of the page content, used for margin trimming.
    fn content_bounds(&self, page_index: usize) -> Result<Option<Rect>> {
        let chars = self.page_chars(page_index)?;
        Ok(chars
            .iter()
            .filter(|g| !g.ch.is_whitespace() && g.bbox.is_valid())
            .map(|g| g.bbox)
            .reduce(|a, b| a.union(&b)))
    }

    fn supports_annotation_editing(&self) -> bool {
        self.info().is_pdf
    }

    fn add_annotation(&self, page_index: usize, annotation: &NewAnnotation)
        -> Result<AnnotationId>;
    /// Returns false when no annotation carries `id`.
    fn update_annotation(&self, page_index: usize, id: &str, edit: &AnnotationEdit)
        -> Result<bool>;
    /// Returns false when no annotation carries `id`.
    fn delete_annotation(&self, page_index: usize, id: &str) -> Result<bool>;
    fn save(&self) -> Result<()>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>>;
}
