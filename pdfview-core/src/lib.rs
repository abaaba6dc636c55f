//! Continuous-scroll viewport and render-cache controller for paged documents.
//!
//! The [`viewer::Viewer`] owns the scroll position, the zoom and the interaction modes of a
//! single open document. Rendering, text extraction and annotation storage live behind the
//! [`backend::DocumentBackend`] trait so hosts can plug in a real engine.

pub mod backend;
pub mod cache;
pub mod config;
pub mod decorate;
pub mod document;
pub mod error;
pub mod geometry;
pub mod history;
pub mod overlay;
pub mod reverse_index;
pub mod session;
pub mod synctex;
pub mod tasks;
pub mod undo;
pub mod viewer;

#[cfg(test)]
mod testing;

pub use backend::{
    document_id_for_path, Annotation, AnnotationKind, Bitmap, CharGlyph, Color, DocumentBackend,
    DocumentId, DocumentInfo, DocumentProvider, Link, LinkAction, RenderRequest,
};
pub use config::{DarkModePolicy, HostTheme, ThemeMode, ViewerConfig};
pub use error::ViewerError;
pub use geometry::{Point, Rect, Rotation};
pub use history::HistoryLog;
pub use overlay::InteractionMode;
pub use reverse_index::ReverseIndex;
pub use session::{
    FileStateStore, MemoryStateStore, PersistedDocumentState, ReadMode, SessionData, StateStore,
};
pub use synctex::SynctexInfo;
pub use viewer::{
    Command, Frame, MouseButton, PageDraw, PlacedLabel, PointerEvent, PromptTag, TickOutcome,
    Viewer, ViewerEvent, ViewportSize, ViewportState,
};
