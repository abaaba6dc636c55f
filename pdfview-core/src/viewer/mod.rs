mod input;
mod navigation;
mod overlays;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

pub use input::{MouseButton, PointerEvent};

use crate::backend::{
    Bitmap, Color, DocumentBackend, DocumentInfo, DocumentProvider, Link, RenderRequest,
};
use crate::cache::RenderCache;
use crate::config::{DarkModePolicy, HostTheme, ThemeMode, ViewerConfig};
use crate::decorate::{self, Mark, PageDecorations};
use crate::document::DocumentView;
use crate::error::ViewerError;
use crate::geometry::{render_x, PageLayout, PageSize, PageTransform, Point, Rect, Rotation};
use crate::overlay::annot::AnnotTarget;
use crate::overlay::links::JumpLabels;
pub use crate::overlay::links::PlacedLabel;
use crate::overlay::search::SearchState;
use crate::overlay::selection::{line_rects, Selection};
use crate::overlay::InteractionMode;
use crate::session::{PersistedDocumentState, ReadMode, SavedPositions, SessionData};
use crate::synctex::SynctexInfo;
use crate::tasks::{DelayedTasks, TaskPurpose};
use crate::undo::UndoLog;

/// Quiet period after a file-change notification before the document is reopened.
pub const RELOAD_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptTag {
    JumpToPage,
    JumpToPercent,
    JumpToLink,
    SearchText,
    PopupTextAnnot,
    InlineTextAnnot,
    EditAnnotText,
}

/// Requests from the viewer to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    Notify(String),
    PromptInput {
        label: String,
        tag: PromptTag,
        initial: String,
    },
    OpenUrl {
        url: String,
        external: bool,
    },
    CopyToClipboard(String),
    Tooltip(Option<String>),
    PositionChanged {
        current_page: usize,
        page_count: usize,
    },
    EnterFullscreen,
    ExitFullscreen,
    TranslateWord(String),
    SynctexBackwardEdit {
        path: PathBuf,
        page: usize,
        x: f32,
        y: f32,
    },
    DocumentReloaded,
    RedrawNeeded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ScrollUp,
    ScrollDown,
    ScrollUpPage,
    ScrollDownPage,
    ScrollLeft,
    ScrollRight,
    ScrollCenterHorizontal,
    ScrollToBegin,
    ScrollToEnd,
    Pan { delta_x: f32, delta_y: f32 },
    NextPage,
    PrevPage,
    JumpToPage { page: usize },
    JumpToPercent { percent: f32 },
    PromptJumpToPage,
    PromptJumpToPercent,
    ZoomIn,
    ZoomOut,
    ZoomFitTextWidth,
    ZoomCloseToTextWidth,
    ZoomReset { mode: ReadMode },
    ToggleReadMode,
    TogglePresentationMode,
    RotateClockwise,
    RotateCounterclockwise,
    ToggleTrimWhiteMargin,
    ToggleInvertedMode,
    ToggleInvertedImageMode,
    ToggleMarkLink,
    SaveCurrentPosition,
    JumpToSavedPosition,
    JumpToPreviousSavedPosition,
    JumpToNextSavedPosition,
    JumpToLink,
    Search,
    SearchNext,
    SearchPrevious,
    CleanupSearch,
    CopySelection,
    AnnotateSelection { kind: crate::backend::AnnotationKind },
    AddPopupTextAnnot,
    AddInlineTextAnnot,
    EditHoveredAnnot,
    MoveHoveredAnnot,
    DeleteHoveredAnnot,
    Undo,
    Redo,
    CancelMode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSize {
    pub width: f32,
    pub height: f32,
    pub device_scale: f32,
}

impl ViewportSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            device_scale: 1.0,
        }
    }

    pub fn with_device_scale(mut self, device_scale: f32) -> Self {
        self.device_scale = device_scale;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub scroll_offset: f32,
    pub horizontal_offset: f32,
    pub scale: f32,
    pub rotation: Rotation,
    pub read_mode: ReadMode,
    pub start_page_index: usize,
    /// Exclusive end of the pages being drawn.
    pub last_page_index: usize,
    pub current_page_index: usize,
}

/// One page to blit: the cached bitmap, where it goes, and what to draw over it.
#[derive(Debug, Clone)]
pub struct PageDraw {
    pub page_index: usize,
    /// Destination in viewport pixels; the bitmap carries `device_scale` times as many pixels.
    pub rect: Rect,
    pub bitmap: Arc<Bitmap>,
    pub selection: Vec<Rect>,
    pub labels: Vec<PlacedLabel>,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub viewport: ViewportSize,
    pub background: Color,
    pub foreground: Color,
    pub pages: Vec<PageDraw>,
    pub progress: Option<String>,
    pub synctex_marker: Option<Rect>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub redraw: bool,
    /// The host should call [`Viewer::reload`].
    pub reload_due: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    page_index: usize,
    rect: Rect,
    transform: PageTransform,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PresentationBackup {
    scale: f32,
    read_mode: ReadMode,
    scroll_offset: f32,
    start_page_index: usize,
}

pub struct Viewer {
    config: ViewerConfig,
    theme: HostTheme,
    document: DocumentView,
    pending_document: Option<Arc<dyn DocumentBackend>>,
    retry_reload: bool,
    cache: RenderCache,
    layout: PageLayout,
    reference: PageSize,
    state: ViewportState,
    viewport: ViewportSize,
    mode: InteractionMode,
    presentation_backup: Option<PresentationBackup>,
    inverted: bool,
    inverted_images: bool,
    mark_links: bool,
    search: Option<SearchState>,
    pending_search: Option<String>,
    jump_labels: JumpLabels,
    selection: Selection,
    hovered_link: Option<Link>,
    hovered_annot: Option<AnnotTarget>,
    editing_annot: Option<AnnotTarget>,
    moving_annot: Option<AnnotTarget>,
    undo: UndoLog,
    saved: SavedPositions,
    synctex: Option<SynctexInfo>,
    tasks: DelayedTasks,
    placements: Vec<Placement>,
    pointer: Option<Point>,
    dragging: bool,
    last_wheel: Option<Instant>,
    last_page_flip: Option<Instant>,
    last_reported: Option<(usize, usize)>,
    events: Arc<Mutex<Vec<ViewerEvent>>>,
}

impl Viewer {
    #[instrument(skip(provider, config, theme))]
    pub async fn open_with<P: DocumentProvider + ?Sized>(
        provider: &P,
        path: &Path,
        config: ViewerConfig,
        theme: HostTheme,
        viewport: ViewportSize,
    ) -> Result<Self> {
        let backend = provider
            .open(path)
            .await
            .with_context(|| format!("failed to open {:?}", path))?;
        Self::new(backend, config, theme, viewport)
    }

    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        config: ViewerConfig,
        theme: HostTheme,
        viewport: ViewportSize,
    ) -> Result<Self> {
        if backend.info().page_count == 0 {
            return Err(ViewerError::EmptyDocument.into());
        }
        let config = config.sanitized();
        let is_pdf = backend.info().is_pdf;
        let inverted = match config.dark_mode {
            DarkModePolicy::Follow => theme.mode == ThemeMode::Dark,
            DarkModePolicy::Force => true,
            DarkModePolicy::Ignore => false,
        };
        let jump_labels = JumpLabels::new(&config.marker_letters, config.marker_font_size);
        let mut viewer = Self {
            theme,
            document: DocumentView::new(backend),
            pending_document: None,
            retry_reload: false,
            cache: RenderCache::new(),
            layout: PageLayout::uniform(0.0, 0),
            reference: PageSize::default(),
            state: ViewportState {
                scroll_offset: 0.0,
                horizontal_offset: 0.0,
                scale: config.default_zoom,
                rotation: Rotation::Deg0,
                read_mode: ReadMode::FitWidth,
                start_page_index: 0,
                last_page_index: 0,
                current_page_index: 0,
            },
            viewport,
            mode: InteractionMode::Idle,
            presentation_backup: None,
            inverted,
            inverted_images: is_pdf && !config.dark_exclude_image,
            mark_links: false,
            search: None,
            pending_search: None,
            jump_labels,
            selection: Selection::default(),
            hovered_link: None,
            hovered_annot: None,
            editing_annot: None,
            moving_annot: None,
            undo: UndoLog::default(),
            saved: SavedPositions::default(),
            synctex: None,
            tasks: DelayedTasks::new(),
            placements: Vec::new(),
            pointer: None,
            dragging: false,
            last_wheel: None,
            last_page_flip: None,
            last_reported: None,
            events: Arc::new(Mutex::new(Vec::new())),
            config,
        };
        viewer.rebuild_layout()?;
        viewer.update_scale();
        viewer.update_page_index();
        info!(
            path = ?viewer.document.info().path,
            pages = viewer.page_count(),
            "document opened"
        );
        Ok(viewer)
    }

    pub fn events(&self) -> Arc<Mutex<Vec<ViewerEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn drain_events(&self) -> Vec<ViewerEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn info(&self) -> &DocumentInfo {
        self.document.info()
    }

    pub fn backend(&self) -> Arc<dyn DocumentBackend> {
        Arc::clone(self.document.backend())
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn viewport(&self) -> ViewportSize {
        self.viewport
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    pub fn search_state(&self) -> Option<&SearchState> {
        self.search.as_ref()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn undo_log(&self) -> &UndoLog {
        &self.undo
    }

    pub fn hovered_annotation(&self) -> Option<&AnnotTarget> {
        self.hovered_annot.as_ref()
    }

    pub fn hovered_link(&self) -> Option<&Link> {
        self.hovered_link.as_ref()
    }

    pub fn page_count(&self) -> usize {
        self.layout.page_count()
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Reference page size after rotation (and trimming), used by the fit modes.
    pub fn page_size(&self) -> PageSize {
        self.reference
    }

    pub fn is_pdf(&self) -> bool {
        self.document.is_pdf()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.next_deadline()
    }

    fn push_event(&self, event: ViewerEvent) {
        self.events.lock().push(event);
    }

    fn notify(&self, message: impl Into<String>) {
        self.push_event(ViewerEvent::Notify(message.into()));
    }

    fn prompt(&self, label: &str, tag: PromptTag, initial: &str) {
        self.push_event(ViewerEvent::PromptInput {
            label: label.to_string(),
            tag,
            initial: initial.to_string(),
        });
    }

    fn padding(&self) -> f32 {
        self.config.page_padding
    }

    fn effective_rotation(&self) -> Rotation {
        if self.document.is_pdf() {
            self.state.rotation
        } else {
            Rotation::Deg0
        }
    }

    fn rebuild_layout(&mut self) -> Result<()> {
        let rotation = self.effective_rotation();
        self.layout = self.document.layout(rotation)?;
        self.reference = self.document.reference_size(rotation)?;
        Ok(())
    }

    pub fn max_scroll_offset(&self) -> f32 {
        self.layout
            .max_scroll_offset(self.state.scale, self.padding(), self.viewport.height)
    }

    pub fn page_top_offset(&self, page_index: usize) -> f32 {
        self.layout
            .page_top_px(page_index, self.state.scale, self.padding())
    }

    fn set_scroll_offset(&mut self, offset: f32) {
        let clamped = if offset.is_finite() {
            offset.clamp(0.0, self.max_scroll_offset())
        } else {
            0.0
        };
        if clamped != self.state.scroll_offset {
            self.state.scroll_offset = clamped;
            self.update_page_index();
        }
    }

    pub(crate) fn update_page_index(&mut self) {
        let count = self.page_count();
        if count == 0 {
            self.state.start_page_index = 0;
            self.state.last_page_index = 0;
            self.state.current_page_index = 0;
            return;
        }
        if self.state.read_mode == ReadMode::Presentation {
            let index = self.state.start_page_index.min(count - 1);
            self.state.start_page_index = index;
            self.state.last_page_index = index + 1;
            self.state.current_page_index = index;
            return;
        }
        let max = self.max_scroll_offset();
        if self.state.scroll_offset > max {
            self.state.scroll_offset = max;
        }
        let range = self.layout.render_range(
            self.state.scroll_offset,
            self.viewport.height,
            self.state.scale,
            self.padding(),
        );
        self.state.start_page_index = range.start;
        self.state.last_page_index = range.end;
        self.state.current_page_index = self.compute_current_page(max);
    }

    fn compute_current_page(&self, max: f32) -> usize {
        let count = self.page_count();
        let offset = self.state.scroll_offset;
        if offset <= 0.0 {
            return 0;
        }
        if offset >= max {
            return count - 1;
        }
        let sample = offset + self.viewport.height * 5.0 / 9.0;
        let index = self
            .layout
            .page_index_for_offset(sample, self.state.scale, self.padding());
        index
            .max(self.state.start_page_index)
            .min(self.state.last_page_index.saturating_sub(1))
    }

    pub fn current_percent(&self) -> f32 {
        let total = self.max_scroll_offset() + self.viewport.height;
        if total <= 0.0 {
            return 0.0;
        }
        100.0 * self.state.scroll_offset / total
    }

    pub fn progress_text(&self) -> String {
        format!(
            "{}% ( {}/{} )",
            self.current_percent().round() as i64,
            self.state.current_page_index + 1,
            self.page_count()
        )
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn background_color(&self) -> Color {
        match (self.config.dark_mode, self.inverted) {
            (DarkModePolicy::Follow, _) => self.theme.background,
            (_, true) => Color::rgb(0x24, 0x24, 0x24),
            (_, false) => Color::rgb(0xF0, 0xF0, 0xF0),
        }
    }

    pub fn foreground_color(&self) -> Color {
        match (self.config.dark_mode, self.inverted) {
            (DarkModePolicy::Follow, _) => self.theme.foreground,
            (_, true) => Color::WHITE,
            (_, false) => Color::BLACK,
        }
    }

    pub fn set_theme(&mut self, theme: HostTheme) {
        if self.config.dark_mode == DarkModePolicy::Follow && theme.mode != self.theme.mode {
            self.inverted = theme.mode == ThemeMode::Dark;
            self.cache.invalidate_all();
        }
        self.theme = theme;
    }

    pub fn resize(&mut self, viewport: ViewportSize) {
        if viewport == self.viewport {
            return;
        }
        self.viewport = viewport;
        self.update_scale();
        self.update_page_index();
    }

    /// Screen position of `position` on the last painted pages, in page space.
    pub fn cursor_to_page(&self, position: Point) -> Option<(usize, Point)> {
        self.placements
            .iter()
            .find(|placement| placement.rect.contains(position))
            .map(|placement| {
                let local = Point::new(
                    position.x - placement.rect.x0,
                    position.y - placement.rect.y0,
                );
                (placement.page_index, placement.transform.point_to_page(local))
            })
    }

    /// In presentation mode the scale and offset are the ones presentation returns to.
    pub fn session_data(&self) -> SessionData {
        let (scale, read_mode, scroll_offset) = match self.presentation_backup {
            Some(backup) => (backup.scale, ReadMode::Presentation, backup.scroll_offset),
            None => (
                self.state.scale,
                self.state.read_mode,
                self.state.scroll_offset,
            ),
        };
        SessionData {
            scroll_offset,
            scale,
            read_mode,
            inverted: self.inverted,
            rotation: self.state.rotation,
            start_page_index: Some(self.state.start_page_index),
        }
    }

    pub fn persisted_state(&self) -> PersistedDocumentState {
        PersistedDocumentState {
            session: Some(self.session_data()),
            saved_positions: self.saved.clone(),
            trim_margin: self.document.trim_margin(),
        }
    }

    pub fn restore(&mut self, persisted: &PersistedDocumentState) -> Result<()> {
        self.saved = persisted.saved_positions.clone();
        if persisted.trim_margin && self.is_pdf() {
            self.document.set_trim_margin(true);
            self.document.page(0)?;
            self.document.take_clip_changed();
        }
        if let Some(session) = persisted.session {
            self.restore_session(&session)?;
        } else {
            self.rebuild_layout()?;
            self.update_scale();
            self.update_page_index();
        }
        Ok(())
    }

    /// Applies a session snapshot; fit modes then rescale to the current viewport.
    /// A presentation session reopens presentation on its saved page, over a fit-width view.
    pub fn restore_session(&mut self, session: &SessionData) -> Result<()> {
        if self.presentation_backup.is_some() {
            self.toggle_presentation_mode();
        }
        let presentation = session.read_mode == ReadMode::Presentation;
        self.state.read_mode = if presentation {
            ReadMode::FitWidth
        } else {
            session.read_mode
        };
        self.state.scale = session.scale;
        self.state.scroll_offset = session.scroll_offset;
        self.inverted = session.inverted;
        if self.is_pdf() {
            self.state.rotation = session.rotation;
        }
        self.cache.invalidate_all();
        self.rebuild_layout()?;
        self.update_scale();
        self.update_page_index();
        if presentation {
            if let Some(start) = session.start_page_index {
                self.state.current_page_index = start.min(self.page_count().saturating_sub(1));
            }
            self.toggle_presentation_mode();
        }
        debug!(%session, "session restored");
        Ok(())
    }

    pub fn notify_file_changed(&mut self, now: Instant) {
        self.tasks
            .schedule(TaskPurpose::ReloadDocument, RELOAD_DELAY, now);
        if self.config.notify_file_changed {
            self.notify(format!(
                "Detected that {} has been changed. Refreshing buffer...",
                self.document.info().path.display()
            ));
        }
    }

    /// Reopens the document; the new one is swapped in at the start of the next paint.
    /// A failed open, or a new document without a usable layout, keeps the current document
    /// and retries after [`RELOAD_DELAY`].
    #[instrument(skip(self, provider))]
    pub async fn reload<P: DocumentProvider + ?Sized>(
        &mut self,
        provider: &P,
        now: Instant,
    ) -> bool {
        let path = self.document.info().path.clone();
        match provider.open(&path).await {
            Ok(backend) if backend.info().page_count > 0 => {
                self.pending_document = Some(backend);
                self.push_event(ViewerEvent::RedrawNeeded);
                true
            }
            Ok(_) => {
                warn!("reloaded {:?} has no pages, retrying", path);
                self.tasks
                    .schedule(TaskPurpose::ReloadDocument, RELOAD_DELAY, now);
                false
            }
            Err(err) => {
                warn!("failed to reload {:?}: {err:#}", path);
                self.notify("Failed to reload PDF file!");
                self.tasks
                    .schedule(TaskPurpose::ReloadDocument, RELOAD_DELAY, now);
                false
            }
        }
    }

    pub fn has_pending_document(&self) -> bool {
        self.pending_document.is_some()
    }

    fn install_pending_document(&mut self) -> Result<()> {
        let Some(backend) = self.pending_document.take() else {
            return Ok(());
        };
        let current = self.state.current_page_index;
        if let Err(err) = self.document.replace(backend, self.state.rotation) {
            warn!("reloaded document has no usable layout, keeping the current one: {err:#}");
            self.notify("Failed to reload PDF file!");
            self.retry_reload = true;
            return Ok(());
        }
        self.cache.invalidate_all();
        self.search = None;
        self.pending_search = None;
        self.jump_labels.clear();
        self.selection.clear();
        self.hovered_link = None;
        self.hovered_annot = None;
        self.editing_annot = None;
        self.moving_annot = None;
        self.placements.clear();
        if !self.mode.is_idle() {
            self.leave_mode();
        }
        self.rebuild_layout()?;
        self.update_scale();
        if self.state.read_mode == ReadMode::Presentation {
            self.state.start_page_index = current.min(self.page_count().saturating_sub(1));
        }
        self.update_page_index();
        info!(pages = self.page_count(), "document reloaded");
        self.push_event(ViewerEvent::DocumentReloaded);
        Ok(())
    }

    /// Fires due timers. Each handler re-checks the mode it was armed for.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if std::mem::take(&mut self.retry_reload) {
            self.tasks
                .schedule(TaskPurpose::ReloadDocument, RELOAD_DELAY, now);
        }
        for purpose in self.tasks.take_due(now) {
            match purpose {
                TaskPurpose::ReloadDocument => outcome.reload_due = true,
                TaskPurpose::AnnotationCapture => {
                    self.fire_annotation_capture();
                    outcome.redraw = true;
                }
                TaskPurpose::SearchAsYouType => {
                    if let Some(term) = self.pending_search.take() {
                        let unchanged =
                            self.search.as_ref().map(SearchState::term) == Some(term.as_str());
                        if self.mode == InteractionMode::Searching && !unchanged {
                            self.run_search(&term);
                            outcome.redraw = true;
                        }
                    }
                }
                TaskPurpose::ClearSynctexMarker => {
                    self.synctex = None;
                    outcome.redraw = true;
                }
            }
        }
        outcome
    }

    pub fn paint(&mut self) -> Result<Frame> {
        self.install_pending_document()?;
        self.update_page_index();

        let range = self.state.start_page_index..self.state.last_page_index;
        let mut pages = Vec::with_capacity(range.len());
        let mut placements = Vec::with_capacity(range.len());
        for page_index in range.clone() {
            match self.draw_page(page_index) {
                Ok((draw, placement)) => {
                    pages.push(draw);
                    placements.push(placement);
                }
                Err(err) => warn!("failed to draw page {}: {err:#}", page_index),
            }
        }

        if self.document.take_clip_changed() {
            // trim clip grew while drawing: relayout around the same page on the next paint
            let current = self.state.current_page_index;
            self.cache.invalidate_all();
            self.rebuild_layout()?;
            self.update_scale();
            self.jump_to_page(current + 1);
            self.push_event(ViewerEvent::RedrawNeeded);
        }

        for evicted in self.cache.prune(&range) {
            self.document.release(evicted);
        }
        let synctex_marker = self.synctex_marker(&placements);
        self.placements = placements;
        self.report_position();

        Ok(Frame {
            viewport: self.viewport,
            background: self.background_color(),
            foreground: self.foreground_color(),
            pages,
            progress: self.config.show_progress.then(|| self.progress_text()),
            synctex_marker,
        })
    }

    fn report_position(&mut self) {
        let position = (self.state.current_page_index + 1, self.page_count());
        if self.last_reported != Some(position) {
            self.last_reported = Some(position);
            self.push_event(ViewerEvent::PositionChanged {
                current_page: position.0,
                page_count: position.1,
            });
        }
    }

    fn synctex_marker(&self, placements: &[Placement]) -> Option<Rect> {
        let info = self.synctex?;
        let placement = placements
            .iter()
            .find(|placement| placement.page_index == info.page_index())?;
        let on_page = placement
            .transform
            .rect_to_display(Rect::new(info.x, info.y, info.x, info.y));
        let x = placement.rect.x0 + on_page.x0;
        let y = placement.rect.y0 + on_page.y0;
        Some(Rect::new(x - 6.0, y - 6.0, x + 6.0, y + 6.0))
    }

    fn draw_page(&mut self, page_index: usize) -> Result<(PageDraw, Placement)> {
        let rotation = self.effective_rotation();
        let scale = self.state.scale;
        let transform = self.document.page(page_index)?.transform(rotation, scale);
        let display = transform.display_size();
        let width = display.width * scale;
        let height = display.height * scale;

        let (x, y) = if self.state.read_mode == ReadMode::Presentation {
            (
                (self.viewport.width - width) / 2.0,
                (self.viewport.height - height) / 2.0,
            )
        } else {
            (
                render_x(
                    self.viewport.width,
                    width,
                    self.state.horizontal_offset,
                    self.state.read_mode == ReadMode::FitCustomize,
                ),
                self.page_top_offset(page_index) - self.state.scroll_offset,
            )
        };
        let rect = Rect::from_point_size(Point::new(x, y), width, height);

        let bitmap = self.resolve_bitmap(page_index, &transform)?;
        let selection = self
            .selection_rects(page_index)
            .into_iter()
            .map(|r| transform.rect_to_display(r).translated(rect.x0, rect.y0))
            .collect();
        let labels = if self.mode == InteractionMode::JumpLinking {
            self.jump_labels
                .labels_on(page_index)
                .iter()
                .map(|placed| PlacedLabel {
                    label: placed.label.clone(),
                    rect: transform
                        .rect_to_display(placed.rect)
                        .translated(rect.x0, rect.y0),
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok((
            PageDraw {
                page_index,
                rect,
                bitmap,
                selection,
                labels,
            },
            Placement {
                page_index,
                rect,
                transform,
            },
        ))
    }

    fn resolve_bitmap(
        &mut self,
        page_index: usize,
        transform: &PageTransform,
    ) -> Result<Arc<Bitmap>> {
        let raster_scale = self.state.scale * self.viewport.device_scale;
        self.cache.prepare_scale(raster_scale);
        if let Some(bitmap) = self.cache.get(page_index, raster_scale) {
            return Ok(bitmap);
        }
        let bitmap = self.render_page(page_index, raster_scale, transform)?;
        self.cache
            .get_or_insert_with(page_index, raster_scale, || Ok(bitmap))
    }

    fn render_page(
        &mut self,
        page_index: usize,
        raster_scale: f32,
        transform: &PageTransform,
    ) -> Result<Bitmap> {
        let clip = self.document.page(page_index)?.clip;
        let request = RenderRequest {
            page_index,
            scale: raster_scale,
            rotation: transform.rotation,
            clip,
        };
        let backend = Arc::clone(self.document.backend());
        let mut bitmap = backend.render_page(&request)?;
        let device_scale = self.viewport.device_scale;

        if self.inverted {
            decorate::invert(&mut bitmap);
            if !self.inverted_images {
                let images = backend.page_image_rects(page_index).unwrap_or_else(|err| {
                    warn!("failed to locate images on page {}: {err:#}", page_index);
                    Vec::new()
                });
                for image in images {
                    let region = transform.rect_to_display(image).scaled(device_scale);
                    decorate::invert_region(&mut bitmap, region);
                }
            }
        }

        let decorations = self.page_decorations(page_index);
        decorations.apply(&mut bitmap, transform, device_scale);
        Ok(bitmap)
    }

    fn page_decorations(&mut self, page_index: usize) -> PageDecorations {
        let mut marks = PageDecorations::new();
        if self.mark_links && self.document.is_pdf() {
            let color = self.config.link_mark_color;
            for link in self.document.links(page_index) {
                marks.push(link.rect, Mark::Underline { color });
            }
        }
        if let Some(search) = &self.search {
            let color = self.config.search_highlight_color;
            for (index, hit) in search.matches_on(page_index) {
                let alpha = if index == search.current_index() { 0.6 } else { 0.3 };
                marks.push(hit.quad.bounds(), Mark::Fill { color, alpha });
            }
        }
        if self.mode == InteractionMode::JumpLinking {
            let color = self.config.marker_color;
            let links = self.document.links(page_index);
            let mut rng = rand::thread_rng();
            for placed in self.jump_labels.assign(page_index, links, &mut rng) {
                marks.push(placed.rect, Mark::Fill { color, alpha: 1.0 });
                marks.push(placed.rect, Mark::Outline { color: Color::BLACK });
            }
        }
        let hovered = self
            .hovered_annot
            .as_ref()
            .filter(|hovered| hovered.page_index == page_index);
        if let Some(hovered) = hovered {
            let color = hovered
                .annotation
                .colors
                .stroke
                .unwrap_or(self.config.highlight_color);
            marks.push(hovered.annotation.rect, Mark::Outline { color });
        }
        marks
    }

    fn selection_rects(&mut self, page_index: usize) -> Vec<Rect> {
        if !self.selection.is_active() {
            return Vec::new();
        }
        let chars = self.document.chars(page_index);
        match self.selection.span_on(page_index, chars.len()) {
            Some(span) => line_rects(&chars[span]),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests;
