use std::time::Instant;

use anyhow::Result;
use tracing::{debug, warn};

use super::{PresentationBackup, Viewer, ViewerEvent};
use crate::geometry::Rect;
use crate::overlay::search::scroll_for_match;
use crate::session::ReadMode;
use crate::synctex::{SynctexInfo, SYNCTEX_MARKER_DURATION};
use crate::tasks::TaskPurpose;

const TEXT_WIDTH_CLOSE_RATIO: f32 = 0.9;
const MAX_ZOOM_FLOOR: f32 = 10.0;

impl Viewer {
    fn vertical_step(&self) -> f32 {
        self.viewport.height * self.config.scroll_ratio
    }

    fn horizontal_step(&self) -> f32 {
        self.viewport.width * self.config.scroll_ratio
    }

    fn fit_width_scale(&self) -> f32 {
        if self.reference.width <= 0.0 {
            return self.state.scale;
        }
        self.viewport.width / self.reference.width
    }

    fn fit_height_scale(&self) -> f32 {
        if self.reference.height <= 0.0 {
            return self.state.scale;
        }
        self.viewport.height / self.reference.height
    }

    /// Largest horizontal offset in either direction; zero when the page fits.
    fn max_horizontal_offset(&self) -> f32 {
        ((self.reference.width * self.state.scale - self.viewport.width) / 2.0).max(0.0)
    }

    fn set_horizontal_offset(&mut self, offset: f32) {
        let max = self.max_horizontal_offset();
        self.state.horizontal_offset = offset.clamp(-max, max);
    }

    /// Changes the zoom keeping the same document point at the top of the viewport.
    /// The offset is not clamped here; the next paint does that.
    pub fn scale_to(&mut self, new_scale: f32) {
        if !(new_scale.is_finite() && new_scale > 0.0) {
            return;
        }
        let old_scale = self.state.scale;
        if (new_scale - old_scale).abs() < f32::EPSILON {
            return;
        }
        self.state.scroll_offset = new_scale / old_scale * self.state.scroll_offset;
        self.state.scale = new_scale;
        self.cache.invalidate_all();
        debug!(old_scale, new_scale, "scale changed");
    }

    pub(crate) fn update_scale(&mut self) {
        match self.state.read_mode {
            ReadMode::FitWidth => self.scale_to(self.fit_width_scale()),
            ReadMode::FitHeight => self.scale_to(self.fit_height_scale()),
            ReadMode::Presentation => {
                self.scale_to(self.fit_width_scale().min(self.fit_height_scale()))
            }
            ReadMode::FitCustomize => {}
        }
    }

    pub fn zoom_in(&mut self) {
        self.state.read_mode = ReadMode::FitCustomize;
        let ceiling = self.fit_width_scale().max(MAX_ZOOM_FLOOR);
        self.scale_to((self.state.scale + self.config.zoom_step).min(ceiling));
        self.update_page_index();
    }

    pub fn zoom_out(&mut self) {
        self.state.read_mode = ReadMode::FitCustomize;
        self.scale_to((self.state.scale - self.config.zoom_step).max(1.0));
        self.update_page_index();
    }

    pub fn zoom_reset(&mut self, read_mode: ReadMode) {
        if self.state.read_mode == ReadMode::Presentation && read_mode != ReadMode::Presentation {
            self.toggle_presentation_mode();
        }
        self.state.read_mode = read_mode;
        if read_mode == ReadMode::FitCustomize {
            self.scale_to(self.config.default_zoom);
        } else {
            self.update_scale();
        }
        self.state.horizontal_offset = 0.0;
        self.update_page_index();
    }

    /// Zooms so the text block of the current page fills `ratio` of the viewport width and
    /// centres it horizontally.
    pub fn zoom_to_text_width(&mut self, ratio: f32) {
        let page_index = self.state.current_page_index;
        let bounds = match self.document.backend().content_bounds(page_index) {
            Ok(Some(bounds)) if bounds.width() > 0.0 => bounds,
            Ok(_) => return,
            Err(err) => {
                tracing::warn!("failed to measure text of page {}: {err:#}", page_index);
                return;
            }
        };
        let origin = self
            .document
            .page(page_index)
            .map(|page| page.visible_rect().top_left())
            .unwrap_or_default();
        self.state.read_mode = ReadMode::FitCustomize;
        self.scale_to(self.viewport.width * ratio / bounds.width());
        let text_center = bounds.x0 - origin.x + bounds.width() / 2.0;
        self.set_horizontal_offset((self.reference.width / 2.0 - text_center) * self.state.scale);
        self.update_page_index();
    }

    pub fn zoom_fit_text_width(&mut self) {
        self.zoom_to_text_width(1.0);
    }

    pub fn zoom_close_to_text_width(&mut self) {
        self.zoom_to_text_width(TEXT_WIDTH_CLOSE_RATIO);
    }

    pub fn toggle_read_mode(&mut self) {
        match self.state.read_mode {
            ReadMode::FitCustomize | ReadMode::FitHeight => self.zoom_reset(ReadMode::FitWidth),
            ReadMode::FitWidth => self.toggle_presentation_mode(),
            ReadMode::Presentation => self.zoom_reset(ReadMode::FitWidth),
        }
    }

    pub fn toggle_presentation_mode(&mut self) {
        match self.presentation_backup.take() {
            None => {
                self.presentation_backup = Some(PresentationBackup {
                    scale: self.state.scale,
                    read_mode: self.state.read_mode,
                    scroll_offset: self.state.scroll_offset,
                    start_page_index: self.state.current_page_index,
                });
                self.state.start_page_index = self.state.current_page_index;
                self.state.read_mode = ReadMode::Presentation;
                self.update_scale();
                self.update_page_index();
                self.push_event(ViewerEvent::EnterFullscreen);
            }
            Some(backup) => {
                self.push_event(ViewerEvent::ExitFullscreen);
                self.state.scale = backup.scale;
                self.state.read_mode = backup.read_mode;
                self.cache.invalidate_all();
                let same_page = self.state.start_page_index == backup.start_page_index;
                self.state.scroll_offset = if same_page {
                    backup.scroll_offset
                } else {
                    self.page_top_offset(self.state.start_page_index)
                };
                if backup.read_mode == ReadMode::FitCustomize {
                    let ceiling = self.fit_width_scale().max(MAX_ZOOM_FLOOR);
                    self.scale_to(self.state.scale.min(ceiling));
                } else {
                    self.update_scale();
                }
                self.update_page_index();
            }
        }
    }

    pub fn is_presentation(&self) -> bool {
        self.state.read_mode == ReadMode::Presentation
    }

    fn flip_page(&mut self, forward: bool) {
        let last = self.page_count().saturating_sub(1);
        let index = self.state.start_page_index;
        self.state.start_page_index = if forward {
            (index + 1).min(last)
        } else {
            index.saturating_sub(1)
        };
        self.update_page_index();
    }

    pub fn scroll_down(&mut self) {
        if self.is_presentation() {
            return self.flip_page(true);
        }
        self.set_scroll_offset(self.state.scroll_offset + self.vertical_step());
    }

    pub fn scroll_up(&mut self) {
        if self.is_presentation() {
            return self.flip_page(false);
        }
        self.set_scroll_offset(self.state.scroll_offset - self.vertical_step());
    }

    pub fn scroll_down_page(&mut self) {
        if self.is_presentation() {
            return self.flip_page(true);
        }
        let step = self.viewport.height - self.vertical_step();
        self.set_scroll_offset(self.state.scroll_offset + step);
    }

    pub fn scroll_up_page(&mut self) {
        if self.is_presentation() {
            return self.flip_page(false);
        }
        let step = self.viewport.height - self.vertical_step();
        self.set_scroll_offset(self.state.scroll_offset - step);
    }

    pub fn scroll_to_begin(&mut self) {
        if self.is_presentation() {
            self.state.start_page_index = 0;
            return self.update_page_index();
        }
        self.set_scroll_offset(0.0);
    }

    pub fn scroll_to_end(&mut self) {
        if self.is_presentation() {
            self.state.start_page_index = self.page_count().saturating_sub(1);
            return self.update_page_index();
        }
        self.set_scroll_offset(self.max_scroll_offset());
    }

    /// Moves the view to the right, which shifts the page left.
    pub fn scroll_right(&mut self) {
        self.set_horizontal_offset(self.state.horizontal_offset - self.horizontal_step());
    }

    pub fn scroll_left(&mut self) {
        self.set_horizontal_offset(self.state.horizontal_offset + self.horizontal_step());
    }

    pub fn scroll_center_horizontal(&mut self) {
        self.state.horizontal_offset = 0.0;
    }

    pub fn pan(&mut self, delta_x: f32, delta_y: f32) {
        if delta_x != 0.0 {
            self.set_horizontal_offset(self.state.horizontal_offset + delta_x);
        }
        if delta_y != 0.0 && !self.is_presentation() {
            self.set_scroll_offset(self.state.scroll_offset + delta_y);
        }
    }

    pub fn next_page(&mut self) {
        if self.is_presentation() {
            return self.flip_page(true);
        }
        self.jump_to_page(self.state.current_page_index + 2);
    }

    pub fn prev_page(&mut self) {
        if self.is_presentation() {
            return self.flip_page(false);
        }
        self.jump_to_page(self.state.current_page_index);
    }

    /// `page` is 1-based and clamped to the document.
    pub fn jump_to_page(&mut self, page: usize) {
        let count = self.page_count();
        if count == 0 {
            return;
        }
        let index = page.clamp(1, count) - 1;
        if self.is_presentation() {
            self.state.start_page_index = index;
            return self.update_page_index();
        }
        self.set_scroll_offset(self.page_top_offset(index));
    }

    pub fn jump_to_percent(&mut self, percent: f32) {
        if !percent.is_finite() {
            return;
        }
        let total = self
            .layout
            .total_height_px(self.state.scale, self.padding());
        self.set_scroll_offset(total * percent.clamp(0.0, 100.0) / 100.0);
    }

    /// Screen-independent offset of a page-space rect's top edge.
    pub(crate) fn offset_of_rect(&mut self, page_index: usize, rect: Rect) -> Result<f32> {
        let rotation = self.effective_rotation();
        let transform = self.document.page(page_index)?.transform(rotation, self.state.scale);
        Ok(self.page_top_offset(page_index) + transform.rect_to_display(rect).y0)
    }

    /// Scrolls so `rect` on `page_index` is inside the comfortable band of the viewport.
    pub fn reveal_rect(&mut self, page_index: usize, rect: Rect) -> Result<()> {
        if self.is_presentation() {
            self.state.start_page_index = page_index;
            self.update_page_index();
            return Ok(());
        }
        let target = self.offset_of_rect(page_index, rect)?;
        let offset = scroll_for_match(target, self.state.scroll_offset, self.viewport.height);
        if let Some(offset) = offset {
            self.set_scroll_offset(offset);
        }
        Ok(())
    }

    pub fn save_current_position(&mut self) {
        self.saved.save(self.state.scroll_offset);
        self.notify("Saved current position.");
    }

    pub fn jump_to_saved_position(&mut self) {
        match self.saved.swap(self.state.scroll_offset) {
            Some(offset) => self.set_scroll_offset(offset),
            None => self.notify("Cannot jump from this position."),
        }
    }

    pub fn jump_to_previous_saved_position(&mut self) {
        match self.saved.previous(self.state.scroll_offset) {
            Some(offset) => self.set_scroll_offset(offset),
            None => self.notify("Cannot jump from this position."),
        }
    }

    pub fn jump_to_next_saved_position(&mut self) {
        match self.saved.next() {
            Some(offset) => self.set_scroll_offset(offset),
            None => self.notify("Cannot jump from this position."),
        }
    }

    fn require_pdf(&self) -> bool {
        if !self.is_pdf() {
            self.notify("Only support PDF!");
        }
        self.is_pdf()
    }

    pub fn rotate_clockwise(&mut self) -> Result<()> {
        let rotation = self.state.rotation.clockwise();
        self.set_rotation(rotation)
    }

    pub fn rotate_counterclockwise(&mut self) -> Result<()> {
        let rotation = self.state.rotation.counterclockwise();
        self.set_rotation(rotation)
    }

    fn set_rotation(&mut self, rotation: crate::geometry::Rotation) -> Result<()> {
        if !self.require_pdf() {
            return Ok(());
        }
        let current = self.state.current_page_index;
        self.state.rotation = rotation;
        self.relayout_around(current)
    }

    pub fn toggle_trim_white_margin(&mut self) -> Result<()> {
        if !self.require_pdf() {
            return Ok(());
        }
        let current = self.state.current_page_index;
        let enabled = !self.document.trim_margin();
        self.document.set_trim_margin(enabled);
        if enabled {
            // seed the clip so the first relayout already uses it
            self.document.page(current)?;
            self.document.take_clip_changed();
        }
        self.relayout_around(current)
    }

    fn relayout_around(&mut self, page_index: usize) -> Result<()> {
        self.cache.invalidate_all();
        self.rebuild_layout()?;
        self.update_scale();
        self.jump_to_page(page_index + 1);
        self.update_page_index();
        Ok(())
    }

    pub fn toggle_inverted_mode(&mut self) {
        self.inverted = !self.inverted;
        self.cache.invalidate_all();
    }

    pub fn toggle_inverted_image_mode(&mut self) {
        if !self.require_pdf() {
            return;
        }
        self.inverted_images = !self.inverted_images;
        if self.inverted {
            self.cache.invalidate_all();
        }
    }

    pub fn toggle_mark_link(&mut self) {
        if !self.require_pdf() {
            return;
        }
        self.mark_links = !self.mark_links;
        self.cache.invalidate_all();
    }

    pub fn is_marking_links(&self) -> bool {
        self.mark_links
    }

    /// Forward search: brings the position into view and shows a marker for a few seconds.
    pub fn jump_to_synctex(&mut self, info: SynctexInfo, now: Instant) -> Result<()> {
        let count = self.page_count();
        if info.page_index() >= count {
            return Err(crate::error::ViewerError::PageOutOfRange {
                index: info.page_index(),
                count,
            }
            .into());
        }
        self.jump_to_page(info.page);
        let point = Rect::new(info.x, info.y, info.x, info.y);
        self.reveal_rect(info.page_index(), point)?;
        self.synctex = Some(info);
        self.tasks
            .schedule(TaskPurpose::ClearSynctexMarker, SYNCTEX_MARKER_DURATION, now);
        Ok(())
    }

    /// Start position from the command line. A synctex target outside the document is
    /// reported and skipped so the document still opens.
    pub fn jump_to_launch_target(
        &mut self,
        page: Option<usize>,
        synctex: Option<SynctexInfo>,
        now: Instant,
    ) {
        if let Some(page) = page {
            self.jump_to_page(page);
        }
        if let Some(info) = synctex {
            if let Err(err) = self.jump_to_synctex(info, now) {
                warn!(?info, "ignoring synctex target: {err:#}");
                self.notify(format!("Cannot jump to synctex target: {err}"));
            }
        }
    }

    pub fn synctex_target(&self) -> Option<SynctexInfo> {
        self.synctex
    }
}
