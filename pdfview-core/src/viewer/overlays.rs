use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, warn};

use super::{PromptTag, Viewer, ViewerEvent};
use crate::backend::{
    Annotation, AnnotationColors, AnnotationEdit, AnnotationKind, CharGlyph, LinkAction,
    NewAnnotation,
};
use crate::geometry::{Point, Quad, Rect};
use crate::overlay::annot::{inline_text_rect, moved_rect, AnnotTarget, CAPTURE_DELAY};
use crate::overlay::links::JumpLabels;
use crate::overlay::search::{search_delay, SearchMatch, SearchState};
use crate::overlay::selection::{
    char_index_at, line_rects, selected_text, word_at, CharPos, CHAR_HIT_SIZE,
};
use crate::overlay::{CaptureStage, InteractionMode};
use crate::tasks::TaskPurpose;
use crate::undo::{AnnotAction, AnnotActionKind};

/// Hover feedback is held back this long after a wheel scroll.
pub(super) const HOVER_SUPPRESSION: Duration = Duration::from_millis(500);
const TEXT_ANNOT_SIZE: f32 = 20.0;

impl Viewer {
    /// Leaves the current exclusive mode and clears whatever state it owned.
    pub(crate) fn leave_mode(&mut self) {
        match self.mode {
            InteractionMode::Idle => {}
            InteractionMode::Selecting => self.selection.clear(),
            InteractionMode::JumpLinking => {
                self.jump_labels.clear();
                self.cache.invalidate_all();
            }
            InteractionMode::Searching => {
                self.pending_search = None;
                self.tasks.cancel(TaskPurpose::SearchAsYouType);
            }
            InteractionMode::AnnotatingPopup(_)
            | InteractionMode::AnnotatingInline(_)
            | InteractionMode::MovingAnnotation(_) => {
                self.tasks.cancel(TaskPurpose::AnnotationCapture);
                self.moving_annot = None;
            }
        }
        debug!(mode = self.mode.name(), "left mode");
        self.mode = InteractionMode::Idle;
    }

    fn enter_mode(&mut self, mode: InteractionMode) {
        self.leave_mode();
        self.mode = mode;
        debug!(mode = mode.name(), "entered mode");
    }

    pub fn cancel_mode(&mut self) {
        if self.mode == InteractionMode::Searching || self.search.is_some() {
            self.cleanup_search();
        }
        self.leave_mode();
        self.selection.clear();
    }

    fn require_annotation_editing(&self) -> bool {
        let supported = self.document.backend().supports_annotation_editing();
        if !supported {
            self.notify("Annotation editing is not supported for this document.");
        }
        supported
    }

    // jump to link

    pub fn begin_jump_to_link(&mut self) {
        if !self.is_pdf() {
            self.notify("Only support PDF!");
            return;
        }
        self.enter_mode(InteractionMode::JumpLinking);
        self.jump_labels =
            JumpLabels::new(&self.config.marker_letters, self.config.marker_font_size);
        self.cache.invalidate_all();
        self.prompt("Jump to Link: ", PromptTag::JumpToLink, "");
    }

    pub(super) fn confirm_jump_to_link(&mut self, input: &str) {
        let target = self.jump_labels.resolve(input).cloned();
        self.leave_mode();
        match target {
            Some((_, link)) => self.follow_link(&link.action, false),
            None => {
                let err = crate::error::ViewerError::UnknownJumpLabel(input.trim().to_string());
                self.notify(err.to_string());
            }
        }
    }

    /// Internal links remember the current position before jumping.
    pub fn follow_link(&mut self, action: &LinkAction, external: bool) {
        match action {
            LinkAction::GoTo { page } => {
                self.saved.save(self.state.scroll_offset);
                self.jump_to_page(page + 1);
                self.notify(format!("Landed on Page {}", page + 1));
            }
            LinkAction::Uri { uri } => self.push_event(ViewerEvent::OpenUrl {
                url: uri.clone(),
                external,
            }),
        }
    }

    // search

    pub fn begin_search(&mut self) {
        let initial = self
            .search
            .as_ref()
            .map(|search| search.term().to_string())
            .unwrap_or_default();
        self.enter_mode(InteractionMode::Searching);
        self.prompt("Search Text: ", PromptTag::SearchText, &initial);
    }

    /// Debounced search while the prompt is being typed into.
    pub fn search_text_changed(&mut self, term: &str, now: Instant) {
        if self.mode != InteractionMode::Searching {
            return;
        }
        let delay = search_delay(self.page_count(), term);
        self.pending_search = Some(term.to_string());
        self.tasks.schedule(TaskPurpose::SearchAsYouType, delay, now);
    }

    pub fn search_text(&mut self, term: &str) {
        self.run_search(term);
        if self.mode == InteractionMode::Searching {
            self.mode = InteractionMode::Idle;
        }
    }

    pub(super) fn run_search(&mut self, term: &str) {
        self.pending_search = None;
        self.tasks.cancel(TaskPurpose::SearchAsYouType);
        if term.trim().is_empty() {
            self.search = None;
            self.cache.invalidate_all();
            return;
        }

        let backend = Arc::clone(self.document.backend());
        let mut matches = Vec::new();
        for page_index in 0..self.page_count() {
            match backend.search_page(page_index, term) {
                Ok(quads) => matches.extend(
                    quads
                        .into_iter()
                        .map(|quad| SearchMatch { page_index, quad }),
                ),
                Err(err) => warn!("search failed on page {}: {err:#}", page_index),
            }
        }
        debug!(term, hits = matches.len(), "search finished");

        self.cache.invalidate_all();
        self.search = SearchState::new(term, matches, self.state.current_page_index);
        match self.search.as_ref().map(SearchState::progress_label) {
            Some(label) => {
                self.reveal_current_match();
                self.notify(label);
            }
            None => self.notify(format!("No results found with \"{}\".", term)),
        }
    }

    fn reveal_current_match(&mut self) {
        let Some(hit) = self.search.as_ref().map(|search| *search.current()) else {
            return;
        };
        if let Err(err) = self.reveal_rect(hit.page_index, hit.quad.bounds()) {
            warn!("failed to scroll to search match: {err:#}");
        }
    }

    pub fn search_next(&mut self) {
        self.step_search(true);
    }

    pub fn search_previous(&mut self) {
        self.step_search(false);
    }

    fn step_search(&mut self, forward: bool) {
        if let Some(term) = self.pending_search.clone() {
            self.run_search(&term);
            return;
        }
        let Some(search) = self.search.as_mut() else {
            self.notify("No active search.");
            return;
        };
        if forward {
            search.next();
        } else {
            search.previous();
        }
        let label = search.progress_label();
        self.cache.invalidate_all();
        self.reveal_current_match();
        self.notify(label);
    }

    pub fn cleanup_search(&mut self) {
        self.search = None;
        self.pending_search = None;
        self.tasks.cancel(TaskPurpose::SearchAsYouType);
        if self.mode == InteractionMode::Searching {
            self.mode = InteractionMode::Idle;
        }
        self.cache.invalidate_all();
    }

    // selection

    fn char_hit(&mut self, position: Point) -> Option<CharPos> {
        let (page_index, point) = self.cursor_to_page(position)?;
        let chars = self.document.chars(page_index);
        char_index_at(chars, point, CHAR_HIT_SIZE).map(|index| CharPos::new(page_index, index))
    }

    pub(super) fn selection_pointer_down(&mut self, position: Point) {
        if self.mode == InteractionMode::Selecting {
            self.leave_mode();
        }
        self.selection.clear();
        if !self.mode.allows_selection() {
            return;
        }
        if let Some(hit) = self.char_hit(position) {
            self.selection.begin(hit);
        }
    }

    pub(super) fn selection_drag(&mut self, position: Point) {
        if !self.mode.allows_selection() {
            return;
        }
        let Some(hit) = self.char_hit(position) else {
            return;
        };
        self.selection.extend(hit);
        if self.selection.is_active() && self.mode != InteractionMode::Selecting {
            let kept = std::mem::take(&mut self.selection);
            self.enter_mode(InteractionMode::Selecting);
            self.selection = kept;
        }
    }

    fn selected_pieces(&mut self) -> Vec<(usize, Vec<CharGlyph>)> {
        let Some(pages) = self.selection.pages() else {
            return Vec::new();
        };
        let mut pieces = Vec::new();
        for page_index in pages {
            let chars = self.document.chars(page_index);
            if let Some(span) = self.selection.span_on(page_index, chars.len()) {
                pieces.push((page_index, chars[span].to_vec()));
            }
        }
        pieces
    }

    pub fn selected_text(&mut self) -> Option<String> {
        let pieces = self.selected_pieces();
        if pieces.is_empty() {
            return None;
        }
        let text = selected_text(pieces.iter().map(|(_, chars)| chars.as_slice()));
        (!text.is_empty()).then_some(text)
    }

    fn cleanup_selection(&mut self) {
        self.selection.clear();
        if self.mode == InteractionMode::Selecting {
            self.mode = InteractionMode::Idle;
        }
    }

    pub fn copy_selection(&mut self) {
        match self.selected_text() {
            Some(text) => {
                self.push_event(ViewerEvent::CopyToClipboard(text));
                self.notify("Copy selected text.");
                self.cleanup_selection();
            }
            None => self.notify("No text selected."),
        }
    }

    pub(super) fn translate_word_at(&mut self, position: Point) {
        let Some((page_index, point)) = self.cursor_to_page(position) else {
            return;
        };
        if let Some((word, _)) = word_at(self.document.chars(page_index), point) {
            self.push_event(ViewerEvent::TranslateWord(word));
        }
    }

    pub(super) fn synctex_backward_edit(&mut self, position: Point) {
        let Some((page_index, point)) = self.cursor_to_page(position) else {
            return;
        };
        self.push_event(ViewerEvent::SynctexBackwardEdit {
            path: self.document.info().path.clone(),
            page: page_index + 1,
            x: point.x,
            y: point.y,
        });
    }

    // annotations

    fn markup_color(&self, kind: AnnotationKind) -> crate::backend::Color {
        match kind {
            AnnotationKind::Underline => self.config.underline_color,
            AnnotationKind::StrikeOut => self.config.strikeout_color,
            AnnotationKind::Squiggly => self.config.squiggly_color,
            _ => self.config.highlight_color,
        }
    }

    fn persist_annotations(&mut self) {
        if let Err(err) = self.document.backend().save() {
            warn!("failed to save annotations: {err:#}");
            self.notify("Failed to save annotations!");
        }
        self.document.invalidate_annotations();
        self.cache.invalidate_all();
    }

    fn create_annotation(&mut self, page_index: usize, new: NewAnnotation) -> Option<Annotation> {
        let backend = Arc::clone(self.document.backend());
        match backend.add_annotation(page_index, &new) {
            Ok(id) => Some(Annotation {
                id,
                kind: new.kind,
                rect: new.rect,
                quads: new.quads,
                colors: new.colors,
                title: new.title,
                content: new.content,
            }),
            Err(err) => {
                warn!("failed to add annotation on page {}: {err:#}", page_index);
                self.notify(format!("Failed to add annotation: {err}"));
                None
            }
        }
    }

    pub fn annotate_selection(&mut self, kind: AnnotationKind) {
        if !kind.is_markup() || !self.require_annotation_editing() {
            return;
        }
        let pieces = self.selected_pieces();
        if pieces.is_empty() {
            self.notify("No text selected.");
            return;
        }
        let color = self.markup_color(kind);
        let mut changed = false;
        for (page_index, chars) in pieces {
            let rects = line_rects(&chars);
            let Some(rect) = rects.iter().copied().reduce(|a, b| a.union(&b)) else {
                continue;
            };
            let new = NewAnnotation {
                id: None,
                kind,
                rect,
                quads: rects.into_iter().map(Quad::from_rect).collect(),
                colors: AnnotationColors {
                    stroke: Some(color),
                    fill: None,
                },
                title: self.config.annot_author.clone(),
                content: String::new(),
                font_size: None,
            };
            if let Some(annotation) = self.create_annotation(page_index, new) {
                self.undo.record(AnnotAction::added(page_index, annotation));
                changed = true;
            }
        }
        self.cleanup_selection();
        if changed {
            self.persist_annotations();
        }
    }

    pub fn enable_popup_text_annot_mode(&mut self) {
        if self.require_annotation_editing() {
            self.enter_mode(InteractionMode::AnnotatingPopup(CaptureStage::Armed));
        }
    }

    pub fn enable_inline_text_annot_mode(&mut self) {
        if self.require_annotation_editing() {
            self.enter_mode(InteractionMode::AnnotatingInline(CaptureStage::Armed));
        }
    }

    pub fn move_hovered_annot(&mut self) {
        if !self.require_annotation_editing() {
            return;
        }
        match self.hovered_annot.clone() {
            Some(target) if target.annotation.kind.is_text() => {
                self.enter_mode(InteractionMode::MovingAnnotation(CaptureStage::Armed));
                self.moving_annot = Some(target);
            }
            _ => self.notify("Only text annotations can be moved."),
        }
    }

    /// Primary release while a capture mode is armed starts the capture timer.
    pub(super) fn arm_annotation_capture(&mut self, now: Instant) {
        if let Some(CaptureStage::Armed) = self.mode.capture_stage() {
            self.mode = self.mode.with_stage(CaptureStage::Settling);
            self.tasks
                .schedule(TaskPurpose::AnnotationCapture, CAPTURE_DELAY, now);
        }
    }

    pub(super) fn fire_annotation_capture(&mut self) {
        if self.mode.capture_stage() != Some(CaptureStage::Settling) {
            return;
        }
        let Some((page_index, point)) = self.pointer.and_then(|p| self.cursor_to_page(p)) else {
            self.mode = self.mode.with_stage(CaptureStage::Armed);
            return;
        };
        match self.mode {
            InteractionMode::AnnotatingPopup(_) => {
                self.mode = self
                    .mode
                    .with_stage(CaptureStage::AwaitingInput { page_index, point });
                self.prompt("Popup text: ", PromptTag::PopupTextAnnot, "");
            }
            InteractionMode::AnnotatingInline(_) => {
                self.mode = self
                    .mode
                    .with_stage(CaptureStage::AwaitingInput { page_index, point });
                self.prompt("Inline text: ", PromptTag::InlineTextAnnot, "");
            }
            InteractionMode::MovingAnnotation(_) => {
                if let Some(target) = self.moving_annot.take() {
                    self.move_annotation(&target, point);
                }
                self.leave_mode();
            }
            _ => {}
        }
    }

    fn move_annotation(&mut self, target: &AnnotTarget, to: Point) {
        let edit = AnnotationEdit {
            content: None,
            rect: Some(moved_rect(target.annotation.rect, to)),
        };
        let backend = Arc::clone(self.document.backend());
        match backend.update_annotation(target.page_index, &target.annotation.id, &edit) {
            Ok(true) => {
                self.hovered_annot = None;
                self.persist_annotations();
            }
            Ok(false) => debug!(id = %target.annotation.id, "annotation to move is gone"),
            Err(err) => {
                warn!("failed to move annotation: {err:#}");
                self.notify(format!("Failed to move annotation: {err}"));
            }
        }
    }

    pub(super) fn place_text_annotation(&mut self, content: &str) {
        let Some(CaptureStage::AwaitingInput { page_index, point }) = self.mode.capture_stage()
        else {
            return;
        };
        let inline = matches!(self.mode, InteractionMode::AnnotatingInline(_));
        self.leave_mode();
        if content.is_empty() {
            return;
        }
        let new = if inline {
            NewAnnotation {
                id: None,
                kind: AnnotationKind::FreeText,
                rect: inline_text_rect(point, self.config.inline_text_font_size, content),
                quads: Vec::new(),
                colors: AnnotationColors {
                    stroke: Some(self.config.inline_text_color),
                    fill: None,
                },
                title: self.config.annot_author.clone(),
                content: content.to_string(),
                font_size: Some(self.config.inline_text_font_size),
            }
        } else {
            NewAnnotation {
                id: None,
                kind: AnnotationKind::Text,
                rect: Rect::from_point_size(point, TEXT_ANNOT_SIZE, TEXT_ANNOT_SIZE),
                quads: Vec::new(),
                colors: AnnotationColors {
                    stroke: Some(self.config.text_annot_color),
                    fill: None,
                },
                title: self.config.annot_author.clone(),
                content: content.to_string(),
                font_size: None,
            }
        };
        if let Some(annotation) = self.create_annotation(page_index, new) {
            self.undo.record(AnnotAction::added(page_index, annotation));
            self.persist_annotations();
        }
    }

    pub fn edit_hovered_annot(&mut self) {
        if !self.require_annotation_editing() {
            return;
        }
        match self.hovered_annot.clone() {
            Some(target) if target.annotation.kind.is_text() => {
                let initial = target.annotation.content.clone();
                self.editing_annot = Some(target);
                self.prompt("Edit annot: ", PromptTag::EditAnnotText, &initial);
            }
            _ => self.notify("No text annotation under the cursor."),
        }
    }

    pub(super) fn apply_annotation_edit(&mut self, content: &str) {
        let Some(target) = self.editing_annot.take() else {
            return;
        };
        let rect = (target.annotation.kind == AnnotationKind::FreeText).then(|| {
            inline_text_rect(
                target.annotation.rect.top_left(),
                self.config.inline_text_font_size,
                content,
            )
        });
        let edit = AnnotationEdit {
            content: Some(content.to_string()),
            rect,
        };
        let backend = Arc::clone(self.document.backend());
        match backend.update_annotation(target.page_index, &target.annotation.id, &edit) {
            Ok(true) => {
                self.hovered_annot = None;
                self.persist_annotations();
                self.notify("Updated annot!");
            }
            Ok(false) => self.notify("Annotation no longer exists."),
            Err(err) => {
                warn!("failed to edit annotation: {err:#}");
                self.notify(format!("Failed to edit annotation: {err}"));
            }
        }
    }

    pub fn delete_hovered_annot(&mut self) {
        if !self.require_annotation_editing() {
            return;
        }
        let Some(target) = self.hovered_annot.take() else {
            self.notify("No annotation under the cursor.");
            return;
        };
        let backend = Arc::clone(self.document.backend());
        match backend.delete_annotation(target.page_index, &target.annotation.id) {
            Ok(true) => {
                self.undo
                    .record(AnnotAction::deleted(target.page_index, target.annotation));
                self.persist_annotations();
            }
            Ok(false) => debug!(id = %target.annotation.id, "annotation to delete is gone"),
            Err(err) => {
                warn!("failed to delete annotation: {err:#}");
                self.notify(format!("Failed to delete annotation: {err}"));
            }
        }
    }

    fn replay(&mut self, action: &AnnotAction, inverse: bool) -> Result<()> {
        let backend = Arc::clone(self.document.backend());
        let add = matches!(
            (action.kind, inverse),
            (AnnotActionKind::Add, false) | (AnnotActionKind::Delete, true)
        );
        if add {
            let id = backend
                .add_annotation(action.page_index, &NewAnnotation::from(&action.annotation))?;
            if id != action.annotation.id {
                debug!(old = %action.annotation.id, new = %id, "annotation re-created");
                self.undo
                    .rename_annotation(action.page_index, &action.annotation.id, &id);
            }
        } else if !backend.delete_annotation(action.page_index, &action.annotation.id)? {
            debug!(id = %action.annotation.id, "annotation already gone");
        }
        self.hovered_annot = None;
        self.persist_annotations();
        Ok(())
    }

    pub fn undo_annot_action(&mut self) {
        let action = match self.undo.peek_undo() {
            Ok(action) => action.clone(),
            Err(err) => return self.notify(err.to_string()),
        };
        self.jump_to_page(action.page_index + 1);
        match self.replay(&action, true) {
            Ok(()) => {
                self.undo.step_back();
                self.notify("Undo last action!");
            }
            Err(err) => {
                warn!("failed to undo annotation action: {err:#}");
                self.notify(format!("Failed to undo: {err}"));
            }
        }
    }

    pub fn redo_annot_action(&mut self) {
        let action = match self.undo.peek_redo() {
            Ok(action) => action.clone(),
            Err(err) => return self.notify(err.to_string()),
        };
        match self.replay(&action, false) {
            Ok(()) => {
                self.undo.step_forward();
                self.jump_to_page(action.page_index + 1);
                self.notify("Redo last action!");
            }
            Err(err) => {
                warn!("failed to redo annotation action: {err:#}");
                self.notify(format!("Failed to redo: {err}"));
            }
        }
    }

    // hover

    pub(super) fn update_hover(&mut self, position: Point, now: Instant) {
        if self.dragging || matches!(self.mode, InteractionMode::MovingAnnotation(_)) {
            return;
        }
        if self
            .last_wheel
            .is_some_and(|wheel| now.saturating_duration_since(wheel) < HOVER_SUPPRESSION)
        {
            return;
        }
        let hit = self.cursor_to_page(position);

        let link = hit.and_then(|(page_index, point)| self.document.link_at(page_index, point));
        if link != self.hovered_link {
            let tooltip = link.as_ref().map(|link| match &link.action {
                LinkAction::GoTo { page } => format!("Link to page: {}", page + 1),
                LinkAction::Uri { uri } => format!("Link to uri: {}", uri),
            });
            self.hovered_link = link;
            self.push_event(ViewerEvent::Tooltip(tooltip));
        }

        if !self.is_pdf() {
            return;
        }
        let annot = hit.and_then(|(page_index, point)| {
            self.document
                .annotation_at(page_index, point)
                .map(|annotation| AnnotTarget {
                    page_index,
                    annotation,
                })
        });
        if annot != self.hovered_annot {
            let touched: Vec<usize> = self
                .hovered_annot
                .iter()
                .chain(annot.iter())
                .map(|target| target.page_index)
                .collect();
            for page_index in touched {
                self.cache.invalidate_page(page_index);
            }
            if let Some(content) = annot
                .as_ref()
                .map(|target| target.annotation.content.clone())
                .filter(|content| !content.is_empty())
            {
                self.push_event(ViewerEvent::Tooltip(Some(content)));
            }
            self.hovered_annot = annot;
            self.push_event(ViewerEvent::RedrawNeeded);
        }
    }
}
