use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::debug;

use super::{Command, PromptTag, Viewer};
use crate::geometry::Point;
use crate::overlay::InteractionMode;

/// Minimum gap between two wheel-driven page flips in presentation mode.
const PAGE_FLIP_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Primary,
    Secondary,
    Middle,
    Back,
    Forward,
}

/// Pointer input in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Press {
        button: MouseButton,
        position: Point,
        ctrl: bool,
    },
    Release {
        button: MouseButton,
        position: Point,
    },
    Move {
        position: Point,
    },
    DoubleClick {
        button: MouseButton,
        position: Point,
    },
    /// Wheel notches; positive `delta_y` scrolls towards the start of the document.
    Wheel {
        delta_x: f32,
        delta_y: f32,
    },
}

impl Viewer {
    pub fn handle_pointer(&mut self, event: PointerEvent, now: Instant) {
        match event {
            PointerEvent::Press {
                button,
                position,
                ctrl,
            } => self.pointer_pressed(button, position, ctrl),
            PointerEvent::Release { button, position } => {
                self.pointer = Some(position);
                if button == MouseButton::Primary {
                    self.dragging = false;
                    self.arm_annotation_capture(now);
                }
            }
            PointerEvent::Move { position } => {
                self.pointer = Some(position);
                if self.dragging {
                    self.selection_drag(position);
                } else {
                    self.update_hover(position, now);
                }
            }
            PointerEvent::DoubleClick { button, position } => {
                self.pointer = Some(position);
                if matches!(
                    self.mode,
                    InteractionMode::AnnotatingPopup(_) | InteractionMode::AnnotatingInline(_)
                ) {
                    self.leave_mode();
                    return;
                }
                match button {
                    MouseButton::Primary if self.is_pdf() => self.synctex_backward_edit(position),
                    MouseButton::Secondary => self.translate_word_at(position),
                    _ => {}
                }
            }
            PointerEvent::Wheel { delta_x, delta_y } => self.wheel(delta_x, delta_y, now),
        }
    }

    fn pointer_pressed(&mut self, button: MouseButton, position: Point, ctrl: bool) {
        self.pointer = Some(position);
        if self.mode.is_annotating() {
            if button != MouseButton::Primary {
                self.leave_mode();
            }
            return;
        }
        match button {
            MouseButton::Primary => {
                if let Some(link) = self.hovered_link.clone() {
                    self.follow_link(&link.action, ctrl);
                    return;
                }
                self.dragging = true;
                self.selection_pointer_down(position);
            }
            MouseButton::Secondary => {
                if let Some(link) = self.hovered_link.clone() {
                    self.follow_link(&link.action, true);
                }
            }
            MouseButton::Back => self.jump_to_previous_saved_position(),
            MouseButton::Forward => self.jump_to_next_saved_position(),
            MouseButton::Middle => {}
        }
    }

    fn wheel(&mut self, delta_x: f32, delta_y: f32, now: Instant) {
        self.last_wheel = Some(now);
        if self.is_presentation() {
            let throttled = self
                .last_page_flip
                .is_some_and(|flip| now.saturating_duration_since(flip) < PAGE_FLIP_INTERVAL);
            if delta_y == 0.0 || throttled {
                return;
            }
            self.last_page_flip = Some(now);
            if delta_y > 0.0 {
                self.prev_page();
            } else {
                self.next_page();
            }
            return;
        }
        let step = self.viewport.height * self.config.scroll_ratio;
        self.pan(delta_x * step, -delta_y * step);
    }

    /// The host's answer to a [`ViewerEvent::PromptInput`](super::ViewerEvent::PromptInput).
    pub fn handle_input_response(&mut self, tag: PromptTag, content: &str) {
        debug!(?tag, "prompt answered");
        match tag {
            PromptTag::JumpToPage => match content.trim().parse::<usize>() {
                Ok(page) => self.jump_to_page(page),
                Err(_) => self.notify(format!("Invalid page number: {}", content.trim())),
            },
            PromptTag::JumpToPercent => match content.trim().trim_end_matches('%').parse::<f32>() {
                Ok(percent) => self.jump_to_percent(percent),
                Err(_) => self.notify(format!("Invalid percent: {}", content.trim())),
            },
            PromptTag::JumpToLink => self.confirm_jump_to_link(content),
            PromptTag::SearchText => self.search_text(content),
            PromptTag::PopupTextAnnot | PromptTag::InlineTextAnnot => {
                self.place_text_annotation(content)
            }
            PromptTag::EditAnnotText => self.apply_annotation_edit(content),
        }
    }

    pub fn handle_input_cancelled(&mut self, tag: PromptTag) {
        debug!(?tag, "prompt cancelled");
        match tag {
            PromptTag::JumpToLink => {
                if self.mode == InteractionMode::JumpLinking {
                    self.leave_mode();
                }
            }
            PromptTag::SearchText => self.cleanup_search(),
            PromptTag::PopupTextAnnot | PromptTag::InlineTextAnnot => {
                if self.mode.is_annotating() {
                    self.leave_mode();
                }
            }
            PromptTag::EditAnnotText => self.editing_annot = None,
            PromptTag::JumpToPage | PromptTag::JumpToPercent => {}
        }
    }

    pub fn handle_input_changed(&mut self, tag: PromptTag, content: &str, now: Instant) {
        if tag == PromptTag::SearchText {
            self.search_text_changed(content, now);
        }
    }

    pub fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::ScrollUp => self.scroll_up(),
            Command::ScrollDown => self.scroll_down(),
            Command::ScrollUpPage => self.scroll_up_page(),
            Command::ScrollDownPage => self.scroll_down_page(),
            Command::ScrollLeft => self.scroll_left(),
            Command::ScrollRight => self.scroll_right(),
            Command::ScrollCenterHorizontal => self.scroll_center_horizontal(),
            Command::ScrollToBegin => self.scroll_to_begin(),
            Command::ScrollToEnd => self.scroll_to_end(),
            Command::Pan { delta_x, delta_y } => self.pan(delta_x, delta_y),
            Command::NextPage => self.next_page(),
            Command::PrevPage => self.prev_page(),
            Command::JumpToPage { page } => self.jump_to_page(page),
            Command::JumpToPercent { percent } => self.jump_to_percent(percent),
            Command::PromptJumpToPage => self.prompt("Jump to Page: ", PromptTag::JumpToPage, ""),
            Command::PromptJumpToPercent => {
                self.prompt("Jump to Percent: ", PromptTag::JumpToPercent, "")
            }
            Command::ZoomIn => self.zoom_in(),
            Command::ZoomOut => self.zoom_out(),
            Command::ZoomFitTextWidth => self.zoom_fit_text_width(),
            Command::ZoomCloseToTextWidth => self.zoom_close_to_text_width(),
            Command::ZoomReset { mode } => self.zoom_reset(mode),
            Command::ToggleReadMode => self.toggle_read_mode(),
            Command::TogglePresentationMode => self.toggle_presentation_mode(),
            Command::RotateClockwise => self.rotate_clockwise()?,
            Command::RotateCounterclockwise => self.rotate_counterclockwise()?,
            Command::ToggleTrimWhiteMargin => self.toggle_trim_white_margin()?,
            Command::ToggleInvertedMode => self.toggle_inverted_mode(),
            Command::ToggleInvertedImageMode => self.toggle_inverted_image_mode(),
            Command::ToggleMarkLink => self.toggle_mark_link(),
            Command::SaveCurrentPosition => self.save_current_position(),
            Command::JumpToSavedPosition => self.jump_to_saved_position(),
            Command::JumpToPreviousSavedPosition => self.jump_to_previous_saved_position(),
            Command::JumpToNextSavedPosition => self.jump_to_next_saved_position(),
            Command::JumpToLink => self.begin_jump_to_link(),
            Command::Search => self.begin_search(),
            Command::SearchNext => self.search_next(),
            Command::SearchPrevious => self.search_previous(),
            Command::CleanupSearch => self.cleanup_search(),
            Command::CopySelection => self.copy_selection(),
            Command::AnnotateSelection { kind } => self.annotate_selection(kind),
            Command::AddPopupTextAnnot => self.enable_popup_text_annot_mode(),
            Command::AddInlineTextAnnot => self.enable_inline_text_annot_mode(),
            Command::EditHoveredAnnot => self.edit_hovered_annot(),
            Command::MoveHoveredAnnot => self.move_hovered_annot(),
            Command::DeleteHoveredAnnot => self.delete_hovered_annot(),
            Command::Undo => self.undo_annot_action(),
            Command::Redo => self.redo_annot_action(),
            Command::CancelMode => self.cancel_mode(),
        }
        Ok(())
    }
}
