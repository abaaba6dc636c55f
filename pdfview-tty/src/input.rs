use std::time::{Duration, Instant};

use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton as TermButton, MouseEvent,
    MouseEventKind,
};
use pdfview_core::{AnnotationKind, Command, MouseButton, Point, PointerEvent, PromptTag, ReadMode};

/// Two primary presses on the same cell within this window count as a double click.
const DOUBLE_CLICK_INTERVAL: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(Command),
    Pointer(PointerEvent),
    PromptChanged { tag: PromptTag, content: String },
    PromptSubmit { tag: PromptTag, content: String },
    PromptCancel { tag: PromptTag },
    Resize { columns: u16, rows: u16 },
    Quit,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Prompt {
        tag: PromptTag,
        label: String,
    },
}

/// Turns terminal events into viewer commands, pointer input and prompt edits.
#[derive(Debug)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    char_stack: String,
    mode: InputMode,
    prompt_buffer: String,
    cell_size: (f32, f32),
    last_click: Option<(Instant, u16, u16)>,
}

impl Default for EventMapper {
    fn default() -> Self {
        Self {
            pending_count: None,
            pending_digits: String::new(),
            char_stack: String::new(),
            mode: InputMode::Normal,
            prompt_buffer: String::new(),
            cell_size: (1.0, 1.0),
            last_click: None,
        }
    }
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pixel size of one terminal cell, used to place mouse events in the viewport.
    pub fn set_cell_size(&mut self, width: f32, height: f32) {
        self.cell_size = (width.max(1.0), height.max(1.0));
    }

    pub fn mode(&self) -> &InputMode {
        &self.mode
    }

    /// Opens the line editor for a viewer prompt, seeded with `initial`.
    pub fn begin_prompt(&mut self, tag: PromptTag, label: impl Into<String>, initial: &str) {
        self.reset_count();
        self.reset_char_stack();
        self.prompt_buffer = initial.to_string();
        self.mode = InputMode::Prompt {
            tag,
            label: label.into(),
        };
    }

    pub fn end_prompt(&mut self) {
        self.prompt_buffer.clear();
        self.mode = InputMode::Normal;
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        self.map_event_at(event, Instant::now())
    }

    pub fn map_event_at(&mut self, event: Event, now: Instant) -> UiEvent {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Release => UiEvent::None,
            Event::Key(key) => match self.mode.clone() {
                InputMode::Normal => self.map_key_normal(key),
                InputMode::Prompt { tag, .. } => self.map_key_prompt(key, tag),
            },
            Event::Mouse(mouse) => self.map_mouse(mouse, now),
            Event::Resize(columns, rows) => UiEvent::Resize { columns, rows },
            _ => UiEvent::None,
        }
    }

    fn map_key_normal(&mut self, key: KeyEvent) -> UiEvent {
        let KeyEvent {
            code, modifiers, ..
        } = key;
        let ctrl = modifiers.contains(KeyModifiers::CONTROL);

        if let KeyCode::Char(c) = code {
            if !ctrl && c.is_ascii_digit() && (c != '0' || self.pending_count.is_some()) {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                return UiEvent::None;
            }
            match (self.char_stack.as_str(), c) {
                ("g", 'g') => {
                    self.reset_char_stack();
                    return self.command(Command::ScrollToBegin);
                }
                ("a", kind) => {
                    self.reset_char_stack();
                    return match annotation_kind(kind) {
                        Some(kind) => self.command(Command::AnnotateSelection { kind }),
                        None => {
                            self.reset_count();
                            UiEvent::None
                        }
                    };
                }
                ("z", mode) => {
                    self.reset_char_stack();
                    return match read_mode(mode) {
                        Some(mode) => self.command(Command::ZoomReset { mode }),
                        None => {
                            self.reset_count();
                            UiEvent::None
                        }
                    };
                }
                _ => {}
            }
            if !ctrl && matches!(c, 'g' | 'a' | 'z') && self.char_stack.is_empty() {
                self.char_stack.push(c);
                return UiEvent::None;
            }
        }
        self.reset_char_stack();

        match (code, ctrl) {
            (KeyCode::Char('c'), true) | (KeyCode::Char('q'), false) => {
                self.reset_count();
                UiEvent::Quit
            }
            (KeyCode::Char('j'), false) | (KeyCode::Down, false) => {
                self.command(Command::ScrollDown)
            }
            (KeyCode::Char('k'), false) | (KeyCode::Up, false) => self.command(Command::ScrollUp),
            (KeyCode::Char('h'), false) | (KeyCode::Left, false) => {
                self.command(Command::ScrollLeft)
            }
            (KeyCode::Char('l'), false) | (KeyCode::Right, false) => {
                self.command(Command::ScrollRight)
            }
            (KeyCode::Char('d'), true) | (KeyCode::Char(' '), false) | (KeyCode::PageDown, _) => {
                self.command(Command::ScrollDownPage)
            }
            (KeyCode::Char('u'), true) | (KeyCode::PageUp, _) => {
                self.command(Command::ScrollUpPage)
            }
            (KeyCode::Char('J'), false) => self.command(Command::NextPage),
            (KeyCode::Char('K'), false) => self.command(Command::PrevPage),
            (KeyCode::Char('G'), false) | (KeyCode::End, _) => match self.take_count() {
                Some(page) => UiEvent::Command(Command::JumpToPage { page }),
                None => UiEvent::Command(Command::ScrollToEnd),
            },
            (KeyCode::Home, _) => self.command(Command::ScrollToBegin),
            (KeyCode::Char('%'), false) => match self.take_count() {
                Some(percent) => UiEvent::Command(Command::JumpToPercent {
                    percent: percent as f32,
                }),
                None => UiEvent::Command(Command::PromptJumpToPercent),
            },
            (KeyCode::Char(':'), false) => self.command(Command::PromptJumpToPage),
            (KeyCode::Char('c'), false) => self.command(Command::ScrollCenterHorizontal),
            (KeyCode::Char('+'), false) | (KeyCode::Char('='), false) => {
                self.command(Command::ZoomIn)
            }
            (KeyCode::Char('-'), false) => self.command(Command::ZoomOut),
            (KeyCode::Char('w'), false) => self.command(Command::ZoomFitTextWidth),
            (KeyCode::Char('W'), false) => self.command(Command::ZoomCloseToTextWidth),
            (KeyCode::Char('v'), false) => self.command(Command::ToggleReadMode),
            (KeyCode::F(5), _) => self.command(Command::TogglePresentationMode),
            (KeyCode::Char('r'), false) => self.command(Command::RotateClockwise),
            (KeyCode::Char('R'), false) => self.command(Command::RotateCounterclockwise),
            (KeyCode::Char('t'), false) => self.command(Command::ToggleTrimWhiteMargin),
            (KeyCode::Char('d'), false) => self.command(Command::ToggleInvertedMode),
            (KeyCode::Char('D'), false) => self.command(Command::ToggleInvertedImageMode),
            (KeyCode::Char('f'), false) => self.command(Command::JumpToLink),
            (KeyCode::Char('F'), false) => self.command(Command::ToggleMarkLink),
            (KeyCode::Char('m'), false) => self.command(Command::SaveCurrentPosition),
            (KeyCode::Char('\''), false) => self.command(Command::JumpToSavedPosition),
            (KeyCode::Char('o'), true) => self.command(Command::JumpToPreviousSavedPosition),
            (KeyCode::Char('i'), true) | (KeyCode::Tab, _) => {
                self.command(Command::JumpToNextSavedPosition)
            }
            (KeyCode::Char('/'), false) => self.command(Command::Search),
            (KeyCode::Char('n'), false) => self.command(Command::SearchNext),
            (KeyCode::Char('N'), false) => self.command(Command::SearchPrevious),
            (KeyCode::Char('\\'), false) => self.command(Command::CleanupSearch),
            (KeyCode::Char('y'), false) => self.command(Command::CopySelection),
            (KeyCode::Char('i'), false) => self.command(Command::AddPopupTextAnnot),
            (KeyCode::Char('I'), false) => self.command(Command::AddInlineTextAnnot),
            (KeyCode::Char('e'), false) => self.command(Command::EditHoveredAnnot),
            (KeyCode::Char('M'), false) => self.command(Command::MoveHoveredAnnot),
            (KeyCode::Char('x'), false) => self.command(Command::DeleteHoveredAnnot),
            (KeyCode::Char('u'), false) => self.command(Command::Undo),
            (KeyCode::Char('r'), true) => self.command(Command::Redo),
            (KeyCode::Esc, _) => self.command(Command::CancelMode),
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_key_prompt(&mut self, key: KeyEvent, tag: PromptTag) -> UiEvent {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => {
                self.end_prompt();
                UiEvent::PromptCancel { tag }
            }
            KeyCode::Char('c') if ctrl => {
                self.end_prompt();
                UiEvent::PromptCancel { tag }
            }
            KeyCode::Enter => {
                let content = std::mem::take(&mut self.prompt_buffer);
                self.end_prompt();
                UiEvent::PromptSubmit { tag, content }
            }
            KeyCode::Backspace => {
                self.prompt_buffer.pop();
                self.prompt_changed(tag)
            }
            KeyCode::Char('u') if ctrl => {
                self.prompt_buffer.clear();
                self.prompt_changed(tag)
            }
            KeyCode::Char(c) if !ctrl => {
                self.prompt_buffer.push(c);
                self.prompt_changed(tag)
            }
            _ => UiEvent::None,
        }
    }

    fn map_mouse(&mut self, mouse: MouseEvent, now: Instant) -> UiEvent {
        let position = self.cell_center(mouse.column, mouse.row);
        let event = match mouse.kind {
            MouseEventKind::Down(button) => {
                let button = pointer_button(button);
                if button == MouseButton::Primary && self.is_double_click(&mouse, now) {
                    self.last_click = None;
                    PointerEvent::DoubleClick { button, position }
                } else {
                    if button == MouseButton::Primary {
                        self.last_click = Some((now, mouse.column, mouse.row));
                    }
                    PointerEvent::Press {
                        button,
                        position,
                        ctrl: mouse.modifiers.contains(KeyModifiers::CONTROL),
                    }
                }
            }
            MouseEventKind::Up(button) => PointerEvent::Release {
                button: pointer_button(button),
                position,
            },
            MouseEventKind::Drag(_) | MouseEventKind::Moved => PointerEvent::Move { position },
            MouseEventKind::ScrollUp => PointerEvent::Wheel {
                delta_x: 0.0,
                delta_y: 1.0,
            },
            MouseEventKind::ScrollDown => PointerEvent::Wheel {
                delta_x: 0.0,
                delta_y: -1.0,
            },
            MouseEventKind::ScrollLeft => PointerEvent::Wheel {
                delta_x: -1.0,
                delta_y: 0.0,
            },
            MouseEventKind::ScrollRight => PointerEvent::Wheel {
                delta_x: 1.0,
                delta_y: 0.0,
            },
        };
        UiEvent::Pointer(event)
    }

    fn is_double_click(&self, mouse: &MouseEvent, now: Instant) -> bool {
        self.last_click.is_some_and(|(at, column, row)| {
            column == mouse.column
                && row == mouse.row
                && now.saturating_duration_since(at) <= DOUBLE_CLICK_INTERVAL
        })
    }

    fn cell_center(&self, column: u16, row: u16) -> Point {
        Point::new(
            (column as f32 + 0.5) * self.cell_size.0,
            (row as f32 + 0.5) * self.cell_size.1,
        )
    }

    fn prompt_changed(&self, tag: PromptTag) -> UiEvent {
        UiEvent::PromptChanged {
            tag,
            content: self.prompt_buffer.clone(),
        }
    }

    fn command(&mut self, command: Command) -> UiEvent {
        self.reset_count();
        UiEvent::Command(command)
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> Option<usize> {
        let count = self.pending_count.take().filter(|&count| count > 0);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    fn reset_char_stack(&mut self) {
        self.char_stack.clear();
    }

    /// What the user has typed so far: a count prefix, a partial chord, or the prompt line.
    pub fn pending_input(&self) -> Option<String> {
        if let InputMode::Prompt { label, .. } = &self.mode {
            return Some(format!("{label}{}", self.prompt_buffer));
        }
        let pending = format!("{}{}", self.pending_digits, self.char_stack);
        if pending.is_empty() {
            None
        } else {
            Some(pending)
        }
    }
}

fn pointer_button(button: TermButton) -> MouseButton {
    match button {
        TermButton::Left => MouseButton::Primary,
        TermButton::Right => MouseButton::Secondary,
        TermButton::Middle => MouseButton::Middle,
    }
}

fn annotation_kind(key: char) -> Option<AnnotationKind> {
    match key {
        'h' => Some(AnnotationKind::Highlight),
        'u' => Some(AnnotationKind::Underline),
        's' => Some(AnnotationKind::StrikeOut),
        'q' => Some(AnnotationKind::Squiggly),
        _ => None,
    }
}

fn read_mode(key: char) -> Option<ReadMode> {
    match key {
        'w' => Some(ReadMode::FitWidth),
        'h' => Some(ReadMode::FitHeight),
        'c' => Some(ReadMode::FitCustomize),
        _ => None,
    }
}
