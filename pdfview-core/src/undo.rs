use crate::backend::Annotation;
use crate::error::ViewerError;

pub const DEFAULT_UNDO_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotActionKind {
    Add,
    Delete,
}

/// One undoable annotation mutation, with enough of the annotation to rebuild it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotAction {
    pub page_index: usize,
    pub kind: AnnotActionKind,
    pub annotation: Annotation,
}

impl AnnotAction {
    pub fn added(page_index: usize, annotation: Annotation) -> Self {
        Self {
            page_index,
            kind: AnnotActionKind::Add,
            annotation,
        }
    }

    pub fn deleted(page_index: usize, annotation: Annotation) -> Self {
        Self {
            page_index,
            kind: AnnotActionKind::Delete,
            annotation,
        }
    }
}

/// Linear history with a cursor; `cursor` is the index of the last applied action, or -1.
#[derive(Debug, Clone)]
pub struct UndoLog {
    actions: Vec<AnnotAction>,
    cursor: isize,
    capacity: usize,
}

impl Default for UndoLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_UNDO_CAPACITY)
    }
}

impl UndoLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            actions: Vec::new(),
            cursor: -1,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn cursor(&self) -> isize {
        self.cursor
    }

    pub fn can_undo(&self) -> bool {
        self.cursor >= 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.actions.len() as isize
    }

    /// Drops everything after the cursor, then appends.
    pub fn record(&mut self, action: AnnotAction) {
        self.actions.truncate((self.cursor + 1) as usize);
        self.actions.push(action);
        if self.actions.len() > self.capacity {
            let overflow = self.actions.len() - self.capacity;
            self.actions.drain(..overflow);
        }
        self.cursor = self.actions.len() as isize - 1;
    }

    /// The action the next undo inverts. The cursor stays put until [`UndoLog::step_back`].
    pub fn peek_undo(&self) -> Result<&AnnotAction, ViewerError> {
        usize::try_from(self.cursor)
            .ok()
            .and_then(|index| self.actions.get(index))
            .ok_or(ViewerError::NoFurtherUndo)
    }

    /// The action the next redo replays. The cursor stays put until [`UndoLog::step_forward`].
    pub fn peek_redo(&self) -> Result<&AnnotAction, ViewerError> {
        self.actions
            .get((self.cursor + 1) as usize)
            .ok_or(ViewerError::NoFurtherRedo)
    }

    pub fn step_back(&mut self) {
        if self.can_undo() {
            self.cursor -= 1;
        }
    }

    pub fn step_forward(&mut self) {
        if self.can_redo() {
            self.cursor += 1;
        }
    }

    /// Points every logged action for `old` on `page_index` at `new`.
    /// Backends may hand out a fresh id when an annotation is re-created.
    pub fn rename_annotation(&mut self, page_index: usize, old: &str, new: &str) {
        for action in &mut self.actions {
            if action.page_index == page_index && action.annotation.id == old {
                action.annotation.id = new.to_string();
            }
        }
    }

    pub fn actions(&self) -> &[AnnotAction] {
        &self.actions
    }
}
