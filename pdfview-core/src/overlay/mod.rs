pub mod annot;
pub mod links;
pub mod search;
pub mod selection;

use crate::geometry::Point;

/// Progress of a click-to-place annotation mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureStage {
    /// Waiting for the primary button to be released over the page.
    Armed,
    /// Release seen; the capture timer is running.
    Settling,
    AwaitingInput { page_index: usize, point: Point },
}

/// The single exclusive interaction mode of the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InteractionMode {
    #[default]
    Idle,
    Selecting,
    JumpLinking,
    Searching,
    AnnotatingPopup(CaptureStage),
    AnnotatingInline(CaptureStage),
    MovingAnnotation(CaptureStage),
}

impl InteractionMode {
    pub fn is_idle(&self) -> bool {
        matches!(self, InteractionMode::Idle)
    }

    pub fn capture_stage(&self) -> Option<CaptureStage> {
        match self {
            InteractionMode::AnnotatingPopup(stage)
            | InteractionMode::AnnotatingInline(stage)
            | InteractionMode::MovingAnnotation(stage) => Some(*stage),
            _ => None,
        }
    }

    pub fn with_stage(self, stage: CaptureStage) -> Self {
        match self {
            InteractionMode::AnnotatingPopup(_) => InteractionMode::AnnotatingPopup(stage),
            InteractionMode::AnnotatingInline(_) => InteractionMode::AnnotatingInline(stage),
            InteractionMode::MovingAnnotation(_) => InteractionMode::MovingAnnotation(stage),
            other => other,
        }
    }

    pub fn is_annotating(&self) -> bool {
        self.capture_stage().is_some()
    }

    /// Text selection by dragging is allowed in these modes.
    pub fn allows_selection(&self) -> bool {
        matches!(
            self,
            InteractionMode::Idle | InteractionMode::Selecting | InteractionMode::Searching
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            InteractionMode::Idle => "idle",
            InteractionMode::Selecting => "selecting",
            InteractionMode::JumpLinking => "jump-link",
            InteractionMode::Searching => "searching",
            InteractionMode::AnnotatingPopup(_) => "popup-text-annot",
            InteractionMode::AnnotatingInline(_) => "inline-text-annot",
            InteractionMode::MovingAnnotation(_) => "move-annot",
        }
    }
}
