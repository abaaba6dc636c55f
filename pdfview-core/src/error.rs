use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewerError {
    #[error("No further undo action!")]
    NoFurtherUndo,
    #[error("No further redo action!")]
    NoFurtherRedo,
    #[error("document has no pages")]
    EmptyDocument,
    #[error("page {index} out of range (document has {count} pages)")]
    PageOutOfRange { index: usize, count: usize },
    #[error("{0} is not supported for this document")]
    Unsupported(&'static str),
    #[error("invalid session data: {0:?}")]
    InvalidSessionData(String),
    #[error("invalid synctex info: {0:?}")]
    InvalidSynctex(String),
    #[error("no link is labelled {0:?}")]
    UnknownJumpLabel(String),
}
