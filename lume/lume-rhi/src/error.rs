use thiserror::Error;

/// Errors reported by a [`crate::RenderSystem`] backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RhiError {
    #[error("unsupported by this render system: {0}")]
    Unsupported(String),
    #[error("invalid handle: {0}")]
    InvalidHandle(String),
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("backend error: {0}")]
    Backend(String),
}
