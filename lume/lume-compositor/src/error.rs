use lume_rhi::RhiError;
use thiserror::Error;

/// Setup-time failures. Per-frame problems are logged instead (see [`crate::Workspace::update`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositorError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("duplicate name: {0}")]
    DuplicateName(String),
    #[error("invalid naming: {0}")]
    InvalidNaming(String),
    #[error("invalid graph topology: {0}")]
    InvalidGraphTopology(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Sampling a channel with no textures (the window back-buffer).
    #[error("render window cannot be used as a texture: {0}")]
    AmbiguousRenderWindowUse(String),
    #[error("scene manager: {0}")]
    Scene(String),
    #[error(transparent)]
    Rhi(#[from] RhiError),
}

pub type Result<T> = std::result::Result<T, CompositorError>;
