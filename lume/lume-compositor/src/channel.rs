//! Resource channel: a render target paired with the textures backing it.

use lume_rhi::{GpuResource, RenderTargetId, TextureId};

/// Value type referencing (never owning) a render target and its textures.
///
/// A channel with a target and no textures is a window back-buffer: it can be rendered to but
/// not sampled. Equality compares only the target.
#[derive(Debug, Clone, Default)]
pub struct ResourceChannel {
    pub target: Option<RenderTargetId>,
    pub textures: Vec<TextureId>,
}

impl ResourceChannel {
    /// The unbound channel.
    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn window(target: RenderTargetId) -> Self {
        Self {
            target: Some(target),
            textures: Vec::new(),
        }
    }

    pub fn texture(target: RenderTargetId, texture: TextureId) -> Self {
        Self {
            target: Some(target),
            textures: vec![texture],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.target.is_some()
    }

    pub fn is_mrt(&self) -> bool {
        self.textures.len() > 1
    }

    /// Resources whose layout is tracked when this channel is written as a render target.
    pub(crate) fn written_resources(&self) -> Vec<GpuResource> {
        match (self.target, self.textures.is_empty()) {
            (Some(rt), true) => vec![GpuResource::Window(rt)],
            _ => self.textures.iter().map(|t| GpuResource::Texture(*t)).collect(),
        }
    }
}

impl PartialEq for ResourceChannel {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl Eq for ResourceChannel {}

/// A channel replaced by recreation; broadcast to every holder of `old`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSwap {
    pub old: ResourceChannel,
    pub new: ResourceChannel,
}
