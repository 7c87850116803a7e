use lume_rhi::{GpuResource, RenderTargetId, ResourceTransition};

use super::{BarrierState, BoundTexture, PassContext, SetupEnv};
use crate::error::{CompositorError, Result};
use crate::node::Node;

/// Resolves a multisampled texture into the pass target.
#[derive(Debug, Clone, Default)]
pub struct ResolveDef {
    pub texture_name: String,
}

pub(crate) struct ResolvePass {
    pub(super) source: BoundTexture,
}

impl ResolvePass {
    pub(super) fn new(def: &ResolveDef, node: &Node, env: &SetupEnv<'_>) -> Result<Self> {
        let source = BoundTexture::resolve(node, env.globals, &def.texture_name, 0, 0)?;
        Ok(Self { source })
    }

    pub(super) fn execute(&self, ctx: &PassContext<'_>, target: RenderTargetId) -> Result<()> {
        let texture = self.source.texture().ok_or_else(|| {
            CompositorError::InvalidState("resolve source was destroyed".into())
        })?;
        ctx.render_system.resolve_texture(texture, target)?;
        Ok(())
    }

    pub(super) fn require_source(&self, state: &mut BarrierState, out: &mut Vec<ResourceTransition>) {
        if let Some(texture) = self.source.texture() {
            state.require_texture(out, GpuResource::Texture(texture));
        }
    }
}
