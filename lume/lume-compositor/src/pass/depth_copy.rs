use lume_rhi::{GpuResource, ReadBarrier, ResourceLayout, ResourceTransition};

use super::{BarrierState, BoundTexture, PassContext, SetupEnv};
use crate::channel::ResourceChannel;
use crate::error::{CompositorError, Result};
use crate::node::Node;

/// Copies the depth buffer of one texture's target into another's.
#[derive(Debug, Clone, Default)]
pub struct DepthCopyDef {
    pub source: String,
    pub destination: String,
    /// When the copy fails, make the destination share the source's depth buffer instead.
    pub alias_on_copy_failure: bool,
}

pub(crate) struct DepthCopyPass {
    source: BoundTexture,
    destination: BoundTexture,
    alias_on_copy_failure: bool,
}

impl DepthCopyPass {
    pub(super) fn new(def: &DepthCopyDef, node: &Node, env: &SetupEnv<'_>) -> Result<Self> {
        Ok(Self {
            source: BoundTexture::resolve(node, env.globals, &def.source, 0, 0)?,
            destination: BoundTexture::resolve(node, env.globals, &def.destination, 0, 0)?,
            alias_on_copy_failure: def.alias_on_copy_failure,
        })
    }

    pub(super) fn execute(&self, ctx: &PassContext<'_>) -> Result<()> {
        let (Some(source), Some(destination)) = (self.source.channel.target, self.destination.channel.target)
        else {
            return Err(CompositorError::InvalidState("depth copy endpoints were destroyed".into()));
        };
        match ctx.render_system.copy_depth(source, destination) {
            Ok(()) => Ok(()),
            Err(err) if self.alias_on_copy_failure => {
                log::warn!("depth copy failed ({}); sharing the depth buffer instead", err);
                ctx.render_system.share_depth_buffer(source, destination)?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Both endpoints go to RenderTarget regardless of API.
    pub(super) fn place_barriers(&self, state: &mut BarrierState, out: &mut Vec<ResourceTransition>) {
        for texture in [&self.source, &self.destination].into_iter().filter_map(BoundTexture::texture) {
            state.force_layout(
                out,
                GpuResource::Texture(texture),
                ResourceLayout::RenderTarget,
                ReadBarrier::DEPTH_STENCIL,
            );
        }
    }

    pub(super) fn notify_recreated(&mut self, old: &ResourceChannel, new: &ResourceChannel) {
        self.source.notify_recreated(old, new);
        self.destination.notify_recreated(old, new);
    }

    pub(super) fn notify_destroyed(&mut self, channel: &ResourceChannel) {
        self.source.notify_destroyed(channel);
        self.destination.notify_destroyed(channel);
    }
}
