use lume_rhi::{ClearBuffers, ClearParams, RenderTargetId, ViewportId};

use super::{PassContext, PassDef, PassKindDef};
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct ClearDef {
    pub params: ClearParams,
}

impl ClearDef {
    pub fn color(color: [f32; 4]) -> Self {
        Self {
            params: ClearParams {
                color,
                ..ClearParams::default()
            },
        }
    }

    pub fn buffers(mut self, buffers: ClearBuffers) -> Self {
        self.params.buffers = buffers;
        self
    }
}

pub(super) fn execute(
    ctx: &PassContext<'_>,
    def: &PassDef,
    target: RenderTargetId,
    viewport: ViewportId,
) -> Result<()> {
    if let PassKindDef::Clear(clear) = &def.kind {
        ctx.render_system.clear(target, viewport, &clear.params)?;
    }
    Ok(())
}
