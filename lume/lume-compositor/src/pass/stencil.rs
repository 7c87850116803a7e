use lume_rhi::StencilParams;

use super::{PassContext, PassDef, PassKindDef};
use crate::error::Result;

/// Changes stencil state for the passes that follow; writes nothing.
#[derive(Debug, Clone, Default)]
pub struct StencilDef {
    pub params: StencilParams,
}

pub(super) fn execute(ctx: &PassContext<'_>, def: &PassDef) -> Result<()> {
    if let PassKindDef::Stencil(stencil) = &def.kind {
        ctx.render_system.set_stencil_state(&stencil.params)?;
    }
    Ok(())
}
