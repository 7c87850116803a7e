//! Viewport resolution for passes.

use lume_rhi::{RenderSystem, RenderTargetId, ViewportDesc, ViewportId};

use crate::error::Result;

/// Per-workspace offset/scale applied to the normalised viewports of passes whose
/// `viewport_modifier_mask` overlaps the workspace's. Identity by default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportModifier {
    pub offset_x: f32,
    pub offset_y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl Default for ViewportModifier {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

impl ViewportModifier {
    pub fn new(offset_x: f32, offset_y: f32, scale_x: f32, scale_y: f32) -> Self {
        Self {
            offset_x,
            offset_y,
            scale_x,
            scale_y,
        }
    }
}

/// `left' = x + left * z`, `width' = width * z` (and likewise vertically with `y`/`w`), for both
/// the viewport and the scissor rectangle.
pub fn apply_modifier(desc: &ViewportDesc, modifier: Option<ViewportModifier>) -> ViewportDesc {
    let Some(m) = modifier else {
        return *desc;
    };
    ViewportDesc {
        left: m.offset_x + desc.left * m.scale_x,
        top: m.offset_y + desc.top * m.scale_y,
        width: desc.width * m.scale_x,
        height: desc.height * m.scale_y,
        scissor_left: m.offset_x + desc.scissor_left * m.scale_x,
        scissor_top: m.offset_y + desc.scissor_top * m.scale_y,
        scissor_width: desc.scissor_width * m.scale_x,
        scissor_height: desc.scissor_height * m.scale_y,
        overlays_enabled: desc.overlays_enabled,
    }
}

/// Reuses a viewport of `target` matching `desc` within `f32::EPSILON`, or adds one.
pub fn find_or_create(rs: &dyn RenderSystem, target: RenderTargetId, desc: &ViewportDesc) -> Result<ViewportId> {
    if let Some((id, _)) = rs
        .viewports(target)
        .into_iter()
        .find(|(_, existing)| existing.approx_eq(desc))
    {
        return Ok(id);
    }
    Ok(rs.add_viewport(target, desc)?)
}
