use lume_rhi::{
    GpuResource, ReadBarrier, RenderSystem, ResourceLayout, ResourceTransition, RhiError,
    TextureDescriptor, TextureDimension, TextureId, TextureSurface, TextureUsage,
};

use super::{BarrierState, PassContext, PassDef, PassKindDef};
use crate::channel::ResourceChannel;
use crate::error::{CompositorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MipmapMethod {
    /// The render system's own mip generation.
    #[default]
    ApiDefault,
    /// Gaussian filter in a compute job.
    Compute,
    /// Compute with a wider kernel.
    ComputeHq,
}

/// Generates mipmaps for every texture of the pass target.
#[derive(Debug, Clone)]
pub struct MipmapDef {
    pub method: MipmapMethod,
    pub kernel_radius: u32,
    pub gaussian_deviation: f32,
}

impl Default for MipmapDef {
    fn default() -> Self {
        Self {
            method: MipmapMethod::ApiDefault,
            kernel_radius: 8,
            gaussian_deviation: 0.5,
        }
    }
}

fn api_default(rs: &dyn RenderSystem, texture: TextureId, desc: &TextureDescriptor) -> Result<()> {
    if desc.num_mipmaps > 0
        && desc
            .usage
            .contains(TextureUsage::AUTOMIPMAP | TextureUsage::RENDER_TARGET)
    {
        rs.generate_mipmaps(texture)?;
    } else {
        log::debug!("texture '{}' has no automipmap chain; skipping", desc.label);
    }
    Ok(())
}

pub(super) fn execute(ctx: &PassContext<'_>, def: &PassDef, target: &ResourceChannel) -> Result<()> {
    let PassKindDef::Mipmap(mipmap) = &def.kind else {
        return Ok(());
    };
    if target.textures.is_empty() {
        return Err(CompositorError::InvalidState("mipmap pass has no textures to process".into()));
    }
    let rs = ctx.render_system;
    for &texture in &target.textures {
        let desc = rs.texture_desc(texture)?;
        match mipmap.method {
            MipmapMethod::ApiDefault => api_default(rs, texture, &desc)?,
            MipmapMethod::Compute | MipmapMethod::ComputeHq => {
                let radius = match mipmap.method {
                    MipmapMethod::ComputeHq => mipmap.kernel_radius * 2,
                    _ => mipmap.kernel_radius,
                };
                match rs.generate_mipmaps_compute(texture, radius, mipmap.gaussian_deviation) {
                    Ok(()) => {}
                    Err(RhiError::Unsupported(reason)) => {
                        log::warn!(
                            "compute mipmaps unavailable for '{}' ({}); using the API default",
                            desc.label,
                            reason
                        );
                        api_default(rs, texture, &desc)?;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }
    Ok(())
}

fn surfaces(texture: TextureId, desc: &TextureDescriptor) -> impl Iterator<Item = TextureSurface> {
    let faces = desc.dimension.num_faces();
    let slices = match desc.dimension {
        TextureDimension::D2Array | TextureDimension::D3 => desc.depth_or_slices.max(1),
        TextureDimension::D2 | TextureDimension::Cube => 1,
    };
    let mips = desc.num_mipmaps + 1;
    (0..faces).flat_map(move |face| {
        (0..mips).flat_map(move |mip| {
            (0..slices).map(move |slice| TextureSurface {
                texture,
                face: face as u8,
                mip: mip as u8,
                slice: slice as u16,
            })
        })
    })
}

/// API mip generation renders into every surface; the compute path samples the whole texture.
pub(super) fn place_barriers(
    def: &PassDef,
    target: &ResourceChannel,
    state: &mut BarrierState,
    out: &mut Vec<ResourceTransition>,
    rs: &dyn RenderSystem,
) -> Result<()> {
    let PassKindDef::Mipmap(mipmap) = &def.kind else {
        return Ok(());
    };
    for &texture in &target.textures {
        match mipmap.method {
            MipmapMethod::ApiDefault => {
                let desc = rs.texture_desc(texture)?;
                state.force_surfaces(
                    out,
                    texture,
                    surfaces(texture, &desc),
                    ResourceLayout::RenderTarget,
                    ReadBarrier::RENDER_TARGET,
                );
            }
            MipmapMethod::Compute | MipmapMethod::ComputeHq => state.force_layout(
                out,
                GpuResource::Texture(texture),
                ResourceLayout::Texture,
                ReadBarrier::TEXTURE,
            ),
        }
    }
    Ok(())
}
