//! Resource bookkeeping guarded by the render-system mutex.

use std::collections::{BTreeMap, HashMap};

use lume_rhi::{
    BufferId, PixelFormat, RenderTargetId, RhiError, RhiResult, StencilParams, TextureDescriptor,
    TextureDimension, TextureId, UavBinding, UavBufferDescriptor, ViewportDesc, ViewportId,
};

use crate::format::DEPTH_FORMAT;
use crate::quad::{ColorView, QuadRenderer, ResolvedTarget};

#[derive(Debug)]
pub(crate) struct TextureEntry {
    pub desc: TextureDescriptor,
    pub format: wgpu::TextureFormat,
    pub texture: wgpu::Texture,
    pub slices: HashMap<u32, RenderTargetId>,
}

impl TextureEntry {
    /// Single-layer, single-mip view used as a color attachment.
    pub fn slice_view(&self, slice: u32, mip: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(self.desc.label.as_str()),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: mip,
            mip_level_count: Some(1),
            base_array_layer: slice,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }

    /// Whole-texture view for sampling from a quad material.
    pub fn sampled_view(&self) -> RhiResult<wgpu::TextureView> {
        if self.desc.dimension != TextureDimension::D2 || self.desc.fsaa > 1 || self.desc.format.is_depth() {
            return Err(RhiError::Unsupported(format!(
                "sampling texture '{}' ({:?}, fsaa {}, {:?}) from a quad",
                self.desc.label, self.desc.dimension, self.desc.fsaa, self.desc.format
            )));
        }
        Ok(self.texture.create_view(&wgpu::TextureViewDescriptor::default()))
    }
}

#[derive(Debug)]
pub(crate) enum TargetKind {
    /// Offscreen stand-in for a swap chain back-buffer.
    Window {
        texture: wgpu::Texture,
        format: PixelFormat,
        wgpu_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    },
    TextureSlice {
        texture: TextureId,
        slice: u32,
    },
    Mrt {
        label: String,
        surfaces: Vec<Option<TextureId>>,
    },
}

#[derive(Debug)]
pub(crate) struct TargetEntry {
    pub kind: TargetKind,
    pub depth_buffer_pool: u16,
    /// Target whose depth buffer this one renders with.
    pub depth_source: Option<RenderTargetId>,
    pub viewports: Vec<(ViewportId, ViewportDesc)>,
}

impl TargetEntry {
    pub fn new(kind: TargetKind) -> Self {
        Self {
            kind,
            depth_buffer_pool: 1,
            depth_source: None,
            viewports: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct BufferEntry {
    pub desc: UavBufferDescriptor,
    pub buffer: wgpu::Buffer,
}

/// Depth buffers are shared by every target with the same pool, size and sample count.
type DepthKey = (u16, u32, u32, u32);

#[derive(Debug)]
pub(crate) struct State {
    pub textures: HashMap<TextureId, TextureEntry>,
    pub targets: HashMap<RenderTargetId, TargetEntry>,
    pub buffers: HashMap<BufferId, BufferEntry>,
    pub depth_buffers: HashMap<DepthKey, wgpu::Texture>,
    pub uavs: BTreeMap<u32, UavBinding>,
    pub stencil: StencilParams,
    pub quads: QuadRenderer,
    pub encoder: Option<wgpu::CommandEncoder>,
    pub in_frame: bool,
}

pub(crate) fn unknown<T: std::fmt::Debug>(what: &str, id: T) -> RhiError {
    RhiError::InvalidHandle(format!("unknown {} {:?}", what, id))
}

impl State {
    pub fn new(quads: QuadRenderer) -> Self {
        Self {
            textures: HashMap::new(),
            targets: HashMap::new(),
            buffers: HashMap::new(),
            depth_buffers: HashMap::new(),
            uavs: BTreeMap::new(),
            stencil: StencilParams::default(),
            quads,
            encoder: None,
            in_frame: false,
        }
    }

    pub fn texture(&self, id: TextureId) -> RhiResult<&TextureEntry> {
        self.textures.get(&id).ok_or_else(|| unknown("texture", id))
    }

    pub fn target(&self, id: RenderTargetId) -> RhiResult<&TargetEntry> {
        self.targets.get(&id).ok_or_else(|| unknown("render target", id))
    }

    pub fn target_mut(&mut self, id: RenderTargetId) -> RhiResult<&mut TargetEntry> {
        self.targets.get_mut(&id).ok_or_else(|| unknown("render target", id))
    }

    pub fn encoder(&mut self, device: &wgpu::Device) -> &mut wgpu::CommandEncoder {
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lume_frame"),
            })
        })
    }

    /// Submits everything encoded since the last flush.
    pub fn flush(&mut self, queue: &wgpu::Queue) {
        if let Some(encoder) = self.encoder.take() {
            queue.submit(std::iter::once(encoder.finish()));
        }
    }

    /// Color views plus pixel size and sample count of a render target.
    fn color_views(&self, id: RenderTargetId) -> RhiResult<(Vec<ColorView>, u32, u32, u32)> {
        match &self.target(id)?.kind {
            TargetKind::Window {
                texture,
                wgpu_format,
                width,
                height,
                ..
            } => Ok((
                vec![ColorView {
                    view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
                    format: *wgpu_format,
                }],
                *width,
                *height,
                1,
            )),
            TargetKind::TextureSlice { texture, slice } => {
                let entry = self.texture(*texture)?;
                Ok((
                    vec![ColorView {
                        view: entry.slice_view(*slice, 0),
                        format: entry.format,
                    }],
                    entry.desc.width,
                    entry.desc.height,
                    entry.desc.fsaa.max(1) as u32,
                ))
            }
            TargetKind::Mrt { label, surfaces } => {
                let mut colors = Vec::with_capacity(surfaces.len());
                let mut extent = None;
                for (index, surface) in surfaces.iter().enumerate() {
                    let texture = surface.ok_or_else(|| {
                        RhiError::InvalidHandle(format!("MRT '{}' has no surface {}", label, index))
                    })?;
                    let entry = self.texture(texture)?;
                    let this = (entry.desc.width, entry.desc.height, entry.desc.fsaa.max(1) as u32);
                    if *extent.get_or_insert(this) != this {
                        return Err(RhiError::OutOfRange(format!(
                            "MRT '{}' mixes surface sizes or sample counts",
                            label
                        )));
                    }
                    colors.push(ColorView {
                        view: entry.slice_view(0, 0),
                        format: entry.format,
                    });
                }
                let (width, height, samples) = extent
                    .ok_or_else(|| RhiError::InvalidHandle(format!("MRT '{}' has no surfaces", label)))?;
                Ok((colors, width, height, samples))
            }
        }
    }

    /// Resolves attachments, creating the pooled depth buffer on first use.
    pub fn resolve(&mut self, device: &wgpu::Device, id: RenderTargetId) -> RhiResult<ResolvedTarget> {
        let (colors, width, height, sample_count) = self.color_views(id)?;
        let entry = self.target(id)?;
        let depth_owner = entry.depth_source.unwrap_or(id);
        let pool = match entry.depth_source {
            Some(source) => self.target(source)?.depth_buffer_pool,
            None => entry.depth_buffer_pool,
        };
        let depth = if pool == 0 {
            None
        } else {
            let (_, owner_width, owner_height, owner_samples) = self.color_views(depth_owner)?;
            if (owner_width, owner_height, owner_samples) != (width, height, sample_count) {
                return Err(RhiError::OutOfRange(format!(
                    "{:?} shares the depth buffer of {:?} but their sizes differ",
                    id, depth_owner
                )));
            }
            let depth = self
                .depth_buffers
                .entry((pool, width, height, sample_count))
                .or_insert_with(|| {
                    log::debug!("creating depth buffer pool {} ({}x{}, {}x)", pool, width, height, sample_count);
                    device.create_texture(&wgpu::TextureDescriptor {
                        label: Some("lume_depth_pool"),
                        size: wgpu::Extent3d {
                            width,
                            height,
                            depth_or_array_layers: 1,
                        },
                        mip_level_count: 1,
                        sample_count,
                        dimension: wgpu::TextureDimension::D2,
                        format: DEPTH_FORMAT,
                        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                        view_formats: &[],
                    })
                });
            Some(depth.create_view(&wgpu::TextureViewDescriptor::default()))
        };
        Ok(ResolvedTarget {
            colors,
            depth,
            width,
            height,
            sample_count,
        })
    }

    pub fn viewport(&self, target: RenderTargetId, viewport: ViewportId) -> RhiResult<ViewportDesc> {
        self.target(target)?
            .viewports
            .iter()
            .find(|(id, _)| *id == viewport)
            .map(|(_, desc)| *desc)
            .ok_or_else(|| unknown("viewport", viewport))
    }
}
