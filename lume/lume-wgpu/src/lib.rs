//! wgpu backend for the Lume render-system interface.
//!
//! Every command of a frame is recorded into one encoder that is submitted when the frame ends
//! or a window is swapped. wgpu tracks resource hazards itself, so the backend reports a
//! non-explicit API and only logs the transitions the compositor emulates. Windows are
//! offscreen textures; presenting them is left to the embedding application.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use lume_rhi::{
    BufferBindFlags, BufferId, Capabilities, ClearBuffers, ClearParams, PixelFormat, QuadDraw,
    RenderSystem, RenderTargetId, RenderTargetInfo, ResourceTransition, RhiError, RhiResult,
    StencilParams, TextureDescriptor, TextureDimension, TextureId, TextureUsage, UavBinding,
    UavBufferDescriptor, ViewportDesc, ViewportId,
};

mod format;
mod quad;
mod state;

pub use format::{texture_format, DEPTH_FORMAT};
pub use quad::{QuadMaterialDesc, BLIT_MATERIAL};

use quad::{ColorView, QuadJob, QuadRenderer, ResolvedTarget};
use state::{unknown, BufferEntry, State, TargetEntry, TargetKind, TextureEntry};

pub struct WgpuRenderSystem {
    device: wgpu::Device,
    queue: wgpu::Queue,
    next_id: AtomicU64,
    state: Mutex<State>,
}

impl fmt::Debug for WgpuRenderSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("WgpuRenderSystem")
            .field("textures", &state.textures.len())
            .field("targets", &state.targets.len())
            .field("buffers", &state.buffers.len())
            .finish_non_exhaustive()
    }
}

impl WgpuRenderSystem {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let quads = QuadRenderer::new(&device);
        Self {
            device,
            queue,
            next_id: AtomicU64::new(1),
            state: Mutex::new(State::new(quads)),
        }
    }

    /// Creates a device on the default adapter without a surface.
    pub fn new_headless() -> RhiResult<Self> {
        pollster::block_on(async {
            let instance = wgpu::Instance::default();
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions::default())
                .await
                .ok_or_else(|| RhiError::Backend("no wgpu adapter available".to_string()))?;
            log::info!("wgpu adapter: {:?}", adapter.get_info());
            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor::default(), None)
                .await
                .map_err(|e| RhiError::Backend(e.to_string()))?;
            Ok::<Self, RhiError>(Self::new(device, queue))
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn alloc(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `create` inside a validation error scope so bad descriptors surface as errors
    /// instead of the device's uncaptured-error handler.
    fn validated<T>(&self, what: &str, create: impl FnOnce() -> T) -> RhiResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create();
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(RhiError::Backend(format!("{}: {}", what, err))),
            None => Ok(value),
        }
    }

    fn window_texture(&self, label: &str, width: u32, height: u32, format: wgpu::TextureFormat) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    /// Registers an offscreen window back-buffer.
    pub fn create_window(&self, width: u32, height: u32, format: PixelFormat) -> RhiResult<RenderTargetId> {
        if width == 0 || height == 0 {
            return Err(RhiError::OutOfRange(format!("window size {}x{}", width, height)));
        }
        let wgpu_format = texture_format(format, false)?;
        let texture = self.window_texture("lume_window", width, height, wgpu_format);
        let id = RenderTargetId(self.alloc());
        self.state().targets.insert(
            id,
            TargetEntry::new(TargetKind::Window {
                texture,
                format,
                wgpu_format,
                width,
                height,
            }),
        );
        Ok(id)
    }

    pub fn resize_window(&self, window: RenderTargetId, new_width: u32, new_height: u32) -> RhiResult<()> {
        if new_width == 0 || new_height == 0 {
            return Err(RhiError::OutOfRange(format!("window size {}x{}", new_width, new_height)));
        }
        let mut state = self.state();
        let wgpu_format = match &state.target(window)?.kind {
            TargetKind::Window { wgpu_format, .. } => *wgpu_format,
            _ => return Err(RhiError::InvalidHandle(format!("{:?} is not a window", window))),
        };
        let fresh = self.window_texture("lume_window", new_width, new_height, wgpu_format);
        if let TargetKind::Window {
            texture,
            width,
            height,
            ..
        } = &mut state.target_mut(window)?.kind
        {
            *texture = fresh;
            *width = new_width;
            *height = new_height;
        }
        Ok(())
    }

    /// Registers (or replaces) a fullscreen-quad material.
    pub fn register_quad_material(&self, desc: &QuadMaterialDesc) -> RhiResult<()> {
        let mut state = self.state();
        self.validated(&format!("quad material '{}'", desc.name), || {
            state.quads.insert(&self.device, desc)
        })
    }

    pub fn has_quad_material(&self, name: &str) -> bool {
        self.state().quads.has_material(name)
    }

    /// UAV bindings queued since the last `clear_uav_bindings`, by slot.
    pub fn uav_bindings(&self) -> Vec<(u32, UavBinding)> {
        self.state().uavs.iter().map(|(slot, b)| (*slot, *b)).collect()
    }

    /// Lends the wgpu buffer behind a UAV handle, e.g. to a compute job.
    pub fn with_buffer<R>(&self, buffer: BufferId, f: impl FnOnce(&wgpu::Buffer) -> R) -> RhiResult<R> {
        let state = self.state();
        let entry = state.buffers.get(&buffer).ok_or_else(|| unknown("buffer", buffer))?;
        Ok(f(&entry.buffer))
    }

    /// Lends the wgpu texture behind a handle.
    pub fn with_texture<R>(&self, texture: TextureId, f: impl FnOnce(&wgpu::Texture) -> R) -> RhiResult<R> {
        let state = self.state();
        Ok(f(&state.texture(texture)?.texture))
    }
}

impl RenderSystem for WgpuRenderSystem {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            explicit_api: false,
            uav: true,
            compute_programs: true,
            // Depth24PlusStencil8 cannot be a copy source.
            depth_copy: false,
        }
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> RhiResult<TextureId> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::OutOfRange(format!(
                "texture '{}' has zero size {}x{}",
                desc.label, desc.width, desc.height
            )));
        }
        let format = texture_format(desc.format, desc.hw_gamma_write)?;
        let sample_count = desc.fsaa.max(1) as u32;
        if sample_count != 1 && sample_count != 4 {
            return Err(RhiError::Unsupported(format!("{}x MSAA on '{}'", sample_count, desc.label)));
        }
        if sample_count > 1 && (desc.num_mipmaps > 0 || desc.usage.contains(TextureUsage::UAV)) {
            return Err(RhiError::Unsupported(format!(
                "multisampled texture '{}' with mipmaps or UAV access",
                desc.label
            )));
        }
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING;
        if desc.dimension != TextureDimension::D3 {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        if !format.is_depth_stencil_format() {
            usage |= wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST;
        }
        if desc.usage.contains(TextureUsage::UAV) {
            if !format::supports_storage(format) {
                return Err(RhiError::Unsupported(format!(
                    "UAV access to {:?} texture '{}'",
                    format, desc.label
                )));
            }
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        let (dimension, layers) = match desc.dimension {
            TextureDimension::D2 => (wgpu::TextureDimension::D2, 1),
            TextureDimension::Cube => (wgpu::TextureDimension::D2, 6),
            TextureDimension::D2Array => (wgpu::TextureDimension::D2, desc.depth_or_slices.max(1)),
            TextureDimension::D3 => (wgpu::TextureDimension::D3, desc.depth_or_slices.max(1)),
        };
        let texture = self.validated(&format!("texture '{}'", desc.label), || {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(desc.label.as_str()),
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: layers,
                },
                mip_level_count: desc.num_mipmaps + 1,
                sample_count,
                dimension,
                format,
                usage,
                view_formats: &[],
            })
        })?;
        let id = TextureId(self.alloc());
        log::trace!("create texture {:?} '{}' {}x{} {:?}", id, desc.label, desc.width, desc.height, format);
        self.state().textures.insert(
            id,
            TextureEntry {
                desc: desc.clone(),
                format,
                texture,
                slices: Default::default(),
            },
        );
        Ok(id)
    }

    fn destroy_texture(&self, texture: TextureId) -> RhiResult<()> {
        let mut guard = self.state();
        let state = &mut *guard;
        let entry = state
            .textures
            .remove(&texture)
            .ok_or_else(|| unknown("texture", texture))?;
        for rt in entry.slices.values() {
            state.targets.remove(rt);
        }
        state.uavs.retain(|_, binding| !matches!(binding, UavBinding::Texture { texture: t, .. } if *t == texture));
        entry.texture.destroy();
        Ok(())
    }

    fn texture_desc(&self, texture: TextureId) -> RhiResult<TextureDescriptor> {
        Ok(self.state().texture(texture)?.desc.clone())
    }

    fn texture_render_target(&self, texture: TextureId, slice: u32) -> RhiResult<RenderTargetId> {
        let fresh = RenderTargetId(self.alloc());
        let mut guard = self.state();
        let state = &mut *guard;
        let entry = state
            .textures
            .get_mut(&texture)
            .ok_or_else(|| unknown("texture", texture))?;
        if entry.desc.dimension == TextureDimension::D3 {
            return Err(RhiError::Unsupported(format!(
                "rendering into a slice of 3D texture '{}'",
                entry.desc.label
            )));
        }
        if slice >= entry.desc.num_slices() {
            return Err(RhiError::OutOfRange(format!(
                "slice {} of texture '{}' ({} slices)",
                slice,
                entry.desc.label,
                entry.desc.num_slices()
            )));
        }
        if let Some(rt) = entry.slices.get(&slice) {
            return Ok(*rt);
        }
        entry.slices.insert(slice, fresh);
        state
            .targets
            .insert(fresh, TargetEntry::new(TargetKind::TextureSlice { texture, slice }));
        Ok(fresh)
    }

    fn create_multi_render_target(&self, label: &str) -> RhiResult<RenderTargetId> {
        let mrt = RenderTargetId(self.alloc());
        self.state().targets.insert(
            mrt,
            TargetEntry::new(TargetKind::Mrt {
                label: label.to_string(),
                surfaces: Vec::new(),
            }),
        );
        Ok(mrt)
    }

    fn bind_surface(&self, mrt: RenderTargetId, index: usize, texture: TextureId) -> RhiResult<()> {
        let mut guard = self.state();
        let state = &mut *guard;
        let max_attachments = self.device.limits().max_color_attachments as usize;
        if index >= max_attachments {
            return Err(RhiError::OutOfRange(format!(
                "MRT surface {} (device supports {})",
                index, max_attachments
            )));
        }
        state.texture(texture)?;
        match state.targets.get_mut(&mrt).map(|t| &mut t.kind) {
            Some(TargetKind::Mrt { surfaces, .. }) => {
                if surfaces.len() <= index {
                    surfaces.resize(index + 1, None);
                }
                surfaces[index] = Some(texture);
                Ok(())
            }
            _ => Err(RhiError::InvalidHandle(format!("{:?} is not an MRT", mrt))),
        }
    }

    fn destroy_render_target(&self, target: RenderTargetId) -> RhiResult<()> {
        let mut state = self.state();
        if !matches!(state.target(target)?.kind, TargetKind::Mrt { .. }) {
            return Err(RhiError::InvalidHandle(format!(
                "{:?} is owned by a texture or window",
                target
            )));
        }
        state.targets.remove(&target);
        Ok(())
    }

    fn render_target_info(&self, target: RenderTargetId) -> RhiResult<RenderTargetInfo> {
        let state = self.state();
        let entry = state.target(target)?;
        let texture_info = |texture: TextureId| {
            state.texture(texture).map(|t| RenderTargetInfo {
                width: t.desc.width,
                height: t.desc.height,
                format: t.desc.format,
                fsaa: t.desc.fsaa,
                hw_gamma_write: t.desc.hw_gamma_write,
                is_window: false,
                depth_buffer_pool: entry.depth_buffer_pool,
            })
        };
        match &entry.kind {
            TargetKind::Window {
                format,
                width,
                height,
                ..
            } => Ok(RenderTargetInfo {
                width: *width,
                height: *height,
                format: *format,
                fsaa: 1,
                hw_gamma_write: false,
                is_window: true,
                depth_buffer_pool: entry.depth_buffer_pool,
            }),
            TargetKind::TextureSlice { texture, .. } => texture_info(*texture),
            TargetKind::Mrt { label, surfaces } => match surfaces.iter().flatten().next() {
                Some(texture) => texture_info(*texture),
                None => Err(RhiError::InvalidHandle(format!("MRT '{}' has no surfaces", label))),
            },
        }
    }

    fn set_depth_buffer_pool(
        &self,
        target: RenderTargetId,
        pool: u16,
        _prefer_depth_texture: bool,
    ) -> RhiResult<()> {
        let mut state = self.state();
        let entry = state.target_mut(target)?;
        entry.depth_buffer_pool = pool;
        entry.depth_source = None;
        Ok(())
    }

    fn create_uav_buffer(&self, desc: &UavBufferDescriptor) -> RhiResult<BufferId> {
        let size = desc.num_elements as u64 * desc.bytes_per_element as u64;
        if size == 0 {
            return Err(RhiError::OutOfRange(format!("UAV buffer '{}' is empty", desc.label)));
        }
        let mut usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST;
        if desc.bind_flags.contains(BufferBindFlags::INDIRECT) {
            usage |= wgpu::BufferUsages::INDIRECT;
        }
        if desc.bind_flags.contains(BufferBindFlags::VERTEX) {
            usage |= wgpu::BufferUsages::VERTEX;
        }
        let buffer = self.validated(&format!("UAV buffer '{}'", desc.label), || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(desc.label.as_str()),
                size,
                usage,
                mapped_at_creation: false,
            })
        })?;
        let id = BufferId(self.alloc());
        self.state().buffers.insert(
            id,
            BufferEntry {
                desc: desc.clone(),
                buffer,
            },
        );
        Ok(id)
    }

    fn destroy_uav_buffer(&self, buffer: BufferId) -> RhiResult<()> {
        let mut state = self.state();
        let entry = state.buffers.remove(&buffer).ok_or_else(|| unknown("buffer", buffer))?;
        state.uavs.retain(|_, binding| !matches!(binding, UavBinding::Buffer { buffer: b, .. } if *b == buffer));
        entry.buffer.destroy();
        Ok(())
    }

    fn buffer_desc(&self, buffer: BufferId) -> RhiResult<UavBufferDescriptor> {
        self.state()
            .buffers
            .get(&buffer)
            .map(|b| b.desc.clone())
            .ok_or_else(|| unknown("buffer", buffer))
    }

    fn viewports(&self, target: RenderTargetId) -> Vec<(ViewportId, ViewportDesc)> {
        self.state()
            .targets
            .get(&target)
            .map(|t| t.viewports.clone())
            .unwrap_or_default()
    }

    fn add_viewport(&self, target: RenderTargetId, desc: &ViewportDesc) -> RhiResult<ViewportId> {
        let viewport = ViewportId(self.alloc());
        self.state().target_mut(target)?.viewports.push((viewport, *desc));
        Ok(viewport)
    }

    fn begin_frame_once(&self) {
        let mut state = self.state();
        if !state.in_frame {
            state.in_frame = true;
            state.encoder(&self.device);
        }
    }

    /// Also submits work encoded outside a frame (mipmaps generated at load time, etc).
    fn end_frame_once(&self) {
        let mut state = self.state();
        state.in_frame = false;
        state.flush(&self.queue);
    }

    fn begin_update(&self, target: RenderTargetId) {
        log::trace!("begin update {:?}", target);
    }

    fn end_update(&self, target: RenderTargetId) {
        log::trace!("end update {:?}", target);
    }

    fn swap_buffers(&self, target: RenderTargetId) -> RhiResult<()> {
        let mut state = self.state();
        if !matches!(state.target(target)?.kind, TargetKind::Window { .. }) {
            return Err(RhiError::InvalidHandle(format!("{:?} is not a window", target)));
        }
        state.flush(&self.queue);
        let _ = self.device.poll(wgpu::Maintain::Poll);
        Ok(())
    }

    fn execute_resource_transitions(&self, transitions: &[ResourceTransition]) {
        if !transitions.is_empty() {
            log::trace!("{} resource transitions (tracked by wgpu)", transitions.len());
        }
    }

    fn clear(&self, target: RenderTargetId, viewport: ViewportId, params: &ClearParams) -> RhiResult<()> {
        let mut guard = self.state();
        let state = &mut *guard;
        // Load ops clear whole attachments, whatever the viewport covers.
        state.viewport(target, viewport)?;
        let resolved = state.resolve(&self.device, target)?;
        let [r, g, b, a] = params.color.map(f64::from);
        let color_load = if params.buffers.contains(ClearBuffers::COLOR) {
            wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a })
        } else {
            wgpu::LoadOp::Load
        };
        let depth_load = if params.buffers.contains(ClearBuffers::DEPTH) {
            wgpu::LoadOp::Clear(params.depth)
        } else {
            wgpu::LoadOp::Load
        };
        let stencil_load = if params.buffers.contains(ClearBuffers::STENCIL) {
            wgpu::LoadOp::Clear(params.stencil)
        } else {
            wgpu::LoadOp::Load
        };
        let color_attachments = color_attachments(&resolved.colors, color_load);
        let encoder = state.encoder(&self.device);
        let rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("lume_clear"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: resolved.depth.as_ref().map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: stencil_load,
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        drop(rp);
        Ok(())
    }

    fn set_stencil_state(&self, params: &StencilParams) -> RhiResult<()> {
        self.state().stencil = *params;
        Ok(())
    }

    fn draw_fullscreen_quad(
        &self,
        target: RenderTargetId,
        viewport: ViewportId,
        draw: &QuadDraw,
    ) -> RhiResult<()> {
        let mut guard = self.state();
        let state = &mut *guard;
        let viewport = state.viewport(target, viewport)?;
        let resolved = state.resolve(&self.device, target)?;
        // Units are dense and ordered; gaps would shift the bindings.
        let mut units: Vec<(u32, TextureId)> = draw.textures.clone();
        units.sort_by_key(|(unit, _)| *unit);
        if let Some((index, (unit, _))) = units.iter().enumerate().find(|(i, (u, _))| *u != *i as u32) {
            return Err(RhiError::OutOfRange(format!(
                "quad '{}' binds unit {} at position {}",
                draw.material, unit, index
            )));
        }
        let views = units
            .iter()
            .map(|(_, texture)| state.texture(*texture)?.sampled_view())
            .collect::<RhiResult<Vec<_>>>()?;
        let stencil = state.stencil;
        let encoder = state.encoder.get_or_insert_with(|| {
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lume_frame"),
            })
        });
        state.quads.encode(
            &self.device,
            encoder,
            &resolved,
            QuadJob {
                material: &draw.material,
                textures: &views,
                corners: draw.frustum_corners,
                viewport: &viewport,
                stencil,
            },
        )
    }

    fn resolve_texture(&self, source: TextureId, target: RenderTargetId) -> RhiResult<()> {
        let mut guard = self.state();
        let state = &mut *guard;
        let entry = state.texture(source)?;
        if entry.desc.fsaa <= 1 {
            return Err(RhiError::InvalidHandle(format!(
                "resolve source '{}' is not multisampled",
                entry.desc.label
            )));
        }
        let (source_view, source_format) = (entry.slice_view(0, 0), entry.format);
        let resolved = state.resolve(&self.device, target)?;
        let Some(destination) = resolved.colors.first() else {
            return Err(RhiError::InvalidHandle(format!("{:?} has no color attachment", target)));
        };
        if destination.format != source_format || resolved.sample_count != 1 {
            return Err(RhiError::OutOfRange(format!(
                "cannot resolve {:?} into {:?} ({:?}, {}x)",
                source_format, target, destination.format, resolved.sample_count
            )));
        }
        let encoder = state.encoder(&self.device);
        let rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("lume_resolve"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &source_view,
                resolve_target: Some(&destination.view),
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        drop(rp);
        Ok(())
    }

    fn copy_depth(&self, source: RenderTargetId, destination: RenderTargetId) -> RhiResult<()> {
        Err(RhiError::Unsupported(format!(
            "depth copy from {:?} to {:?}",
            source, destination
        )))
    }

    fn share_depth_buffer(&self, source: RenderTargetId, destination: RenderTargetId) -> RhiResult<()> {
        let mut state = self.state();
        state.target(source)?;
        state.target_mut(destination)?.depth_source = Some(source);
        Ok(())
    }

    /// Each level is a point-sampled blit of the previous one.
    fn generate_mipmaps(&self, texture: TextureId) -> RhiResult<()> {
        let mut guard = self.state();
        let state = &mut *guard;
        let entry = state.texture(texture)?;
        if entry.desc.num_mipmaps == 0 {
            return Ok(());
        }
        if entry.desc.dimension != TextureDimension::D2 || entry.format.is_depth_stencil_format() {
            return Err(RhiError::Unsupported(format!(
                "mipmap generation for '{}' ({:?})",
                entry.desc.label, entry.desc.dimension
            )));
        }
        let levels: Vec<(wgpu::TextureView, ResolvedTarget)> = (1..=entry.desc.num_mipmaps)
            .map(|level| {
                let target = ResolvedTarget {
                    colors: vec![ColorView {
                        view: entry.slice_view(0, level),
                        format: entry.format,
                    }],
                    depth: None,
                    width: (entry.desc.width >> level).max(1),
                    height: (entry.desc.height >> level).max(1),
                    sample_count: 1,
                };
                (entry.slice_view(0, level - 1), target)
            })
            .collect();
        let encoder = state.encoder.get_or_insert_with(|| {
            self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lume_frame"),
            })
        });
        let full = ViewportDesc::default();
        for (source, target) in levels {
            state.quads.encode(
                &self.device,
                encoder,
                &target,
                QuadJob {
                    material: BLIT_MATERIAL,
                    textures: std::slice::from_ref(&source),
                    corners: None,
                    viewport: &full,
                    stencil: StencilParams::default(),
                },
            )?;
        }
        Ok(())
    }

    fn queue_bind_uav(&self, slot: u32, binding: UavBinding) -> RhiResult<()> {
        let mut state = self.state();
        match binding {
            UavBinding::Texture { texture, mip, .. } => {
                let entry = state.texture(texture)?;
                if !entry.desc.usage.contains(TextureUsage::UAV) {
                    return Err(RhiError::InvalidHandle(format!(
                        "texture '{}' was not created for UAV access",
                        entry.desc.label
                    )));
                }
                if u32::from(mip) > entry.desc.num_mipmaps {
                    return Err(RhiError::OutOfRange(format!("mip {} of '{}'", mip, entry.desc.label)));
                }
            }
            UavBinding::Buffer { buffer, offset, size, .. } => {
                let entry = state.buffers.get(&buffer).ok_or_else(|| unknown("buffer", buffer))?;
                let total = entry.buffer.size();
                if offset > total || (size != 0 && offset + size > total) {
                    return Err(RhiError::OutOfRange(format!(
                        "range {}+{} of UAV buffer '{}' ({} bytes)",
                        offset, size, entry.desc.label, total
                    )));
                }
            }
        }
        state.uavs.insert(slot, binding);
        Ok(())
    }

    fn clear_uav_bindings(&self) {
        self.state().uavs.clear();
    }

    fn flush_uavs(&self) {
        log::trace!("{} UAV bindings ready for compute", self.state().uavs.len());
    }
}

fn color_attachments(
    colors: &[ColorView],
    load: wgpu::LoadOp<wgpu::Color>,
) -> Vec<Option<wgpu::RenderPassColorAttachment<'_>>> {
    colors
        .iter()
        .map(|color| {
            Some(wgpu::RenderPassColorAttachment {
                view: &color.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lume_rhi::{ResourceAccess, TextureUsage};

    /// Skips quietly on machines without an adapter.
    fn render_system() -> Option<WgpuRenderSystem> {
        match WgpuRenderSystem::new_headless() {
            Ok(rs) => Some(rs),
            Err(err) => {
                eprintln!("skipping: {}", err);
                None
            }
        }
    }

    fn color_desc(label: &str) -> TextureDescriptor {
        TextureDescriptor {
            label: label.to_string(),
            width: 64,
            height: 32,
            format: PixelFormat::Rgba8Unorm,
            usage: TextureUsage::RENDER_TARGET,
            ..TextureDescriptor::default()
        }
    }

    #[test]
    fn capabilities_report_implicit_barriers() {
        let Some(rs) = render_system() else { return };
        let caps = rs.capabilities();
        assert!(!caps.explicit_api);
        assert!(!caps.depth_copy);
        assert!(matches!(
            rs.copy_depth(RenderTargetId(1), RenderTargetId(2)),
            Err(RhiError::Unsupported(_))
        ));
    }

    #[test]
    fn clear_and_blit_into_window() {
        let Some(rs) = render_system() else { return };
        let window = rs.create_window(64, 32, PixelFormat::Bgra8Unorm).unwrap();
        let texture = rs.create_texture(&color_desc("scene")).unwrap();
        let rt = rs.texture_render_target(texture, 0).unwrap();
        assert_eq!(rs.texture_render_target(texture, 0).unwrap(), rt);
        let rt_viewport = rs.add_viewport(rt, &ViewportDesc::default()).unwrap();
        let window_viewport = rs.add_viewport(window, &ViewportDesc::default()).unwrap();

        rs.begin_frame_once();
        rs.clear(rt, rt_viewport, &ClearParams::default()).unwrap();
        rs.draw_fullscreen_quad(
            window,
            window_viewport,
            &QuadDraw {
                material: BLIT_MATERIAL.to_string(),
                textures: vec![(0, texture)],
                frustum_corners: None,
            },
        )
        .unwrap();
        rs.swap_buffers(window).unwrap();
        rs.end_frame_once();

        let info = rs.render_target_info(window).unwrap();
        assert!(info.is_window);
        assert_eq!((info.width, info.height), (64, 32));
        rs.destroy_texture(texture).unwrap();
        assert!(rs.render_target_info(rt).is_err());
    }

    #[test]
    fn quad_rejects_unknown_material_and_sparse_units() {
        let Some(rs) = render_system() else { return };
        let window = rs.create_window(16, 16, PixelFormat::Rgba8Unorm).unwrap();
        let viewport = rs.add_viewport(window, &ViewportDesc::default()).unwrap();
        let texture = rs.create_texture(&color_desc("src")).unwrap();
        let draw = |material: &str, unit: u32| QuadDraw {
            material: material.to_string(),
            textures: vec![(unit, texture)],
            frustum_corners: None,
        };
        assert!(matches!(
            rs.draw_fullscreen_quad(window, viewport, &draw("Missing", 0)),
            Err(RhiError::InvalidHandle(_))
        ));
        assert!(matches!(
            rs.draw_fullscreen_quad(window, viewport, &draw(BLIT_MATERIAL, 1)),
            Err(RhiError::OutOfRange(_))
        ));
        rs.end_frame_once();
    }

    #[test]
    fn mrt_and_mipmaps() {
        let Some(rs) = render_system() else { return };
        let a = rs.create_texture(&color_desc("a")).unwrap();
        let b = rs.create_texture(&color_desc("b")).unwrap();
        let mrt = rs.create_multi_render_target("gbuffer").unwrap();
        assert!(rs.render_target_info(mrt).is_err());
        rs.bind_surface(mrt, 0, a).unwrap();
        rs.bind_surface(mrt, 1, b).unwrap();
        assert_eq!(rs.render_target_info(mrt).unwrap().width, 64);
        let viewport = rs.add_viewport(mrt, &ViewportDesc::default()).unwrap();
        rs.clear(mrt, viewport, &ClearParams::default()).unwrap();
        assert!(rs.destroy_render_target(mrt).is_ok());

        let mut desc = color_desc("mips");
        desc.num_mipmaps = 3;
        let mipped = rs.create_texture(&desc).unwrap();
        rs.generate_mipmaps(mipped).unwrap();
        rs.end_frame_once();
    }

    #[test]
    fn uav_bindings_are_validated() {
        let Some(rs) = render_system() else { return };
        let buffer = rs
            .create_uav_buffer(&UavBufferDescriptor {
                label: "particles".to_string(),
                num_elements: 16,
                bytes_per_element: 16,
                bind_flags: BufferBindFlags::UAV,
            })
            .unwrap();
        let binding = |offset, size| UavBinding::Buffer {
            buffer,
            offset,
            size,
            access: ResourceAccess::ReadWrite,
        };
        rs.queue_bind_uav(0, binding(0, 0)).unwrap();
        assert!(matches!(rs.queue_bind_uav(1, binding(128, 256)), Err(RhiError::OutOfRange(_))));
        assert_eq!(rs.uav_bindings().len(), 1);
        assert_eq!(rs.with_buffer(buffer, |b| b.size()).unwrap(), 256);

        let plain = rs.create_texture(&color_desc("plain")).unwrap();
        assert!(rs
            .queue_bind_uav(
                2,
                UavBinding::Texture {
                    texture: plain,
                    mip: 0,
                    access: ResourceAccess::Write,
                },
            )
            .is_err());

        rs.destroy_uav_buffer(buffer).unwrap();
        assert!(rs.uav_bindings().is_empty());
    }
}
