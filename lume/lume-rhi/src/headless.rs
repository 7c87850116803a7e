//! Headless render system: keeps resource bookkeeping in memory and records every call.
//! Used by tests and by demos that run the compositor without a GPU.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::{
    BufferId, Capabilities, ClearParams, PixelFormat, QuadDraw, RenderSystem, RenderTargetId,
    RenderTargetInfo, ResourceTransition, RhiError, RhiResult, StencilParams, TextureDescriptor,
    TextureId, UavBinding, UavBufferDescriptor, ViewportDesc, ViewportId,
};

/// One recorded render-system call.
#[derive(Debug, Clone, PartialEq)]
pub enum RhiCall {
    CreateTexture {
        texture: TextureId,
        label: String,
        width: u32,
        height: u32,
    },
    DestroyTexture(TextureId),
    CreateMrt(RenderTargetId),
    BindSurface {
        mrt: RenderTargetId,
        index: usize,
        texture: TextureId,
    },
    DestroyRenderTarget(RenderTargetId),
    CreateBuffer {
        buffer: BufferId,
        label: String,
        num_elements: u32,
    },
    DestroyBuffer(BufferId),
    AddViewport {
        target: RenderTargetId,
        viewport: ViewportId,
    },
    BeginFrame,
    EndFrame,
    BeginUpdate(RenderTargetId),
    EndUpdate(RenderTargetId),
    SwapBuffers(RenderTargetId),
    Transitions(Vec<ResourceTransition>),
    Clear {
        target: RenderTargetId,
        params: ClearParams,
    },
    Stencil(StencilParams),
    DrawQuad {
        target: RenderTargetId,
        viewport: ViewportId,
        draw: QuadDraw,
    },
    Resolve {
        source: TextureId,
        target: RenderTargetId,
    },
    CopyDepth {
        source: RenderTargetId,
        destination: RenderTargetId,
    },
    ShareDepth {
        source: RenderTargetId,
        destination: RenderTargetId,
    },
    GenerateMipmaps {
        texture: TextureId,
        compute: bool,
    },
    BindUav {
        slot: u32,
        binding: UavBinding,
    },
    ClearUavs,
    FlushUavs,
}

#[derive(Debug)]
enum TargetKind {
    Window {
        width: u32,
        height: u32,
        format: PixelFormat,
    },
    TextureSlice {
        texture: TextureId,
    },
    Mrt {
        surfaces: Vec<Option<TextureId>>,
    },
}

#[derive(Debug)]
struct TargetEntry {
    kind: TargetKind,
    depth_buffer_pool: u16,
    viewports: Vec<(ViewportId, ViewportDesc)>,
}

impl TargetEntry {
    fn new(kind: TargetKind) -> Self {
        Self {
            kind,
            depth_buffer_pool: 1,
            viewports: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct TextureEntry {
    desc: TextureDescriptor,
    slices: HashMap<u32, RenderTargetId>,
}

#[derive(Debug, Default)]
struct State {
    textures: HashMap<TextureId, TextureEntry>,
    targets: HashMap<RenderTargetId, TargetEntry>,
    buffers: HashMap<BufferId, UavBufferDescriptor>,
    uavs: BTreeMap<u32, UavBinding>,
    in_frame: bool,
    calls: Vec<RhiCall>,
}

/// In-memory [`RenderSystem`]. Handles come from one shared counter so ids never repeat.
#[derive(Debug)]
pub struct HeadlessRenderSystem {
    caps: Capabilities,
    next_id: AtomicU64,
    state: Mutex<State>,
}

impl Default for HeadlessRenderSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessRenderSystem {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::default())
    }

    pub fn with_capabilities(caps: Capabilities) -> Self {
        Self {
            caps,
            next_id: AtomicU64::new(1),
            state: Mutex::new(State::default()),
        }
    }

    fn alloc(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a window back-buffer of the given size.
    pub fn create_window(&self, width: u32, height: u32, format: PixelFormat) -> RenderTargetId {
        let id = RenderTargetId(self.alloc());
        self.state().targets.insert(
            id,
            TargetEntry::new(TargetKind::Window {
                width,
                height,
                format,
            }),
        );
        id
    }

    pub fn resize_window(&self, window: RenderTargetId, new_width: u32, new_height: u32) -> RhiResult<()> {
        let mut state = self.state();
        match state.targets.get_mut(&window).map(|t| &mut t.kind) {
            Some(TargetKind::Window { width, height, .. }) => {
                *width = new_width;
                *height = new_height;
                Ok(())
            }
            _ => Err(RhiError::InvalidHandle(format!("{:?} is not a window", window))),
        }
    }

    /// Snapshot of every call recorded so far.
    pub fn calls(&self) -> Vec<RhiCall> {
        self.state().calls.clone()
    }

    /// Returns and forgets the recorded calls.
    pub fn take_calls(&self) -> Vec<RhiCall> {
        std::mem::take(&mut self.state().calls)
    }

    pub fn live_textures(&self) -> usize {
        self.state().textures.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.state().buffers.len()
    }

    pub fn is_texture_alive(&self, texture: TextureId) -> bool {
        self.state().textures.contains_key(&texture)
    }

    /// Textures currently bound to UAV slots, by slot.
    pub fn bound_uavs(&self) -> Vec<(u32, UavBinding)> {
        self.state().uavs.iter().map(|(s, b)| (*s, *b)).collect()
    }

    fn record(&self, call: RhiCall) {
        self.state().calls.push(call);
    }
}

fn unknown<T: std::fmt::Debug>(what: &str, id: T) -> RhiError {
    RhiError::InvalidHandle(format!("unknown {} {:?}", what, id))
}

impl RenderSystem for HeadlessRenderSystem {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> RhiResult<TextureId> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::OutOfRange(format!(
                "texture '{}' has zero size {}x{}",
                desc.label, desc.width, desc.height
            )));
        }
        if desc.usage.contains(crate::TextureUsage::UAV) && !self.caps.uav {
            return Err(RhiError::Unsupported(format!("UAV texture '{}'", desc.label)));
        }
        let texture = TextureId(self.alloc());
        let mut state = self.state();
        state.textures.insert(
            texture,
            TextureEntry {
                desc: desc.clone(),
                slices: HashMap::new(),
            },
        );
        state.calls.push(RhiCall::CreateTexture {
            texture,
            label: desc.label.clone(),
            width: desc.width,
            height: desc.height,
        });
        Ok(texture)
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
        state.calls.push(RhiCall::DestroyTexture(texture));
        Ok(())
    }

    fn texture_desc(&self, texture: TextureId) -> RhiResult<TextureDescriptor> {
        self.state()
            .textures
            .get(&texture)
            .map(|t| t.desc.clone())
            .ok_or_else(|| unknown("texture", texture))
    }

    fn texture_render_target(&self, texture: TextureId, slice: u32) -> RhiResult<RenderTargetId> {
        let fresh = RenderTargetId(self.alloc());
        let mut guard = self.state();
        let state = &mut *guard;
        let entry = state
            .textures
            .get_mut(&texture)
            .ok_or_else(|| unknown("texture", texture))?;
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
            .insert(fresh, TargetEntry::new(TargetKind::TextureSlice { texture }));
        Ok(fresh)
    }

    fn create_multi_render_target(&self, _label: &str) -> RhiResult<RenderTargetId> {
        let mrt = RenderTargetId(self.alloc());
        let mut state = self.state();
        state.targets.insert(
            mrt,
            TargetEntry::new(TargetKind::Mrt {
                surfaces: Vec::new(),
            }),
        );
        state.calls.push(RhiCall::CreateMrt(mrt));
        Ok(mrt)
    }

    fn bind_surface(&self, mrt: RenderTargetId, index: usize, texture: TextureId) -> RhiResult<()> {
        let mut guard = self.state();
        let state = &mut *guard;
        if !state.textures.contains_key(&texture) {
            return Err(unknown("texture", texture));
        }
        match state.targets.get_mut(&mrt).map(|t| &mut t.kind) {
            Some(TargetKind::Mrt { surfaces }) => {
                if surfaces.len() <= index {
                    surfaces.resize(index + 1, None);
                }
                surfaces[index] = Some(texture);
            }
            _ => return Err(RhiError::InvalidHandle(format!("{:?} is not an MRT", mrt))),
        }
        state.calls.push(RhiCall::BindSurface { mrt, index, texture });
        Ok(())
    }

    fn destroy_render_target(&self, target: RenderTargetId) -> RhiResult<()> {
        let mut state = self.state();
        let is_mrt = match state.targets.get(&target) {
            Some(entry) => matches!(entry.kind, TargetKind::Mrt { .. }),
            None => return Err(unknown("render target", target)),
        };
        if !is_mrt {
            return Err(RhiError::InvalidHandle(format!(
                "{:?} is owned by a texture or window",
                target
            )));
        }
        state.targets.remove(&target);
        state.calls.push(RhiCall::DestroyRenderTarget(target));
        Ok(())
    }

    fn render_target_info(&self, target: RenderTargetId) -> RhiResult<RenderTargetInfo> {
        let state = self.state();
        let entry = state
            .targets
            .get(&target)
            .ok_or_else(|| unknown("render target", target))?;
        let texture_info = |texture: &TextureId| {
            state.textures.get(texture).map(|t| RenderTargetInfo {
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
                width,
                height,
                format,
            } => Ok(RenderTargetInfo {
                width: *width,
                height: *height,
                format: *format,
                fsaa: 1,
                hw_gamma_write: false,
                is_window: true,
                depth_buffer_pool: entry.depth_buffer_pool,
            }),
            TargetKind::TextureSlice { texture } => {
                texture_info(texture).ok_or_else(|| unknown("texture", texture))
            }
            TargetKind::Mrt { surfaces } => surfaces
                .iter()
                .flatten()
                .next()
                .and_then(texture_info)
                .ok_or_else(|| RhiError::InvalidHandle(format!("MRT {:?} has no surfaces", target))),
        }
    }

    fn set_depth_buffer_pool(
        &self,
        target: RenderTargetId,
        pool: u16,
        _prefer_depth_texture: bool,
    ) -> RhiResult<()> {
        let mut state = self.state();
        let entry = state
            .targets
            .get_mut(&target)
            .ok_or_else(|| unknown("render target", target))?;
        entry.depth_buffer_pool = pool;
        Ok(())
    }

    fn create_uav_buffer(&self, desc: &UavBufferDescriptor) -> RhiResult<BufferId> {
        if !self.caps.uav {
            return Err(RhiError::Unsupported(format!("UAV buffer '{}'", desc.label)));
        }
        let buffer = BufferId(self.alloc());
        let mut state = self.state();
        state.buffers.insert(buffer, desc.clone());
        state.calls.push(RhiCall::CreateBuffer {
            buffer,
            label: desc.label.clone(),
            num_elements: desc.num_elements,
        });
        Ok(buffer)
    }

    fn destroy_uav_buffer(&self, buffer: BufferId) -> RhiResult<()> {
        let mut state = self.state();
        state
            .buffers
            .remove(&buffer)
            .ok_or_else(|| unknown("buffer", buffer))?;
        state.calls.push(RhiCall::DestroyBuffer(buffer));
        Ok(())
    }

    fn buffer_desc(&self, buffer: BufferId) -> RhiResult<UavBufferDescriptor> {
        self.state()
            .buffers
            .get(&buffer)
            .cloned()
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
        let mut state = self.state();
        let entry = state
            .targets
            .get_mut(&target)
            .ok_or_else(|| unknown("render target", target))?;
        entry.viewports.push((viewport, *desc));
        state.calls.push(RhiCall::AddViewport { target, viewport });
        Ok(viewport)
    }

    fn begin_frame_once(&self) {
        let mut state = self.state();
        if !state.in_frame {
            state.in_frame = true;
            state.calls.push(RhiCall::BeginFrame);
        }
    }

    fn end_frame_once(&self) {
        let mut state = self.state();
        if state.in_frame {
            state.in_frame = false;
            state.calls.push(RhiCall::EndFrame);
        }
    }

    fn begin_update(&self, target: RenderTargetId) {
        self.record(RhiCall::BeginUpdate(target));
    }

    fn end_update(&self, target: RenderTargetId) {
        self.record(RhiCall::EndUpdate(target));
    }

    fn swap_buffers(&self, target: RenderTargetId) -> RhiResult<()> {
        let mut state = self.state();
        let is_window = matches!(
            state.targets.get(&target).map(|t| &t.kind),
            Some(TargetKind::Window { .. })
        );
        if !is_window {
            return Err(RhiError::InvalidHandle(format!("{:?} is not a window", target)));
        }
        state.calls.push(RhiCall::SwapBuffers(target));
        Ok(())
    }

    fn execute_resource_transitions(&self, transitions: &[ResourceTransition]) {
        if !transitions.is_empty() {
            self.record(RhiCall::Transitions(transitions.to_vec()));
        }
    }

    fn clear(&self, target: RenderTargetId, _viewport: ViewportId, params: &ClearParams) -> RhiResult<()> {
        self.record(RhiCall::Clear {
            target,
            params: *params,
        });
        Ok(())
    }

    fn set_stencil_state(&self, params: &StencilParams) -> RhiResult<()> {
        self.record(RhiCall::Stencil(*params));
        Ok(())
    }

    fn draw_fullscreen_quad(
        &self,
        target: RenderTargetId,
        viewport: ViewportId,
        draw: &QuadDraw,
    ) -> RhiResult<()> {
        self.record(RhiCall::DrawQuad {
            target,
            viewport,
            draw: draw.clone(),
        });
        Ok(())
    }

    fn resolve_texture(&self, source: TextureId, target: RenderTargetId) -> RhiResult<()> {
        self.record(RhiCall::Resolve { source, target });
        Ok(())
    }

    fn copy_depth(&self, source: RenderTargetId, destination: RenderTargetId) -> RhiResult<()> {
        if !self.caps.depth_copy {
            return Err(RhiError::Unsupported("depth buffer copy".to_string()));
        }
        self.record(RhiCall::CopyDepth {
            source,
            destination,
        });
        Ok(())
    }

    fn share_depth_buffer(&self, source: RenderTargetId, destination: RenderTargetId) -> RhiResult<()> {
        self.record(RhiCall::ShareDepth {
            source,
            destination,
        });
        Ok(())
    }

    fn generate_mipmaps(&self, texture: TextureId) -> RhiResult<()> {
        if !self.state().textures.contains_key(&texture) {
            return Err(unknown("texture", texture));
        }
        self.record(RhiCall::GenerateMipmaps {
            texture,
            compute: false,
        });
        Ok(())
    }

    fn generate_mipmaps_compute(
        &self,
        texture: TextureId,
        _kernel_radius: u32,
        _gaussian_deviation: f32,
    ) -> RhiResult<()> {
        if !self.caps.compute_programs {
            return Err(RhiError::Unsupported("compute mipmaps".to_string()));
        }
        self.record(RhiCall::GenerateMipmaps {
            texture,
            compute: true,
        });
        Ok(())
    }

    fn queue_bind_uav(&self, slot: u32, binding: UavBinding) -> RhiResult<()> {
        let mut state = self.state();
        state.uavs.insert(slot, binding);
        state.calls.push(RhiCall::BindUav { slot, binding });
        Ok(())
    }

    fn clear_uav_bindings(&self) {
        let mut state = self.state();
        state.uavs.clear();
        state.calls.push(RhiCall::ClearUavs);
    }

    fn flush_uavs(&self) {
        self.record(RhiCall::FlushUavs);
    }
}
