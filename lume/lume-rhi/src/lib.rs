//! Lume RHI: backend-agnostic render-system interface.
//! This crate defines the handles, descriptors and the [`RenderSystem`] trait the compositor
//! drives. Backends (wgpu, headless recording) implement the trait; the compositor never sees
//! backend objects directly.

use std::fmt::Debug;

mod error;
pub mod headless;

pub use error::RhiError;

/// Result alias used by every [`RenderSystem`] method.
pub type RhiResult<T> = Result<T, RhiError>;

/// Handle to a texture owned by the render system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Handle to a render target: a window back-buffer, one slice of a texture, or an MRT group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderTargetId(pub u64);

/// Handle to a UAV (storage) buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// Handle to a viewport registered on a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewportId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// Resolved by the consumer (e.g. "same as the final target").
    #[default]
    Unknown,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    R16Float,
    R32Float,
    Rg16Float,
    Rgba16Float,
    Rgba32Float,
    D32Float,
    D24UnormS8Uint,
}

impl PixelFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, PixelFormat::D32Float | PixelFormat::D24UnormS8Uint)
    }
}

/// Texture dimension / type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureDimension {
    #[default]
    D2,
    D2Array,
    D3,
    Cube,
}

impl TextureDimension {
    pub fn num_faces(&self) -> u32 {
        match self {
            TextureDimension::Cube => 6,
            _ => 1,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct TextureUsage: u32 {
        const RENDER_TARGET = 1 << 0;
        const UAV = 1 << 1;
        const AUTOMIPMAP = 1 << 2;
        const SAMPLED = 1 << 3;
        const COPY_SRC = 1 << 4;
        const COPY_DST = 1 << 5;
    }
}

bitflags::bitflags! {
    /// How a UAV buffer may additionally be bound.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferBindFlags: u32 {
        const UAV = 1 << 0;
        const SHADER_READ = 1 << 1;
        const INDIRECT = 1 << 2;
        const VERTEX = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Caches that must be invalidated before the resource is read in its new layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ReadBarrier: u32 {
        const CPU = 1 << 0;
        const INDIRECT = 1 << 1;
        const VERTEX_BUFFER = 1 << 2;
        const INDEX_BUFFER = 1 << 3;
        const CONST_BUFFER = 1 << 4;
        const TEXTURE = 1 << 5;
        const UAV = 1 << 6;
        const RENDER_TARGET = 1 << 7;
        const DEPTH_STENCIL = 1 << 8;
    }
}

bitflags::bitflags! {
    /// Writes that must be flushed before leaving the old layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WriteBarrier: u32 {
        const CPU = 1 << 0;
        const UAV = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const DEPTH_STENCIL = 1 << 3;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearBuffers: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Layout a GPU resource is in. Transitions between layouts are what the compositor emulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceLayout {
    #[default]
    Undefined,
    Texture,
    RenderTarget,
    RenderDepth,
    Clear,
    Uav,
    CopySrc,
    CopyDst,
    MipmapGen,
    PresentReady,
}

impl ResourceLayout {
    /// Writes that may be pending while a resource sits in this layout.
    pub fn pending_writes(&self) -> WriteBarrier {
        match self {
            ResourceLayout::Uav => WriteBarrier::UAV,
            ResourceLayout::RenderTarget | ResourceLayout::Clear => WriteBarrier::RENDER_TARGET,
            ResourceLayout::RenderDepth => WriteBarrier::DEPTH_STENCIL,
            _ => WriteBarrier::empty(),
        }
    }
}

/// Access a pass performs on a UAV resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceAccess {
    /// No access recorded yet (or already barriered).
    #[default]
    Undefined,
    Read,
    Write,
    ReadWrite,
}

impl ResourceAccess {
    /// True if this access may write to the resource.
    pub fn is_write(&self) -> bool {
        matches!(self, ResourceAccess::Write | ResourceAccess::ReadWrite)
    }
    /// True if this access reads the resource.
    pub fn is_read(&self) -> bool {
        matches!(self, ResourceAccess::Read | ResourceAccess::ReadWrite)
    }
    /// True if every kind of access in `other` is also granted by `self`.
    pub fn grants(&self, other: ResourceAccess) -> bool {
        (!other.is_read() || self.is_read()) && (!other.is_write() || self.is_write())
    }
}

/// A single (face, mip, slice) surface of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSurface {
    pub texture: TextureId,
    pub face: u8,
    pub mip: u8,
    pub slice: u16,
}

/// Anything whose layout is tracked by barrier emulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuResource {
    /// A render target with no sampleable texture behind it (window back-buffer).
    Window(RenderTargetId),
    Texture(TextureId),
    Surface(TextureSurface),
    Buffer(BufferId),
}

/// One emulated barrier. `resource` is `None` for the merged global barrier used by
/// non-explicit APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTransition {
    pub resource: Option<GpuResource>,
    pub old_layout: ResourceLayout,
    pub new_layout: ResourceLayout,
    pub write_barriers: WriteBarrier,
    pub read_barriers: ReadBarrier,
}

/// What the backend can do. Queried once per barrier placement / pass creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Vulkan/D3D12 style: every transition is issued individually.
    pub explicit_api: bool,
    pub uav: bool,
    pub compute_programs: bool,
    /// Depth buffers can be copied between targets.
    pub depth_copy: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            explicit_api: true,
            uav: true,
            compute_programs: true,
            depth_copy: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub label: String,
    pub dimension: TextureDimension,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, array size for 2D arrays; ignored for 2D and cube.
    pub depth_or_slices: u32,
    /// Extra mip levels beyond the base level.
    pub num_mipmaps: u32,
    pub format: PixelFormat,
    pub usage: TextureUsage,
    pub fsaa: u8,
    pub hw_gamma_write: bool,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: String::new(),
            dimension: TextureDimension::D2,
            width: 1,
            height: 1,
            depth_or_slices: 1,
            num_mipmaps: 0,
            format: PixelFormat::Rgba8Unorm,
            usage: TextureUsage::empty(),
            fsaa: 1,
            hw_gamma_write: false,
        }
    }
}

impl TextureDescriptor {
    /// Number of render-target slices: faces for cubemaps, depth/array size otherwise.
    pub fn num_slices(&self) -> u32 {
        match self.dimension {
            TextureDimension::Cube => 6,
            TextureDimension::D2 => 1,
            TextureDimension::D2Array | TextureDimension::D3 => self.depth_or_slices.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UavBufferDescriptor {
    pub label: String,
    pub num_elements: u32,
    pub bytes_per_element: u32,
    pub bind_flags: BufferBindFlags,
}

/// Properties of an existing render target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTargetInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fsaa: u8,
    pub hw_gamma_write: bool,
    /// True for window back-buffers, which need `swap_buffers` and cannot be sampled.
    pub is_window: bool,
    pub depth_buffer_pool: u16,
}

/// Normalised viewport + scissor rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportDesc {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    pub scissor_left: f32,
    pub scissor_top: f32,
    pub scissor_width: f32,
    pub scissor_height: f32,
    pub overlays_enabled: bool,
}

impl Default for ViewportDesc {
    fn default() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width: 1.0,
            height: 1.0,
            scissor_left: 0.0,
            scissor_top: 0.0,
            scissor_width: 1.0,
            scissor_height: 1.0,
            overlays_enabled: false,
        }
    }
}

impl ViewportDesc {
    /// Equality within `f32::EPSILON` on every rectangle component.
    pub fn approx_eq(&self, other: &ViewportDesc) -> bool {
        let close = |a: f32, b: f32| (a - b).abs() < f32::EPSILON;
        close(self.left, other.left)
            && close(self.top, other.top)
            && close(self.width, other.width)
            && close(self.height, other.height)
            && close(self.scissor_left, other.scissor_left)
            && close(self.scissor_top, other.scissor_top)
            && close(self.scissor_width, other.scissor_width)
            && close(self.scissor_height, other.scissor_height)
            && self.overlays_enabled == other.overlays_enabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearParams {
    pub buffers: ClearBuffers,
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

impl Default for ClearParams {
    fn default() -> Self {
        Self {
            buffers: ClearBuffers::all(),
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
            stencil: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilParams {
    pub enabled: bool,
    pub reference: u32,
    pub compare: CompareOp,
    pub read_mask: u32,
    pub write_mask: u32,
    pub fail_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub pass_op: StencilOp,
}

impl Default for StencilParams {
    fn default() -> Self {
        Self {
            enabled: false,
            reference: 0,
            compare: CompareOp::Always,
            read_mask: 0xFFFF_FFFF,
            write_mask: 0xFFFF_FFFF,
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
        }
    }
}

/// A fullscreen-quad draw with a named material.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadDraw {
    pub material: String,
    /// (texture unit, texture) pairs bound before drawing.
    pub textures: Vec<(u32, TextureId)>,
    /// Optional per-corner vectors forwarded to the vertex stage (view-space rays, etc).
    pub frustum_corners: Option<[[f32; 3]; 4]>,
}

/// A resource bound to a UAV slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UavBinding {
    Texture {
        texture: TextureId,
        mip: u8,
        access: ResourceAccess,
    },
    Buffer {
        buffer: BufferId,
        offset: u64,
        size: u64,
        access: ResourceAccess,
    },
}

/// The render-system collaborator the compositor drives. All methods take `&self`; backends use
/// interior mutability the way [`headless::HeadlessRenderSystem`] does.
pub trait RenderSystem: Send + Sync + Debug {
    fn capabilities(&self) -> Capabilities;

    fn create_texture(&self, desc: &TextureDescriptor) -> RhiResult<TextureId>;
    /// Destroys the texture and every render target created for its slices.
    fn destroy_texture(&self, texture: TextureId) -> RhiResult<()>;
    fn texture_desc(&self, texture: TextureId) -> RhiResult<TextureDescriptor>;
    /// Render target writing into `slice` (cube face or array/depth slice) of a texture.
    fn texture_render_target(&self, texture: TextureId, slice: u32) -> RhiResult<RenderTargetId>;

    /// Creates an empty multi-render-target group; bind surfaces with [`Self::bind_surface`].
    fn create_multi_render_target(&self, label: &str) -> RhiResult<RenderTargetId>;
    fn bind_surface(&self, mrt: RenderTargetId, index: usize, texture: TextureId) -> RhiResult<()>;
    /// Destroys an MRT group. Window and texture-owned targets are rejected.
    fn destroy_render_target(&self, target: RenderTargetId) -> RhiResult<()>;
    fn render_target_info(&self, target: RenderTargetId) -> RhiResult<RenderTargetInfo>;
    fn set_depth_buffer_pool(
        &self,
        target: RenderTargetId,
        pool: u16,
        prefer_depth_texture: bool,
    ) -> RhiResult<()>;

    fn create_uav_buffer(&self, desc: &UavBufferDescriptor) -> RhiResult<BufferId>;
    fn destroy_uav_buffer(&self, buffer: BufferId) -> RhiResult<()>;
    fn buffer_desc(&self, buffer: BufferId) -> RhiResult<UavBufferDescriptor>;

    /// Viewports already registered on `target`, in creation order.
    fn viewports(&self, target: RenderTargetId) -> Vec<(ViewportId, ViewportDesc)>;
    fn add_viewport(&self, target: RenderTargetId, desc: &ViewportDesc) -> RhiResult<ViewportId>;

    /// Idempotent within a frame: only the first call after `end_frame_once` starts a frame.
    fn begin_frame_once(&self);
    fn end_frame_once(&self);
    fn begin_update(&self, target: RenderTargetId);
    fn end_update(&self, target: RenderTargetId);
    fn swap_buffers(&self, target: RenderTargetId) -> RhiResult<()>;

    fn execute_resource_transitions(&self, transitions: &[ResourceTransition]);

    fn clear(&self, target: RenderTargetId, viewport: ViewportId, params: &ClearParams) -> RhiResult<()>;
    fn set_stencil_state(&self, params: &StencilParams) -> RhiResult<()>;
    fn draw_fullscreen_quad(
        &self,
        target: RenderTargetId,
        viewport: ViewportId,
        draw: &QuadDraw,
    ) -> RhiResult<()>;
    /// Resolves a multisampled texture into `target`.
    fn resolve_texture(&self, source: TextureId, target: RenderTargetId) -> RhiResult<()>;
    /// Copies the depth buffer of `source` into `destination`. Returns
    /// [`RhiError::Unsupported`] on backends that cannot copy depth.
    fn copy_depth(&self, source: RenderTargetId, destination: RenderTargetId) -> RhiResult<()>;
    /// Makes `destination` render with the depth buffer attached to `source`.
    fn share_depth_buffer(&self, source: RenderTargetId, destination: RenderTargetId) -> RhiResult<()>;
    fn generate_mipmaps(&self, texture: TextureId) -> RhiResult<()>;
    /// Gaussian-filtered mip chain via compute. Backends without it return `Unsupported`.
    fn generate_mipmaps_compute(
        &self,
        texture: TextureId,
        kernel_radius: u32,
        gaussian_deviation: f32,
    ) -> RhiResult<()> {
        let _ = (kernel_radius, gaussian_deviation);
        Err(RhiError::Unsupported(format!(
            "compute mipmaps for texture {:?}",
            texture
        )))
    }

    fn queue_bind_uav(&self, slot: u32, binding: UavBinding) -> RhiResult<()>;
    fn clear_uav_bindings(&self);
    fn flush_uavs(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_grants() {
        assert!(ResourceAccess::ReadWrite.grants(ResourceAccess::Read));
        assert!(ResourceAccess::ReadWrite.grants(ResourceAccess::Write));
        assert!(ResourceAccess::Read.grants(ResourceAccess::Read));
        assert!(!ResourceAccess::Read.grants(ResourceAccess::Write));
        assert!(!ResourceAccess::Write.grants(ResourceAccess::ReadWrite));
    }

    #[test]
    fn viewport_approx_eq() {
        let a = ViewportDesc::default();
        let mut b = a;
        b.width = 1.0 + f32::EPSILON / 4.0;
        assert!(a.approx_eq(&b));
        b.overlays_enabled = true;
        assert!(!a.approx_eq(&b));
        let mut c = a;
        c.scissor_left = 0.5;
        assert!(!a.approx_eq(&c));
    }

    #[test]
    fn num_slices_by_dimension() {
        let mut d = TextureDescriptor {
            dimension: TextureDimension::Cube,
            depth_or_slices: 4,
            ..Default::default()
        };
        assert_eq!(d.num_slices(), 6);
        d.dimension = TextureDimension::D2Array;
        assert_eq!(d.num_slices(), 4);
        d.dimension = TextureDimension::D2;
        assert_eq!(d.num_slices(), 1);
    }
}
