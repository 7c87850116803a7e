//! Scene-side collaborator consumed by scene, quad, compute passes and shadow nodes.

use std::fmt::Debug;

use lume_rhi::{GpuResource, RenderTargetId, ResourceAccess, TextureId, ViewportId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId(pub u64);

/// Projection used to fit a shadow camera to its light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowMapTechnique {
    #[default]
    Uniform,
    Focused,
    LiSPSM,
    Pssm,
}

/// Render the visible scene through a camera into a viewport of a target.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRenderRequest {
    pub camera: CameraId,
    /// Camera used for LOD selection; equals `camera` unless overridden.
    pub lod_camera: CameraId,
    pub target: RenderTargetId,
    pub viewport: ViewportId,
    pub first_render_queue: u8,
    /// Exclusive upper bound.
    pub last_render_queue: u8,
    pub visibility_mask: u32,
    pub lod_bias: f32,
    /// Shadow maps produced by the pass's shadow node, in declaration order.
    pub shadow_maps: Vec<TextureId>,
    /// Depth-only caster rendering (passes inside a shadow node).
    pub casters_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputeDispatch {
    pub job: String,
    pub camera: Option<CameraId>,
    /// (slot, texture) pairs bound as sampled inputs.
    pub textures: Vec<(u32, TextureId)>,
    /// (slot, resource, access) triples bound as UAVs.
    pub uavs: Vec<(u32, GpuResource, ResourceAccess)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShadowCameraSetup {
    pub light: LightId,
    pub shadow_camera: CameraId,
    pub view_camera: CameraId,
    pub technique: ShadowMapTechnique,
    pub split: u32,
    pub shadow_map: TextureId,
}

/// Scene manager interface. Culling may fan out to worker threads internally; every method is
/// a blocking call from the compositor's point of view.
pub trait SceneManager: Send + Sync + Debug {
    fn find_camera(&self, name: &str) -> Option<CameraId>;
    fn create_camera(&self, name: &str) -> CameraId;
    fn destroy_camera(&self, camera: CameraId);
    /// Corner rays of the camera frustum's far plane (view space unless `world_space`).
    fn frustum_corners(&self, camera: CameraId, world_space: bool) -> [[f32; 3]; 4];
    fn render_scene(&self, request: &SceneRenderRequest) -> Result<(), String>;
    fn dispatch_compute(&self, dispatch: &ComputeDispatch) -> Result<(), String>;
    /// Up to `max_lights` shadow-casting lights sorted by distance to `camera`.
    fn closest_shadow_casting_lights(&self, camera: CameraId, max_lights: usize) -> Vec<LightId>;
    fn setup_shadow_camera(&self, setup: &ShadowCameraSetup);
}
