use lume_rhi::{GpuResource, RenderSystem, RenderTargetId, ResourceTransition, ViewportId};
use render_api::{CameraId, SceneRenderRequest};

use super::{BarrierState, PassContext, PassDef, PassKindDef, SetupEnv, ShadowScope};
use crate::error::{CompositorError, Result};
use crate::node::{ShadowNode, ShadowNodeId};

/// When a scene pass triggers its shadow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowNodeRecalculation {
    /// Every execution.
    Recalculate,
    /// Only when the camera differs from the last pass that recalculated this shadow node.
    #[default]
    FirstOnly,
    /// Never; uses whatever the shadow maps hold.
    Reuse,
}

#[derive(Debug, Clone)]
pub struct SceneDef {
    /// None renders through the workspace's default camera.
    pub camera_name: Option<String>,
    pub lod_camera_name: Option<String>,
    pub first_render_queue: u8,
    pub last_render_queue: u8,
    pub visibility_mask: u32,
    pub lod_bias: f32,
    pub shadow_node: Option<String>,
    pub shadow_node_recalculation: ShadowNodeRecalculation,
    /// Inside a shadow node: which shadow map's camera renders this pass.
    pub shadow_map_index: Option<usize>,
}

impl Default for SceneDef {
    fn default() -> Self {
        Self {
            camera_name: None,
            lod_camera_name: None,
            first_render_queue: 0,
            last_render_queue: u8::MAX,
            visibility_mask: u32::MAX,
            lod_bias: 1.0,
            shadow_node: None,
            shadow_node_recalculation: ShadowNodeRecalculation::FirstOnly,
            shadow_map_index: None,
        }
    }
}

impl SceneDef {
    pub fn with_camera(camera_name: &str) -> Self {
        Self {
            camera_name: Some(camera_name.to_string()),
            ..Self::default()
        }
    }

    pub fn shadows(mut self, shadow_node: &str, recalculation: ShadowNodeRecalculation) -> Self {
        self.shadow_node = Some(shadow_node.to_string());
        self.shadow_node_recalculation = recalculation;
        self
    }
}

pub(crate) struct ScenePass {
    pub(crate) camera: CameraId,
    lod_camera: Option<CameraId>,
    pub(crate) shadow_node: Option<ShadowNodeId>,
    pub(crate) update_shadow_node: bool,
    casters_only: bool,
}

impl ScenePass {
    pub(super) fn new(def: &SceneDef, env: &SetupEnv<'_>, scope: ShadowScope<'_>) -> Result<Self> {
        let find = |name: &str| {
            env.scene_manager
                .find_camera(name)
                .ok_or_else(|| CompositorError::NotFound(format!("camera '{}'", name)))
        };
        let camera = match (def.shadow_map_index, &scope) {
            (Some(index), ShadowScope::ShadowNode { cameras }) => {
                cameras.get(index).copied().ok_or_else(|| {
                    CompositorError::InvalidState(format!(
                        "shadow map index {} out of range ({} shadow maps)",
                        index,
                        cameras.len()
                    ))
                })?
            }
            (Some(index), ShadowScope::Workspace(_)) => {
                return Err(CompositorError::InvalidState(format!(
                    "shadow map index {} used outside a shadow node",
                    index
                )));
            }
            (None, _) => match &def.camera_name {
                Some(name) => find(name)?,
                None => env.default_camera,
            },
        };
        let lod_camera = def.lod_camera_name.as_deref().map(find).transpose()?;
        let casters_only = matches!(scope, ShadowScope::ShadowNode { .. });

        let shadow_node = match (&def.shadow_node, scope) {
            (None, _) => None,
            (Some(name), ShadowScope::Workspace(nodes)) => Some(nodes.find_or_create(name, env)?),
            (Some(name), ShadowScope::ShadowNode { .. }) => {
                return Err(CompositorError::InvalidState(format!(
                    "shadow node '{}' referenced from inside a shadow node",
                    name
                )));
            }
        };

        Ok(Self {
            camera,
            lod_camera,
            shadow_node,
            update_shadow_node: shadow_node.is_some(),
            casters_only,
        })
    }

    fn effective_lod_camera(&self, lod_camera: Option<CameraId>) -> CameraId {
        self.lod_camera.or(lod_camera).unwrap_or(self.camera)
    }

    fn shadow_maps(&self, shadow_nodes: &[ShadowNode]) -> Vec<lume_rhi::TextureId> {
        self.shadow_node
            .and_then(|id| shadow_nodes.get(id.0))
            .map(ShadowNode::shadow_map_textures)
            .unwrap_or_default()
    }

    pub(super) fn update_shadow_node(
        &self,
        ctx: &PassContext<'_>,
        shadow_nodes: &mut [ShadowNode],
        lod_camera: Option<CameraId>,
    ) {
        if !self.update_shadow_node {
            return;
        }
        if let Some(node) = self.shadow_node.and_then(|id| shadow_nodes.get_mut(id.0)) {
            node.update(ctx, self.camera, self.effective_lod_camera(lod_camera));
        }
    }

    pub(super) fn execute(
        &self,
        ctx: &PassContext<'_>,
        shadow_nodes: &mut [ShadowNode],
        lod_camera: Option<CameraId>,
        def: &PassDef,
        target: RenderTargetId,
        viewport: ViewportId,
    ) -> Result<()> {
        let PassKindDef::Scene(scene) = &def.kind else {
            return Ok(());
        };
        let request = SceneRenderRequest {
            camera: self.camera,
            lod_camera: self.effective_lod_camera(lod_camera),
            target,
            viewport,
            first_render_queue: scene.first_render_queue,
            last_render_queue: scene.last_render_queue,
            visibility_mask: scene.visibility_mask,
            lod_bias: scene.lod_bias,
            shadow_maps: self.shadow_maps(shadow_nodes),
            casters_only: self.casters_only,
        };
        ctx.scene_manager
            .render_scene(&request)
            .map_err(CompositorError::Scene)
    }

    /// Shadow-node passes run right before this pass when it triggers the update, so their
    /// barriers are placed here.
    pub(super) fn place_shadow_node_barriers(
        &self,
        state: &mut BarrierState,
        shadow_nodes: &mut [ShadowNode],
        rs: &dyn RenderSystem,
    ) -> Result<()> {
        if !self.update_shadow_node {
            return Ok(());
        }
        match self.shadow_node.and_then(|id| shadow_nodes.get_mut(id.0)) {
            Some(node) => node.place_barriers(state, rs),
            None => Ok(()),
        }
    }

    pub(super) fn require_shadow_maps(
        &self,
        state: &mut BarrierState,
        out: &mut Vec<ResourceTransition>,
        shadow_nodes: &[ShadowNode],
    ) {
        for texture in self.shadow_maps(shadow_nodes) {
            state.require_texture(out, GpuResource::Texture(texture));
        }
    }
}
