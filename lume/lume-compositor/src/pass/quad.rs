use lume_rhi::{GpuResource, QuadDraw, RenderTargetId, ResourceTransition, ViewportId};
use render_api::CameraId;

use super::{BarrierState, BoundTexture, PassContext, PassDef, PassKindDef, SetupEnv};
use crate::channel::ResourceChannel;
use crate::error::{CompositorError, Result};
use crate::node::Node;

/// Which frustum-corner rays the quad forwards to its vertex stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrustumCorners {
    #[default]
    None,
    ViewSpace,
    WorldSpace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuadTextureSource {
    pub texture_unit: u32,
    pub texture_name: String,
    pub mrt_index: usize,
}

/// Fullscreen quad drawn with `material`, sampling named textures.
#[derive(Debug, Clone, Default)]
pub struct QuadDef {
    pub material: String,
    pub inputs: Vec<QuadTextureSource>,
    pub frustum_corners: FrustumCorners,
    /// Camera for frustum corners. None uses the workspace's default camera.
    pub camera_name: Option<String>,
}

impl QuadDef {
    pub fn new(material: &str) -> Self {
        Self {
            material: material.to_string(),
            ..Self::default()
        }
    }

    pub fn add_input(&mut self, texture_unit: u32, texture_name: &str, mrt_index: usize) -> &mut Self {
        self.inputs.push(QuadTextureSource {
            texture_unit,
            texture_name: texture_name.to_string(),
            mrt_index,
        });
        self
    }
}

pub(crate) struct QuadPass {
    inputs: Vec<BoundTexture>,
    camera: CameraId,
}

impl QuadPass {
    pub(super) fn new(def: &QuadDef, node: &Node, env: &SetupEnv<'_>) -> Result<Self> {
        let inputs = def
            .inputs
            .iter()
            .map(|input| {
                BoundTexture::resolve(
                    node,
                    env.globals,
                    &input.texture_name,
                    input.texture_unit,
                    input.mrt_index,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let camera = match &def.camera_name {
            Some(name) => env.scene_manager.find_camera(name).ok_or_else(|| {
                CompositorError::NotFound(format!("quad pass camera '{}'", name))
            })?,
            None => env.default_camera,
        };
        Ok(Self { inputs, camera })
    }

    pub(super) fn execute(
        &self,
        ctx: &PassContext<'_>,
        def: &PassDef,
        target: RenderTargetId,
        viewport: ViewportId,
    ) -> Result<()> {
        let PassKindDef::Quad(quad) = &def.kind else {
            return Ok(());
        };
        let frustum_corners = match quad.frustum_corners {
            FrustumCorners::None => None,
            FrustumCorners::ViewSpace => Some(ctx.scene_manager.frustum_corners(self.camera, false)),
            FrustumCorners::WorldSpace => Some(ctx.scene_manager.frustum_corners(self.camera, true)),
        };
        let draw = QuadDraw {
            material: quad.material.clone(),
            textures: self
                .inputs
                .iter()
                .filter_map(|input| input.texture().map(|t| (input.unit, t)))
                .collect(),
            frustum_corners,
        };
        ctx.render_system.draw_fullscreen_quad(target, viewport, &draw)?;
        Ok(())
    }

    pub(super) fn require_inputs(&self, state: &mut BarrierState, out: &mut Vec<ResourceTransition>) {
        for texture in self.inputs.iter().filter_map(BoundTexture::texture) {
            state.require_texture(out, GpuResource::Texture(texture));
        }
    }

    pub(super) fn notify_recreated(&mut self, old: &ResourceChannel, new: &ResourceChannel) {
        for input in &mut self.inputs {
            input.notify_recreated(old, new);
        }
    }

    pub(super) fn notify_destroyed(&mut self, channel: &ResourceChannel) {
        for input in &mut self.inputs {
            input.notify_destroyed(channel);
        }
    }
}
