//! Shadow nodes: nodes rendering depth-only views of the lights closest to a camera.

use std::collections::HashMap;
use std::sync::Arc;

use lume_rhi::{RenderSystem, RenderTargetInfo, TextureId};
use render_api::{CameraId, LightId, SceneManager, ShadowCameraSetup, ShadowMapTechnique};

use super::{Node, NodeDef};
use crate::channel::ChannelSwap;
use crate::error::{CompositorError, Result};
use crate::pass::{BarrierState, PassContext, SetupEnv, ShadowScope};
use crate::texture_def::{TextureDefinition, TextureSourceKind};

#[derive(Debug, Clone, PartialEq)]
pub struct ShadowMapDef {
    /// Local texture holding the map.
    pub texture_name: String,
    /// Index into the closest-light list.
    pub light_index: usize,
    pub split: u32,
    pub technique: ShadowMapTechnique,
}

#[derive(Debug, Clone)]
pub struct ShadowNodeDef {
    node: Arc<NodeDef>,
    shadow_maps: Vec<ShadowMapDef>,
    num_lights: usize,
}

impl ShadowNodeDef {
    pub fn new(name: &str) -> Self {
        Self {
            node: Arc::new(NodeDef::new(name)),
            shadow_maps: Vec::new(),
            num_lights: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.node.name()
    }

    pub fn node_def(&self) -> &NodeDef {
        &self.node
    }

    /// Targets, passes and extra local textures of the underlying node.
    pub fn node_def_mut(&mut self) -> &mut NodeDef {
        Arc::make_mut(&mut self.node)
    }

    /// Declares a shadow map rendered for the `light_index`-th closest light and returns its
    /// texture definition for sizing.
    pub fn add_shadow_map(
        &mut self,
        texture_name: &str,
        light_index: usize,
        split: u32,
        technique: ShadowMapTechnique,
    ) -> Result<&mut TextureDefinition> {
        self.shadow_maps.push(ShadowMapDef {
            texture_name: texture_name.to_string(),
            light_index,
            split,
            technique,
        });
        self.num_lights = self.num_lights.max(light_index + 1);
        match Arc::make_mut(&mut self.node).add_texture_definition(texture_name) {
            Ok(def) => Ok(def),
            Err(err) => {
                self.shadow_maps.pop();
                Err(err)
            }
        }
    }

    pub fn shadow_maps(&self) -> &[ShadowMapDef] {
        &self.shadow_maps
    }

    /// Lights requested from the scene manager per update.
    pub fn num_lights(&self) -> usize {
        self.num_lights
    }

    pub fn set_num_lights(&mut self, num_lights: usize) -> &mut Self {
        self.num_lights = num_lights;
        self
    }
}

/// Index of a shadow node inside its workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShadowNodeId(pub usize);

#[derive(Debug)]
pub struct ShadowNode {
    node: Node,
    def: Arc<ShadowNodeDef>,
    cameras: Vec<CameraId>,
    lights: Vec<LightId>,
    last_camera: Option<CameraId>,
    last_frame: Option<u64>,
}

impl ShadowNode {
    pub(crate) fn new(def: Arc<ShadowNodeDef>, env: &SetupEnv<'_>) -> Result<ShadowNode> {
        if def.node.num_input_channels() > 0 {
            return Err(CompositorError::InvalidState(format!(
                "shadow node '{}' declares input channels",
                def.name()
            )));
        }
        let mut node = Node::new(def.name(), Arc::clone(&def.node), env.final_target, env.rs)?;
        let cameras: Vec<CameraId> = (0..def.shadow_maps.len())
            .map(|i| env.scene_manager.create_camera(&format!("{}/ShadowCamera{}", def.name(), i)))
            .collect();
        if let Err(err) = node.create_passes(env, ShadowScope::ShadowNode { cameras: &cameras }) {
            node.destroy(env.rs);
            for camera in &cameras {
                env.scene_manager.destroy_camera(*camera);
            }
            return Err(err);
        }
        log::debug!("created shadow node '{}' with {} maps", def.name(), cameras.len());
        Ok(ShadowNode {
            node,
            def,
            cameras,
            lights: Vec::new(),
            last_camera: None,
            last_frame: None,
        })
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn cameras(&self) -> &[CameraId] {
        &self.cameras
    }

    /// Closest shadow-casting lights found by the last update.
    pub fn lights(&self) -> &[LightId] {
        &self.lights
    }

    /// Shadow-map textures in declaration order.
    pub fn shadow_map_textures(&self) -> Vec<TextureId> {
        self.def
            .shadow_maps
            .iter()
            .filter_map(|map| {
                let source = self.def.node.textures.texture_source(&map.texture_name).ok()?;
                if source.kind != TextureSourceKind::Local {
                    return None;
                }
                self.node.locals.get(source.index)?.textures.first().copied()
            })
            .collect()
    }

    /// Refreshes the light list once per (camera, frame), fits every shadow camera whose light
    /// exists, then renders the node's passes.
    pub(crate) fn update(&mut self, ctx: &PassContext<'_>, camera: CameraId, lod_camera: CameraId) {
        if self.last_camera != Some(camera) || self.last_frame != Some(ctx.frame_count) {
            self.lights = ctx
                .scene_manager
                .closest_shadow_casting_lights(camera, self.def.num_lights);
            self.last_camera = Some(camera);
            self.last_frame = Some(ctx.frame_count);
        }
        let textures = self.shadow_map_textures();
        for (index, map) in self.def.shadow_maps.iter().enumerate() {
            // Maps past the available lights keep their previous contents.
            let (Some(light), Some(shadow_map)) = (self.lights.get(map.light_index), textures.get(index))
            else {
                continue;
            };
            ctx.scene_manager.setup_shadow_camera(&ShadowCameraSetup {
                light: *light,
                shadow_camera: self.cameras[index],
                view_camera: camera,
                technique: map.technique,
                split: map.split,
                shadow_map: *shadow_map,
            });
        }
        self.node.update(ctx, &mut [], Some(lod_camera));
    }

    pub(crate) fn place_barriers(&mut self, state: &mut BarrierState, rs: &dyn RenderSystem) -> Result<()> {
        self.node.place_barriers(state, &mut [], rs)
    }

    pub(crate) fn final_target_resized(&mut self, final_target: &RenderTargetInfo, rs: &dyn RenderSystem) -> Result<()> {
        // Shadow maps are only sampled through `shadow_map_textures`, so no swaps leave the node.
        self.node.final_target_resized(final_target, rs).map(|_| ())
    }

    pub(crate) fn destroy(&mut self, rs: &dyn RenderSystem, scene_manager: &dyn SceneManager) {
        self.node.destroy(rs);
        for camera in self.cameras.drain(..) {
            scene_manager.destroy_camera(camera);
        }
    }
}

/// The shadow nodes of one workspace, instantiated on first reference.
#[derive(Debug, Default)]
pub(crate) struct ShadowNodes {
    defs: HashMap<String, Arc<ShadowNodeDef>>,
    nodes: Vec<ShadowNode>,
}

impl ShadowNodes {
    pub(crate) fn new(defs: HashMap<String, Arc<ShadowNodeDef>>) -> Self {
        Self {
            defs,
            nodes: Vec::new(),
        }
    }

    pub(crate) fn find_or_create(&mut self, name: &str, env: &SetupEnv<'_>) -> Result<ShadowNodeId> {
        if let Some(index) = self.nodes.iter().position(|n| n.name() == name) {
            return Ok(ShadowNodeId(index));
        }
        let def = self
            .defs
            .get(name)
            .cloned()
            .ok_or_else(|| CompositorError::NotFound(format!("shadow node definition '{}'", name)))?;
        self.nodes.push(ShadowNode::new(def, env)?);
        Ok(ShadowNodeId(self.nodes.len() - 1))
    }

    pub(crate) fn nodes(&self) -> &[ShadowNode] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [ShadowNode] {
        &mut self.nodes
    }

    pub(crate) fn final_target_resized(&mut self, final_target: &RenderTargetInfo, rs: &dyn RenderSystem) -> Result<()> {
        for node in &mut self.nodes {
            node.final_target_resized(final_target, rs)?;
        }
        Ok(())
    }

    /// Global textures are the only channels shared with regular nodes.
    pub(crate) fn notify_recreated(&mut self, swap: &ChannelSwap, rs: &dyn RenderSystem) {
        for node in &mut self.nodes {
            node.node.notify_recreated(&swap.old, &swap.new, rs);
        }
    }

    pub(crate) fn destroy_all(&mut self, rs: &dyn RenderSystem, scene_manager: &dyn SceneManager) {
        for node in &mut self.nodes {
            node.destroy(rs, scene_manager);
        }
        self.nodes.clear();
    }
}
