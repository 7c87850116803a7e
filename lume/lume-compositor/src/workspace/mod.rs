//! Workspaces: node graphs instantiated against a final target.
//!
//! [`Workspace::connect_all_nodes`] is the scheduling core. Nodes become ready once every input
//! is bound; a ready node pushes its outputs along its routes and joins the execution order.
//! The scan repeats until no node becomes ready, so cycles and dangling routes simply leave
//! nodes behind.

mod def;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use lume_rhi::{BufferId, RenderSystem, RenderTargetId, RenderTargetInfo};
use render_api::{CameraId, SceneManager};

pub use def::{
    BufferRoute, ExternalBufferRoute, ExternalRoute, ExternalSource, RouteSpec, WorkspaceDef,
};

use crate::channel::{ChannelSwap, ResourceChannel};
use crate::config::CompositorConfig;
use crate::error::{CompositorError, Result};
use crate::listener::WorkspaceListener;
use crate::node::{Node, NodeDef, NodeId, ShadowNode, ShadowNodeDef, ShadowNodes};
use crate::pass::{
    BarrierState, CompositorPassProvider, PassContext, PassKindDef, SetupEnv, ShadowNodeRecalculation,
    ShadowScope,
};
use crate::texture_def::{self, BufferMap, BufferSwap};
use crate::viewport::ViewportModifier;

/// Textures and buffers owned by a workspace and visible to all of its nodes by name.
#[derive(Debug, Default)]
pub struct GlobalResources {
    names: Vec<String>,
    textures: Vec<ResourceChannel>,
    pub buffers: BufferMap,
}

impl GlobalResources {
    pub fn channel(&self, name: &str) -> Result<ResourceChannel> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.textures.get(i).cloned())
            .ok_or_else(|| CompositorError::NotFound(format!("global texture '{}'", name)))
    }

    pub fn textures(&self) -> &[ResourceChannel] {
        &self.textures
    }
}

/// Everything a workspace is instantiated with. Built by [`crate::WorkspaceParams`].
pub(crate) struct WorkspaceSetup {
    pub render_system: Arc<dyn RenderSystem>,
    pub scene_manager: Arc<dyn SceneManager>,
    pub provider: Option<Arc<dyn CompositorPassProvider>>,
    pub config: CompositorConfig,
    pub def: Arc<WorkspaceDef>,
    pub node_defs: HashMap<String, Arc<NodeDef>>,
    pub shadow_defs: HashMap<String, Arc<ShadowNodeDef>>,
    pub final_target: RenderTargetId,
    pub default_camera: CameraId,
    pub enabled: bool,
    pub external_targets: Vec<ResourceChannel>,
    pub external_buffers: HashMap<String, BufferId>,
    pub execution_mask: u8,
    pub viewport_modifier_mask: u8,
    pub viewport_modifier: ViewportModifier,
    pub listeners: Vec<Arc<dyn WorkspaceListener>>,
}

/// One ready node's outgoing connection, resolved to node indices.
#[derive(Debug, Clone, Copy)]
struct ResolvedRoute {
    out_node: NodeId,
    out_channel: usize,
    in_node: NodeId,
    in_channel: usize,
}

pub struct Workspace {
    render_system: Arc<dyn RenderSystem>,
    scene_manager: Arc<dyn SceneManager>,
    provider: Option<Arc<dyn CompositorPassProvider>>,
    config: CompositorConfig,
    def: Arc<WorkspaceDef>,
    node_defs: HashMap<String, Arc<NodeDef>>,
    nodes: Vec<Node>,
    shadow_nodes: ShadowNodes,
    globals: GlobalResources,
    execution_order: Vec<NodeId>,
    valid: bool,
    enabled: bool,
    listeners: Vec<Arc<dyn WorkspaceListener>>,
    default_camera: CameraId,
    lod_camera: Option<CameraId>,
    execution_mask: u8,
    viewport_modifier_mask: u8,
    viewport_modifier: ViewportModifier,
    final_target: ResourceChannel,
    final_info: RenderTargetInfo,
    external_targets: Vec<ResourceChannel>,
    external_buffers: HashMap<String, BufferId>,
    pass_setup_dirty: bool,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("definition", &self.def.name())
            .field("nodes", &self.nodes.len())
            .field("execution_order", &self.execution_order)
            .field("valid", &self.valid)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Workspace {
    /// Instantiates nodes, connects them and creates passes. Graph problems leave the
    /// workspace invalid; resource and naming problems are errors.
    pub(crate) fn new(setup: WorkspaceSetup) -> Result<Workspace> {
        let final_info = setup.render_system.render_target_info(setup.final_target)?;
        let mut workspace = Workspace {
            render_system: setup.render_system,
            scene_manager: setup.scene_manager,
            provider: setup.provider,
            config: setup.config,
            def: setup.def,
            node_defs: setup.node_defs,
            nodes: Vec::new(),
            shadow_nodes: ShadowNodes::new(setup.shadow_defs),
            globals: GlobalResources::default(),
            execution_order: Vec::new(),
            valid: false,
            enabled: setup.enabled,
            listeners: setup.listeners,
            default_camera: setup.default_camera,
            lod_camera: None,
            execution_mask: setup.execution_mask,
            viewport_modifier_mask: setup.viewport_modifier_mask,
            viewport_modifier: setup.viewport_modifier,
            final_target: ResourceChannel::window(setup.final_target),
            final_info,
            external_targets: setup.external_targets,
            external_buffers: setup.external_buffers,
            pass_setup_dirty: false,
        };
        workspace.recreate_all_nodes()?;
        Ok(workspace)
    }

    pub fn definition(&self) -> &WorkspaceDef {
        &self.def
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn final_target(&self) -> &ResourceChannel {
        &self.final_target
    }

    /// Final-target properties as of the last resize.
    pub fn final_target_info(&self) -> &RenderTargetInfo {
        &self.final_info
    }

    pub fn globals(&self) -> &GlobalResources {
        &self.globals
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn find_node(&self, alias: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name() == alias).map(NodeId)
    }

    pub fn find_shadow_node(&self, name: &str) -> Option<&ShadowNode> {
        self.shadow_nodes.nodes().iter().find(|n| n.name() == name)
    }

    pub fn execution_order(&self) -> &[NodeId] {
        &self.execution_order
    }

    /// Aliases in execution order.
    pub fn execution_order_names(&self) -> Vec<&str> {
        self.execution_order
            .iter()
            .filter_map(|id| self.nodes.get(id.0).map(Node::name))
            .collect()
    }

    pub fn add_listener(&mut self, listener: Arc<dyn WorkspaceListener>) {
        self.listeners.push(listener);
    }

    pub fn set_execution_mask(&mut self, mask: u8) {
        self.execution_mask = mask;
    }

    /// Camera used for LOD by scene passes that do not name their own.
    pub fn set_lod_camera(&mut self, camera: Option<CameraId>) {
        self.lod_camera = camera;
    }

    pub fn set_node_enabled(&mut self, alias: &str, enabled: bool) -> Result<()> {
        let id = self
            .find_node(alias)
            .ok_or_else(|| CompositorError::NotFound(format!("node '{}'", alias)))?;
        if self.nodes[id.0].enabled() != enabled {
            self.nodes[id.0].set_enabled(enabled);
            self.pass_setup_dirty = true;
        }
        Ok(())
    }

    /// Destroys everything, then creates and connects the graph again.
    pub fn recreate_all_nodes(&mut self) -> Result<()> {
        self.destroy_all_nodes();
        self.create_all_nodes()?;
        self.connect_all_nodes()
    }

    /// Creates global resources and one node per alias, with their local resources.
    pub fn create_all_nodes(&mut self) -> Result<()> {
        self.destroy_all_nodes();
        let rs = &*self.render_system;
        let globals_def = self.def.globals();
        self.globals.textures = texture_def::create_textures(globals_def.texture_definitions(), &self.final_info, rs)?;
        self.globals.names = globals_def
            .texture_definitions()
            .iter()
            .map(|d| d.name.clone())
            .collect();
        texture_def::create_buffers(
            globals_def.buffer_definitions(),
            &mut self.globals.buffers,
            &self.final_info,
            rs,
        )?;

        for (alias, def_name) in self.def.aliases() {
            let def = self.node_defs.get(def_name).cloned().ok_or_else(|| {
                CompositorError::NotFound(format!("node definition '{}' (alias '{}')", def_name, alias))
            })?;
            let node = Node::new(alias, def, &self.final_info, rs)?;
            self.nodes.push(node);
        }
        Ok(())
    }

    /// Destroys nodes, shadow nodes and globals. Nodes still holding a destroyed channel or
    /// buffer are notified first.
    pub fn destroy_all_nodes(&mut self) {
        for index in 0..self.nodes.len() {
            let origin = NodeId(index);
            for channel in self.nodes[index].local_textures().to_vec() {
                self.broadcast_destroyed(origin, &channel);
            }
            for buffer in self.nodes[index].local_buffers() {
                self.broadcast_destroyed_buffer(origin, buffer);
            }
        }
        for node in &mut self.nodes {
            for channel in &self.globals.textures {
                node.notify_destroyed(channel);
            }
            for buffer in self.globals.buffers.values() {
                node.notify_destroyed_buffer(*buffer);
            }
        }

        let rs = &*self.render_system;
        for node in &mut self.nodes {
            node.destroy(rs);
        }
        self.nodes.clear();
        self.shadow_nodes.destroy_all(rs, &*self.scene_manager);
        texture_def::destroy_textures(&mut self.globals.textures, rs);
        self.globals.names.clear();
        texture_def::destroy_buffers(self.def.globals().buffer_definitions(), &mut self.globals.buffers, rs);
        self.execution_order.clear();
        self.valid = false;
    }

    fn node_id(&self, alias: &str) -> Result<NodeId> {
        self.find_node(alias)
            .ok_or_else(|| CompositorError::NotFound(format!("node alias '{}'", alias)))
    }

    fn resolve_routes(&self) -> Result<Vec<ResolvedRoute>> {
        let mut resolved = Vec::new();
        for route in self.def.routes() {
            match route {
                RouteSpec::Channel {
                    out_node,
                    out_channel,
                    in_node,
                    in_channel,
                } => resolved.push(ResolvedRoute {
                    out_node: self.node_id(out_node)?,
                    out_channel: *out_channel,
                    in_node: self.node_id(in_node)?,
                    in_channel: *in_channel,
                }),
                RouteSpec::AllChannels { out_node, in_node } => {
                    let out_id = self.node_id(out_node)?;
                    let in_id = self.node_id(in_node)?;
                    let count = self.nodes[out_id.0]
                        .definition()
                        .num_output_channels()
                        .min(self.nodes[in_id.0].definition().num_input_channels());
                    resolved.extend((0..count).map(|channel| ResolvedRoute {
                        out_node: out_id,
                        out_channel: channel,
                        in_node: in_id,
                        in_channel: channel,
                    }));
                }
            }
        }
        Ok(resolved)
    }

    /// Mutable access to two distinct nodes.
    fn node_pair(&mut self, a: NodeId, b: NodeId) -> Result<(&mut Node, &mut Node)> {
        if a == b {
            return Err(CompositorError::InvalidGraphTopology(format!(
                "node '{}' is routed into itself",
                self.nodes[a.0].name()
            )));
        }
        if a.0 < b.0 {
            let (left, right) = self.nodes.split_at_mut(b.0);
            Ok((&mut left[a.0], &mut right[0]))
        } else {
            let (left, right) = self.nodes.split_at_mut(a.0);
            Ok((&mut right[0], &mut left[b.0]))
        }
    }

    /// Binds external routes, runs the readiness fixed point, creates passes in execution
    /// order, coalesces shadow-node updates and places barriers. On error the workspace is left
    /// invalid with an empty execution order.
    pub fn connect_all_nodes(&mut self) -> Result<()> {
        let result = self.try_connect_all_nodes();
        if result.is_err() {
            self.valid = false;
            self.execution_order.clear();
        }
        result
    }

    fn try_connect_all_nodes(&mut self) -> Result<()> {
        self.valid = true;

        for route in self.def.external_routes() {
            let channel = match route.source {
                ExternalSource::Final => self.final_target.clone(),
                ExternalSource::External(index) => {
                    self.external_targets.get(index).cloned().ok_or_else(|| {
                        CompositorError::NotFound(format!("external render target #{}", index))
                    })?
                }
            };
            let id = self.node_id(&route.in_node)?;
            self.nodes[id.0].connect_external_rt(channel, route.in_channel)?;
        }
        for route in self.def.external_buffer_routes() {
            let buffer = self
                .external_buffers
                .get(&route.buffer_name)
                .copied()
                .ok_or_else(|| CompositorError::NotFound(format!("external buffer '{}'", route.buffer_name)))?;
            let id = self.node_id(&route.in_node)?;
            self.nodes[id.0].connect_external_buffer(buffer, route.in_channel)?;
        }

        let routes = self.resolve_routes()?;
        let mut buffer_routes = Vec::with_capacity(self.def.buffer_routes().len());
        for route in self.def.buffer_routes() {
            buffer_routes.push(ResolvedRoute {
                out_node: self.node_id(&route.out_node)?,
                out_channel: route.out_channel,
                in_node: self.node_id(&route.in_node)?,
                in_channel: route.in_channel,
            });
        }

        let mut pending: Vec<NodeId> = (0..self.nodes.len()).map(NodeId).collect();
        let mut processed = Vec::with_capacity(pending.len());
        let mut progress = true;
        while progress {
            progress = false;
            let mut i = 0;
            while i < pending.len() {
                let id = pending[i];
                if !self.nodes[id.0].are_all_inputs_connected() {
                    i += 1;
                    continue;
                }
                for route in routes.iter().filter(|r| r.out_node == id) {
                    if route.in_node == id {
                        self.reject_self_route(id);
                        continue;
                    }
                    let (src, dst) = self.node_pair(route.out_node, route.in_node)?;
                    src.connect_to(route.out_channel, dst, route.in_node, route.in_channel)?;
                }
                for route in buffer_routes.iter().filter(|r| r.out_node == id) {
                    if route.in_node == id {
                        self.reject_self_route(id);
                        continue;
                    }
                    let (src, dst) = self.node_pair(route.out_node, route.in_node)?;
                    src.connect_buffer_to(route.out_channel, dst, route.in_node, route.in_channel)?;
                }
                processed.push(id);
                // The last pending node takes this slot and is examined next.
                pending.swap_remove(i);
                progress = true;
            }
        }

        let connected = processed.len();
        for id in pending {
            let node = &self.nodes[id.0];
            if node.enabled() {
                log::error!(
                    "workspace '{}': node '{}' has disconnected inputs {:?} (buffers {:?})",
                    self.def.name(),
                    node.name(),
                    node.disconnected_inputs(),
                    node.disconnected_buffer_inputs()
                );
                self.valid = false;
            } else {
                processed.push(id);
            }
        }
        self.execution_order = processed;
        log::debug!(
            "workspace '{}' execution order: {:?}",
            self.def.name(),
            self.execution_order_names()
        );
        if !self.valid {
            return Ok(());
        }

        for &id in &self.execution_order[..connected] {
            let env = SetupEnv {
                rs: &*self.render_system,
                scene_manager: &*self.scene_manager,
                globals: &self.globals,
                final_target: &self.final_info,
                default_camera: self.default_camera,
                viewport_modifier: self.viewport_modifier,
                viewport_modifier_mask: self.viewport_modifier_mask,
                provider: self.provider.as_deref(),
                config: &self.config,
            };
            self.nodes[id.0].create_passes(&env, ShadowScope::Workspace(&mut self.shadow_nodes))?;
        }

        self.setup_shadow_node_updates();
        if self.valid {
            self.place_barriers()?;
        }
        Ok(())
    }

    /// A feedback route can never be satisfied; the workspace stays invalid.
    fn reject_self_route(&mut self, id: NodeId) {
        log::error!(
            "workspace '{}': node '{}' is routed into itself",
            self.def.name(),
            self.nodes[id.0].name()
        );
        self.valid = false;
    }

    /// Decides, per shadow node, which scene passes recalculate it. Walks passes in execution
    /// order tracking the last recalculating camera. Disabled nodes do not take part.
    fn setup_shadow_node_updates(&mut self) {
        let num_shadow_nodes = self.shadow_nodes.nodes().len();
        for shadow_index in 0..num_shadow_nodes {
            let mut last_camera: Option<CameraId> = None;
            let mut used_cameras: HashSet<CameraId> = HashSet::new();
            let mut seen_recalculate = false;
            let mut seen_first_only = false;
            for id in &self.execution_order {
                let node = &mut self.nodes[id.0];
                if !node.enabled() {
                    continue;
                }
                let node_name = node.name().to_string();
                for pass in node.passes_mut() {
                    let policy = match &pass.definition().kind {
                        PassKindDef::Scene(scene) => scene.shadow_node_recalculation,
                        _ => continue,
                    };
                    let Some(scene) = pass.scene_mut() else {
                        continue;
                    };
                    if scene.shadow_node.map(|s| s.0) != Some(shadow_index) {
                        continue;
                    }
                    let camera = scene.camera;
                    scene.update_shadow_node = match policy {
                        ShadowNodeRecalculation::Recalculate => {
                            seen_recalculate = true;
                            last_camera = Some(camera);
                            used_cameras.insert(camera);
                            true
                        }
                        ShadowNodeRecalculation::FirstOnly => {
                            seen_first_only = true;
                            if last_camera != Some(camera) {
                                last_camera = Some(camera);
                                if !used_cameras.insert(camera) && self.config.debug_shadow_node_checks {
                                    log::warn!(
                                        "shadow node '{}' is recalculated more than once for the same camera \
                                         (pass in node '{}'); reorder passes to avoid the extra work",
                                        self.shadow_nodes.nodes()[shadow_index].name(),
                                        node_name
                                    );
                                }
                                true
                            } else {
                                false
                            }
                        }
                        ShadowNodeRecalculation::Reuse => false,
                    };
                }
            }
            if seen_recalculate && seen_first_only {
                let name = self.shadow_nodes.nodes()[shadow_index].name();
                if self.config.reject_mixed_shadow_policies {
                    log::error!(
                        "workspace '{}': shadow node '{}' mixes Recalculate and FirstOnly passes",
                        self.def.name(),
                        name
                    );
                    self.valid = false;
                } else if self.config.debug_shadow_node_checks {
                    log::warn!(
                        "shadow node '{}' mixes Recalculate and FirstOnly passes; updates depend on pass order",
                        name
                    );
                }
            }
        }
    }

    /// Recomputes every pass's transitions over enabled nodes in execution order.
    fn place_barriers(&mut self) -> Result<()> {
        let rs = &*self.render_system;
        let mut state = BarrierState::new(rs.capabilities().explicit_api, self.config.max_uav_slots);
        for id in &self.execution_order {
            let node = &mut self.nodes[id.0];
            if node.enabled() {
                node.place_barriers(&mut state, self.shadow_nodes.nodes_mut(), rs)?;
            }
        }
        self.pass_setup_dirty = false;
        Ok(())
    }

    /// Drops every connection and pass. Nodes, their local textures and shadow nodes survive, so
    /// the graph can be rewired and connected again without recreating resources.
    pub fn clear_all_connections(&mut self) {
        for node in &mut self.nodes {
            node.notify_cleared();
            node.destroy_all_passes();
        }
        self.execution_order.clear();
        self.valid = false;
    }

    pub fn reconnect_all_nodes(&mut self) -> Result<()> {
        self.clear_all_connections();
        self.connect_all_nodes()
    }

    /// Forwards a swap from `origin` along connected nodes; pass-through inputs carry it on.
    fn broadcast_swap(&mut self, origin: NodeId, swap: &ChannelSwap) {
        let rs = &*self.render_system;
        let mut visited: HashSet<NodeId> = HashSet::from([origin]);
        let mut queue: VecDeque<NodeId> = self.nodes[origin.0].connected_nodes().iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let node = &mut self.nodes[id.0];
            if node.notify_recreated(&swap.old, &swap.new, rs) {
                queue.extend(node.connected_nodes().iter().copied());
            }
        }
    }

    fn broadcast_buffer_swap(&mut self, origin: NodeId, swap: BufferSwap) {
        let mut visited: HashSet<NodeId> = HashSet::from([origin]);
        let mut queue: VecDeque<NodeId> = self.nodes[origin.0].connected_nodes().iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let node = &mut self.nodes[id.0];
            if node.notify_recreated_buffer(swap.old, swap.new) {
                queue.extend(node.connected_nodes().iter().copied());
            }
        }
    }

    fn broadcast_destroyed(&mut self, origin: NodeId, channel: &ResourceChannel) {
        let mut visited: HashSet<NodeId> = HashSet::from([origin]);
        let mut queue: VecDeque<NodeId> = self.nodes[origin.0].connected_nodes().iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let node = &mut self.nodes[id.0];
            if node.notify_destroyed(channel) {
                queue.extend(node.connected_nodes().iter().copied());
            }
        }
    }

    fn broadcast_destroyed_buffer(&mut self, origin: NodeId, buffer: BufferId) {
        let mut visited: HashSet<NodeId> = HashSet::from([origin]);
        let mut queue: VecDeque<NodeId> = self.nodes[origin.0].connected_nodes().iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let node = &mut self.nodes[id.0];
            if node.notify_destroyed_buffer(buffer) {
                queue.extend(node.connected_nodes().iter().copied());
            }
        }
    }

    /// Re-reads the final target's size and recreates every relatively sized resource. Does
    /// nothing when the size is unchanged.
    pub fn final_target_resized(&mut self) -> Result<()> {
        let Some(target) = self.final_target.target else {
            return Ok(());
        };
        let info = self.render_system.render_target_info(target)?;
        if info.width == self.final_info.width && info.height == self.final_info.height {
            return Ok(());
        }
        log::debug!(
            "workspace '{}': final target resized {}x{} -> {}x{}",
            self.def.name(),
            self.final_info.width,
            self.final_info.height,
            info.width,
            info.height
        );
        self.final_info = info;
        let rs = Arc::clone(&self.render_system);

        let global_swaps = texture_def::recreate_resizable_textures(
            self.def.globals().texture_definitions(),
            &mut self.globals.textures,
            &self.final_info,
            &*rs,
        )?;
        let global_buffer_swaps = texture_def::recreate_resizable_buffers(
            self.def.globals().buffer_definitions(),
            &mut self.globals.buffers,
            &self.final_info,
            &*rs,
        )?;
        for swap in &global_swaps {
            self.shadow_nodes.notify_recreated(swap, &*rs);
        }
        for node in &mut self.nodes {
            for swap in &global_swaps {
                node.notify_recreated(&swap.old, &swap.new, &*rs);
            }
            for swap in &global_buffer_swaps {
                node.notify_recreated_buffer(swap.old, swap.new);
            }
        }

        self.shadow_nodes.final_target_resized(&self.final_info, &*rs)?;

        for index in 0..self.nodes.len() {
            let (swaps, buffer_swaps) = self.nodes[index].final_target_resized(&self.final_info, &*rs)?;
            for swap in &swaps {
                self.broadcast_swap(NodeId(index), swap);
            }
            for swap in buffer_swaps {
                self.broadcast_buffer_swap(NodeId(index), swap);
            }
        }
        self.pass_setup_dirty = true;
        Ok(())
    }

    /// Opens the frame on the render system.
    pub fn begin_update(&mut self) {
        if self.enabled && self.valid {
            self.render_system.begin_frame_once();
        }
    }

    /// Executes enabled nodes in order. Problems are logged; a workspace that cannot run is
    /// skipped.
    pub fn update(&mut self, frame_count: u64) {
        if !self.enabled || !self.valid {
            return;
        }
        for listener in &self.listeners {
            listener.workspace_pre_update(self);
        }
        if let Err(err) = self.final_target_resized() {
            log::error!("workspace '{}': resize failed: {}", self.def.name(), err);
            return;
        }
        if self.pass_setup_dirty {
            self.setup_shadow_node_updates();
            if !self.valid {
                return;
            }
            if let Err(err) = self.place_barriers() {
                log::error!("workspace '{}': barrier placement failed: {}", self.def.name(), err);
                self.valid = false;
                return;
            }
        }

        let ctx = PassContext {
            render_system: &*self.render_system,
            scene_manager: &*self.scene_manager,
            listeners: &self.listeners,
            frame_count,
            execution_mask: self.execution_mask,
        };
        for id in &self.execution_order {
            let node = &mut self.nodes[id.0];
            if node.enabled() {
                node.update(&ctx, self.shadow_nodes.nodes_mut(), self.lod_camera);
            }
        }
    }

    pub fn end_update(&mut self) {
        if self.enabled && self.valid {
            self.render_system.end_frame_once();
        }
    }

    /// Presents the final target when it is a window.
    pub fn swap_final_target(&mut self) {
        if !self.enabled || !self.valid {
            return;
        }
        let Some(target) = self.final_target.target else {
            return;
        };
        if self.final_info.is_window {
            if let Err(err) = self.render_system.swap_buffers(target) {
                log::error!("workspace '{}': swap failed: {}", self.def.name(), err);
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.destroy_all_nodes();
    }
}
