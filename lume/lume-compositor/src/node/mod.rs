//! Nodes: reusable groups of passes with named input and output channels.

mod shadow;

use std::sync::Arc;

use lume_rhi::{BufferBindFlags, BufferId, RenderSystem, RenderTargetInfo, TextureId};
use render_api::CameraId;

pub use shadow::{ShadowMapDef, ShadowNode, ShadowNodeDef, ShadowNodeId};
pub(crate) use shadow::ShadowNodes;

use crate::channel::{ChannelSwap, ResourceChannel};
use crate::error::{CompositorError, Result};
use crate::pass::{
    self, BarrierState, Pass, PassContext, PassDef, PassKindDef, SetupEnv, ShadowScope,
};
use crate::texture_def::{
    self, BufferMap, BufferSwap, TextureDefinition, TextureDefinitionTable,
    TextureSource, TextureSourceKind,
};
use crate::workspace::GlobalResources;

/// Index of a node inside its workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// The passes writing one render target (or one slice of it).
#[derive(Debug, Clone)]
pub struct TargetDef {
    pub render_target_name: String,
    /// Cube face, array layer or depth slice. 0 is the whole target.
    pub rt_index: u32,
    passes: Vec<Arc<PassDef>>,
}

impl TargetDef {
    pub fn add_pass(&mut self, kind: PassKindDef) -> &mut PassDef {
        self.passes.push(Arc::new(PassDef::new(kind)));
        let last = self.passes.len() - 1;
        Arc::make_mut(&mut self.passes[last])
    }

    pub fn passes(&self) -> &[Arc<PassDef>] {
        &self.passes
    }
}

#[derive(Debug, Clone)]
pub struct NodeDef {
    name: String,
    textures: TextureDefinitionTable,
    num_inputs: usize,
    buffer_inputs: Vec<String>,
    targets: Vec<TargetDef>,
    output_channels: Vec<Option<TextureSource>>,
    output_buffers: Vec<Option<String>>,
    start_enabled: bool,
}

impl NodeDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            textures: TextureDefinitionTable::new(TextureSourceKind::Local),
            num_inputs: 0,
            buffer_inputs: Vec::new(),
            targets: Vec::new(),
            output_channels: Vec::new(),
            output_buffers: Vec::new(),
            start_enabled: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declares the next input channel; returns its index.
    pub fn add_input_channel(&mut self, name: &str) -> Result<usize> {
        let index = self.num_inputs;
        self.textures
            .add_texture_source_name(name, index, TextureSourceKind::Input)?;
        self.num_inputs += 1;
        Ok(index)
    }

    pub fn num_input_channels(&self) -> usize {
        self.num_inputs
    }

    pub fn add_texture_definition(&mut self, name: &str) -> Result<&mut TextureDefinition> {
        self.textures.add_texture_definition(name)
    }

    pub fn add_buffer_definition(
        &mut self,
        name: &str,
        num_elements: u32,
        bytes_per_element: u32,
        bind_flags: BufferBindFlags,
        width_factor: f32,
        height_factor: f32,
    ) -> Result<()> {
        self.textures.add_buffer_definition(
            name,
            num_elements,
            bytes_per_element,
            bind_flags,
            width_factor,
            height_factor,
        )
    }

    pub fn texture_table(&self) -> &TextureDefinitionTable {
        &self.textures
    }

    pub fn texture_table_mut(&mut self) -> &mut TextureDefinitionTable {
        &mut self.textures
    }

    /// Declares the next buffer input; returns its index.
    pub fn add_buffer_input(&mut self, name: &str) -> Result<usize> {
        if self.buffer_inputs.iter().any(|n| n == name) || self.textures.has_buffer_definition(name) {
            return Err(CompositorError::DuplicateName(format!(
                "buffer '{}' in node '{}'",
                name, self.name
            )));
        }
        self.buffer_inputs.push(name.to_string());
        Ok(self.buffer_inputs.len() - 1)
    }

    pub fn num_buffer_inputs(&self) -> usize {
        self.buffer_inputs.len()
    }

    pub fn add_target_pass(&mut self, render_target_name: &str, rt_index: u32) -> &mut TargetDef {
        self.targets.push(TargetDef {
            render_target_name: render_target_name.to_string(),
            rt_index,
            passes: Vec::new(),
        });
        let last = self.targets.len() - 1;
        &mut self.targets[last]
    }

    pub fn targets(&self) -> &[TargetDef] {
        &self.targets
    }

    /// Exposes an input or local texture as output `out_index`. Globals are visible to every
    /// node already and cannot be outputs.
    pub fn map_output_channel(&mut self, out_index: usize, texture_name: &str) -> Result<()> {
        let source = self.textures.texture_source(texture_name)?;
        if source.kind == TextureSourceKind::Global {
            return Err(CompositorError::UnsupportedOperation(format!(
                "global texture '{}' cannot be an output of node '{}'",
                texture_name, self.name
            )));
        }
        if self.output_channels.len() <= out_index {
            self.output_channels.resize(out_index + 1, None);
        }
        self.output_channels[out_index] = Some(source);
        Ok(())
    }

    pub fn num_output_channels(&self) -> usize {
        self.output_channels.len()
    }

    pub fn map_output_buffer_channel(&mut self, out_index: usize, buffer_name: &str) -> Result<()> {
        if !self.buffer_inputs.iter().any(|n| n == buffer_name)
            && !self.textures.has_buffer_definition(buffer_name)
        {
            return Err(CompositorError::NotFound(format!(
                "buffer '{}' in node '{}'",
                buffer_name, self.name
            )));
        }
        if self.output_buffers.len() <= out_index {
            self.output_buffers.resize(out_index + 1, None);
        }
        self.output_buffers[out_index] = Some(buffer_name.to_string());
        Ok(())
    }

    pub fn num_output_buffer_channels(&self) -> usize {
        self.output_buffers.len()
    }

    pub fn set_start_enabled(&mut self, enabled: bool) -> &mut Self {
        self.start_enabled = enabled;
        self
    }

    pub fn start_enabled(&self) -> bool {
        self.start_enabled
    }

    /// Names of the shadow nodes referenced by this node's scene passes.
    pub fn shadow_node_references(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for target in &self.targets {
            for pass in &target.passes {
                if let PassKindDef::Scene(scene) = &pass.kind {
                    if let Some(name) = scene.shadow_node.as_deref() {
                        if !names.contains(&name) {
                            names.push(name);
                        }
                    }
                }
            }
        }
        names
    }
}

/// A live node inside a workspace.
#[derive(Debug)]
pub struct Node {
    name: String,
    def: Arc<NodeDef>,
    enabled: bool,
    inputs: Vec<ResourceChannel>,
    num_connected_inputs: usize,
    locals: Vec<ResourceChannel>,
    outputs: Vec<ResourceChannel>,
    input_buffers: Vec<Option<BufferId>>,
    num_connected_buffer_inputs: usize,
    local_buffers: BufferMap,
    output_buffers: Vec<Option<BufferId>>,
    connected_nodes: Vec<NodeId>,
    passes: Vec<Pass>,
}

impl Node {
    /// Creates the node's local textures and buffers. No inputs are bound yet.
    pub(crate) fn new(
        name: &str,
        def: Arc<NodeDef>,
        final_target: &RenderTargetInfo,
        rs: &dyn RenderSystem,
    ) -> Result<Node> {
        let mut locals = texture_def::create_textures(def.textures.texture_definitions(), final_target, rs)?;
        let mut local_buffers = BufferMap::new();
        if let Err(err) =
            texture_def::create_buffers(def.textures.buffer_definitions(), &mut local_buffers, final_target, rs)
        {
            texture_def::destroy_textures(&mut locals, rs);
            texture_def::destroy_buffers(def.textures.buffer_definitions(), &mut local_buffers, rs);
            return Err(err);
        }
        log::debug!("created node '{}' ({} local textures)", name, locals.len());
        let mut node = Node {
            name: name.to_string(),
            enabled: def.start_enabled,
            inputs: vec![ResourceChannel::invalid(); def.num_inputs],
            num_connected_inputs: 0,
            locals,
            outputs: vec![ResourceChannel::invalid(); def.output_channels.len()],
            input_buffers: vec![None; def.buffer_inputs.len()],
            num_connected_buffer_inputs: 0,
            local_buffers,
            output_buffers: vec![None; def.output_buffers.len()],
            connected_nodes: Vec::new(),
            passes: Vec::new(),
            def,
        };
        node.route_outputs();
        Ok(node)
    }

    /// Alias of this node in its workspace.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &Arc<NodeDef> {
        &self.def
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn inputs(&self) -> &[ResourceChannel] {
        &self.inputs
    }

    pub fn local_textures(&self) -> &[ResourceChannel] {
        &self.locals
    }

    pub fn outputs(&self) -> &[ResourceChannel] {
        &self.outputs
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn connected_nodes(&self) -> &[NodeId] {
        &self.connected_nodes
    }

    pub fn are_all_inputs_connected(&self) -> bool {
        self.num_connected_inputs == self.inputs.len()
            && self.num_connected_buffer_inputs == self.input_buffers.len()
    }

    /// Indices of input channels that are still unbound.
    pub fn disconnected_inputs(&self) -> Vec<usize> {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_valid())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn disconnected_buffer_inputs(&self) -> Vec<usize> {
        self.input_buffers
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// Binds input `index`. A second binding of the same input replaces the first.
    pub(crate) fn connect_input(&mut self, index: usize, channel: ResourceChannel) -> Result<()> {
        let slot = self.inputs.get_mut(index).ok_or_else(|| {
            CompositorError::NotFound(format!(
                "node '{}' has no input channel #{} ({} declared)",
                self.name,
                index,
                self.def.num_inputs
            ))
        })?;
        if slot.is_valid() {
            log::warn!(
                "input channel #{} of node '{}' is connected more than once; the last connection wins",
                index,
                self.name
            );
        } else {
            self.num_connected_inputs += 1;
        }
        *slot = channel;
        if self.are_all_inputs_connected() {
            self.route_outputs();
        }
        Ok(())
    }

    pub(crate) fn connect_buffer_input(&mut self, index: usize, buffer: BufferId) -> Result<()> {
        let slot = self.input_buffers.get_mut(index).ok_or_else(|| {
            CompositorError::NotFound(format!(
                "node '{}' has no input buffer #{}",
                self.name, index
            ))
        })?;
        if slot.is_some() {
            log::warn!(
                "input buffer #{} of node '{}' is connected more than once; the last connection wins",
                index,
                self.name
            );
        } else {
            self.num_connected_buffer_inputs += 1;
        }
        *slot = Some(buffer);
        if self.are_all_inputs_connected() {
            self.route_outputs();
        }
        Ok(())
    }

    /// Binds this node's output `out_channel` into `dst`'s input `in_channel`.
    pub(crate) fn connect_to(
        &mut self,
        out_channel: usize,
        dst: &mut Node,
        dst_id: NodeId,
        in_channel: usize,
    ) -> Result<()> {
        let channel = self.outputs.get(out_channel).cloned().ok_or_else(|| {
            CompositorError::NotFound(format!(
                "node '{}' has no output channel #{}",
                self.name, out_channel
            ))
        })?;
        dst.connect_input(in_channel, channel)?;
        if !self.connected_nodes.contains(&dst_id) {
            self.connected_nodes.push(dst_id);
        }
        Ok(())
    }

    pub(crate) fn connect_buffer_to(
        &mut self,
        out_channel: usize,
        dst: &mut Node,
        dst_id: NodeId,
        in_channel: usize,
    ) -> Result<()> {
        let buffer = self.output_buffers.get(out_channel).copied().flatten().ok_or_else(|| {
            CompositorError::NotFound(format!(
                "node '{}' has no bound output buffer #{}",
                self.name, out_channel
            ))
        })?;
        dst.connect_buffer_input(in_channel, buffer)?;
        if !self.connected_nodes.contains(&dst_id) {
            self.connected_nodes.push(dst_id);
        }
        Ok(())
    }

    pub(crate) fn connect_external_rt(&mut self, channel: ResourceChannel, in_channel: usize) -> Result<()> {
        self.connect_input(in_channel, channel)
    }

    pub(crate) fn connect_external_buffer(&mut self, buffer: BufferId, in_channel: usize) -> Result<()> {
        self.connect_buffer_input(in_channel, buffer)
    }

    /// Recomputes outputs from the output mapping: locals by index, inputs passed through.
    pub(crate) fn route_outputs(&mut self) {
        self.outputs = self
            .def
            .output_channels
            .iter()
            .map(|source| match source {
                Some(TextureSource {
                    kind: TextureSourceKind::Local,
                    index,
                }) => self.locals.get(*index).cloned().unwrap_or_default(),
                Some(TextureSource {
                    kind: TextureSourceKind::Input,
                    index,
                }) => self.inputs.get(*index).cloned().unwrap_or_default(),
                _ => ResourceChannel::invalid(),
            })
            .collect();
        self.output_buffers = self
            .def
            .output_buffers
            .iter()
            .map(|name| name.as_deref().and_then(|n| self.own_buffer(n)))
            .collect();
    }

    fn own_buffer(&self, name: &str) -> Option<BufferId> {
        match self.def.buffer_inputs.iter().position(|n| n == name) {
            Some(index) => self.input_buffers.get(index).copied().flatten(),
            None => self.local_buffers.get(name).copied(),
        }
    }

    /// Channel bound to `name`: an input, a local texture or a workspace global.
    pub fn defined_channel(&self, name: &str, globals: &GlobalResources) -> Result<ResourceChannel> {
        let source = self.def.textures.texture_source(name)?;
        let channel = match source.kind {
            TextureSourceKind::Input => self.inputs.get(source.index).cloned(),
            TextureSourceKind::Local => self.locals.get(source.index).cloned(),
            TextureSourceKind::Global => Some(globals.channel(name)?),
        };
        channel.ok_or_else(|| {
            CompositorError::NotFound(format!("texture '{}' in node '{}'", name, self.name))
        })
    }

    /// Texture `mrt_index` of the channel named `name`. An index past the last texture is
    /// clamped to it.
    pub fn get_defined_texture(
        &self,
        name: &str,
        mrt_index: usize,
        globals: &GlobalResources,
    ) -> Result<TextureId> {
        let channel = self.defined_channel(name, globals)?;
        let Some(last) = channel.textures.len().checked_sub(1) else {
            return Err(CompositorError::AmbiguousRenderWindowUse(format!(
                "'{}' in node '{}' is bound to a render window",
                name, self.name
            )));
        };
        Ok(channel.textures[mrt_index.min(last)])
    }

    /// Buffer named `name`: an input buffer, a local buffer or a workspace global.
    pub fn get_defined_buffer(&self, name: &str, globals: &GlobalResources) -> Result<BufferId> {
        if let Some(index) = self.def.buffer_inputs.iter().position(|n| n == name) {
            return self.input_buffers.get(index).copied().flatten().ok_or_else(|| {
                CompositorError::InvalidState(format!(
                    "input buffer '{}' of node '{}' is not connected",
                    name, self.name
                ))
            });
        }
        if let Some(buffer) = self.local_buffers.get(name) {
            return Ok(*buffer);
        }
        globals.buffers.get(name).copied().ok_or_else(|| {
            CompositorError::NotFound(format!("buffer '{}' in node '{}'", name, self.name))
        })
    }

    /// Instantiates every pass definition against the now-resolved channels, then assigns the
    /// begin/end update brackets.
    pub(crate) fn create_passes(&mut self, env: &SetupEnv<'_>, mut scope: ShadowScope<'_>) -> Result<()> {
        self.destroy_all_passes();
        let mut passes = Vec::new();
        for target in &self.def.targets {
            let channel = self.defined_channel(&target.render_target_name, env.globals)?;
            for def in &target.passes {
                passes.push(Pass::new(
                    Arc::clone(def),
                    channel.clone(),
                    target.rt_index,
                    self,
                    env,
                    scope.reborrow(),
                )?);
            }
        }
        pass::assign_update_brackets(&mut passes);
        self.passes = passes;
        Ok(())
    }

    pub(crate) fn destroy_all_passes(&mut self) {
        for pass in &mut self.passes {
            pass.destroy();
        }
        self.passes.clear();
    }

    pub(crate) fn passes_mut(&mut self) -> &mut [Pass] {
        &mut self.passes
    }

    /// Unbinds every input (texture and buffer) and re-routes; passes targeting an input are
    /// cleared.
    pub(crate) fn notify_cleared(&mut self) {
        for input in &self.inputs {
            if input.is_valid() {
                for pass in self.passes.iter_mut().filter(|p| p.target() == input) {
                    pass.notify_cleared();
                }
            }
        }
        self.inputs.iter_mut().for_each(|c| *c = ResourceChannel::invalid());
        self.num_connected_inputs = 0;
        self.input_buffers.iter_mut().for_each(|b| *b = None);
        self.num_connected_buffer_inputs = 0;
        self.connected_nodes.clear();
        self.route_outputs();
    }

    /// Replaces `old` wherever this node holds it. Returns whether an input was replaced, in
    /// which case nodes downstream may hold it too.
    pub(crate) fn notify_recreated(&mut self, old: &ResourceChannel, new: &ResourceChannel, rs: &dyn RenderSystem) -> bool {
        let mut replaced = false;
        for input in self.inputs.iter_mut().filter(|c| *c == old && c.is_valid()) {
            *input = new.clone();
            replaced = true;
        }
        if replaced {
            self.route_outputs();
        }
        for pass in &mut self.passes {
            pass.notify_recreated(old, new, rs);
        }
        replaced
    }

    pub(crate) fn notify_recreated_buffer(&mut self, old: BufferId, new: BufferId) -> bool {
        let mut replaced = false;
        for input in self.input_buffers.iter_mut().filter(|b| **b == Some(old)) {
            *input = Some(new);
            replaced = true;
        }
        if replaced {
            self.route_outputs();
        }
        for pass in &mut self.passes {
            pass.notify_recreated_buffer(old, new);
        }
        replaced
    }

    /// `channel` is gone: drop it from inputs and passes. Returns whether an input held it.
    pub(crate) fn notify_destroyed(&mut self, channel: &ResourceChannel) -> bool {
        if !channel.is_valid() {
            return false;
        }
        let mut dropped = false;
        for input in self.inputs.iter_mut().filter(|c| *c == channel) {
            *input = ResourceChannel::invalid();
            self.num_connected_inputs -= 1;
            dropped = true;
        }
        for pass in &mut self.passes {
            pass.notify_destroyed(channel);
        }
        self.route_outputs();
        dropped
    }

    pub(crate) fn notify_destroyed_buffer(&mut self, buffer: BufferId) -> bool {
        let mut dropped = false;
        for input in self.input_buffers.iter_mut().filter(|b| **b == Some(buffer)) {
            *input = None;
            self.num_connected_buffer_inputs -= 1;
            dropped = true;
        }
        for pass in &mut self.passes {
            pass.notify_destroyed_buffer(buffer);
        }
        self.route_outputs();
        dropped
    }

    pub(crate) fn local_buffers(&self) -> Vec<BufferId> {
        self.local_buffers.values().copied().collect()
    }

    /// Recreates relatively sized locals and buffers. Own passes are updated here; the returned
    /// swaps must be forwarded to the connected nodes.
    pub(crate) fn final_target_resized(
        &mut self,
        final_target: &RenderTargetInfo,
        rs: &dyn RenderSystem,
    ) -> Result<(Vec<ChannelSwap>, Vec<BufferSwap>)> {
        let swaps = texture_def::recreate_resizable_textures(
            self.def.textures.texture_definitions(),
            &mut self.locals,
            final_target,
            rs,
        )?;
        let buffer_swaps = texture_def::recreate_resizable_buffers(
            self.def.textures.buffer_definitions(),
            &mut self.local_buffers,
            final_target,
            rs,
        )?;
        for swap in &swaps {
            for pass in &mut self.passes {
                pass.notify_recreated(&swap.old, &swap.new, rs);
            }
        }
        for swap in &buffer_swaps {
            for pass in &mut self.passes {
                pass.notify_recreated_buffer(swap.old, swap.new);
            }
        }
        self.route_outputs();
        Ok((swaps, buffer_swaps))
    }

    /// Runs every pass whose execution mask overlaps the context's.
    pub(crate) fn update(
        &mut self,
        ctx: &PassContext<'_>,
        shadow_nodes: &mut [ShadowNode],
        lod_camera: Option<CameraId>,
    ) {
        for pass in &mut self.passes {
            if pass.definition().execution_mask & ctx.execution_mask != 0 {
                pass.execute(ctx, shadow_nodes, lod_camera);
            }
        }
    }

    pub(crate) fn place_barriers(
        &mut self,
        state: &mut BarrierState,
        shadow_nodes: &mut [ShadowNode],
        rs: &dyn RenderSystem,
    ) -> Result<()> {
        for pass in &mut self.passes {
            pass.place_barriers(state, shadow_nodes, rs, &self.name)?;
        }
        Ok(())
    }

    /// Destroys passes, local textures and local buffers.
    pub(crate) fn destroy(&mut self, rs: &dyn RenderSystem) {
        self.destroy_all_passes();
        texture_def::destroy_textures(&mut self.locals, rs);
        texture_def::destroy_buffers(self.def.textures.buffer_definitions(), &mut self.local_buffers, rs);
        self.route_outputs();
        log::debug!("destroyed node '{}'", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lume_rhi::headless::HeadlessRenderSystem;
    use lume_rhi::PixelFormat;

    fn final_info() -> RenderTargetInfo {
        RenderTargetInfo {
            width: 800,
            height: 600,
            format: PixelFormat::Bgra8Unorm,
            fsaa: 1,
            hw_gamma_write: false,
            is_window: true,
            depth_buffer_pool: 1,
        }
    }

    fn passthrough_def() -> Arc<NodeDef> {
        let mut def = NodeDef::new("Blur");
        def.add_input_channel("rt_input").unwrap();
        def.add_texture_definition("tmp").unwrap();
        def.add_texture_definition("gbuffer")
            .unwrap()
            .mrt_formats(&[PixelFormat::Rgba8Unorm, PixelFormat::Rgba16Float]);
        def.map_output_channel(0, "tmp").unwrap();
        def.map_output_channel(1, "rt_input").unwrap();
        Arc::new(def)
    }

    #[test]
    fn outputs_route_locals_and_inputs() {
        let rs = HeadlessRenderSystem::new();
        let mut node = Node::new("Blur", passthrough_def(), &final_info(), &rs).unwrap();
        assert!(node.outputs()[0].is_valid());
        assert!(!node.outputs()[1].is_valid());
        assert!(!node.are_all_inputs_connected());

        let window = rs.create_window(800, 600, PixelFormat::Bgra8Unorm);
        node.connect_input(0, ResourceChannel::window(window)).unwrap();
        assert!(node.are_all_inputs_connected());
        assert_eq!(node.outputs()[1], ResourceChannel::window(window));
        assert!(matches!(
            node.connect_input(3, ResourceChannel::window(window)),
            Err(CompositorError::NotFound(_))
        ));
        node.destroy(&rs);
        assert_eq!(rs.live_textures(), 0);
    }

    #[test]
    fn second_connection_wins_without_double_counting() {
        let rs = HeadlessRenderSystem::new();
        let mut node = Node::new("Blur", passthrough_def(), &final_info(), &rs).unwrap();
        let a = rs.create_window(8, 8, PixelFormat::Bgra8Unorm);
        let b = rs.create_window(8, 8, PixelFormat::Bgra8Unorm);
        node.connect_input(0, ResourceChannel::window(a)).unwrap();
        node.connect_input(0, ResourceChannel::window(b)).unwrap();
        assert_eq!(node.num_connected_inputs, 1);
        assert_eq!(node.inputs()[0], ResourceChannel::window(b));
        node.notify_cleared();
        assert_eq!(node.num_connected_inputs, 0);
        assert!(!node.outputs()[1].is_valid());
    }

    #[test]
    fn defined_texture_clamps_and_rejects_windows() {
        let rs = HeadlessRenderSystem::new();
        let globals = GlobalResources::default();
        let mut node = Node::new("Blur", passthrough_def(), &final_info(), &rs).unwrap();
        let gbuffer = node.local_textures()[1].textures.clone();
        assert_eq!(node.get_defined_texture("gbuffer", 1, &globals).unwrap(), gbuffer[1]);
        assert_eq!(node.get_defined_texture("gbuffer", 9, &globals).unwrap(), gbuffer[1]);

        let window = rs.create_window(8, 8, PixelFormat::Bgra8Unorm);
        node.connect_input(0, ResourceChannel::window(window)).unwrap();
        assert!(matches!(
            node.get_defined_texture("rt_input", 0, &globals),
            Err(CompositorError::AmbiguousRenderWindowUse(_))
        ));
        assert!(matches!(
            node.get_defined_texture("missing", 0, &globals),
            Err(CompositorError::NotFound(_))
        ));
    }

    #[test]
    fn destroyed_input_is_unbound_and_no_longer_routed() {
        let rs = HeadlessRenderSystem::new();
        let mut node = Node::new("Blur", passthrough_def(), &final_info(), &rs).unwrap();
        let window = rs.create_window(8, 8, PixelFormat::Bgra8Unorm);
        let other = rs.create_window(8, 8, PixelFormat::Bgra8Unorm);
        node.connect_input(0, ResourceChannel::window(window)).unwrap();

        assert!(!node.notify_destroyed(&ResourceChannel::window(other)));
        assert!(node.are_all_inputs_connected());
        assert!(node.notify_destroyed(&ResourceChannel::window(window)));
        assert!(!node.are_all_inputs_connected());
        assert_eq!(node.disconnected_inputs(), vec![0]);
        assert!(!node.outputs()[1].is_valid());
        assert!(node.outputs()[0].is_valid());
    }

    #[test]
    fn globals_cannot_be_outputs() {
        let mut def = NodeDef::new("N");
        assert!(matches!(
            def.map_output_channel(0, "global_shadow"),
            Err(CompositorError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            def.map_output_channel(0, "nothing"),
            Err(CompositorError::NotFound(_))
        ));
    }

    #[test]
    fn resize_recreates_relative_locals_only() {
        let rs = HeadlessRenderSystem::new();
        let mut def = NodeDef::new("N");
        def.add_texture_definition("relative").unwrap();
        def.add_texture_definition("fixed").unwrap().size(256, 256);
        def.map_output_channel(0, "relative").unwrap();
        let mut node = Node::new("N", Arc::new(def), &final_info(), &rs).unwrap();
        let before = node.local_textures().to_vec();

        let mut bigger = final_info();
        bigger.width = 1600;
        bigger.height = 900;
        let (swaps, buffers) = node.final_target_resized(&bigger, &rs).unwrap();
        assert_eq!(swaps.len(), 1);
        assert!(buffers.is_empty());
        assert_eq!(swaps[0].old, before[0]);
        assert_eq!(node.local_textures()[1], before[1]);
        assert_eq!(node.outputs()[0], swaps[0].new);
        let desc = rs.texture_desc(swaps[0].new.textures[0]).unwrap();
        assert_eq!((desc.width, desc.height), (1600, 900));
    }
}
