//! Passes: the atomic units of compositor work.
//!
//! [`PassDef`] is the shared, read-only blueprint stored in a node definition; [`Pass`] is the
//! live instance bound to a target channel and a viewport. Variants form a closed set
//! ([`PassKindDef`]); only [`PassType::Custom`] is extensible, through a registered
//! [`CompositorPassProvider`].

mod barrier;
mod clear;
mod compute;
mod custom;
mod depth_copy;
mod mipmap;
mod quad;
mod resolve;
mod scene;
mod stencil;
mod uav;

use std::sync::Arc;

use lume_rhi::{
    BufferId, GpuResource, RenderSystem, RenderTargetId, RenderTargetInfo, ResourceAccess,
    ResourceTransition, TextureId, UavBinding, ViewportDesc, ViewportId,
};
use render_api::{CameraId, SceneManager};

pub use barrier::{BarrierState, BoundUav};
pub use clear::ClearDef;
pub use compute::{ComputeDef, ComputeTextureSource, ComputeUavSource};
pub use custom::{CompositorPassProvider, CustomDef, CustomPass};
pub use depth_copy::DepthCopyDef;
pub use mipmap::{MipmapDef, MipmapMethod};
pub use quad::{FrustumCorners, QuadDef, QuadTextureSource};
pub use resolve::ResolveDef;
pub use scene::{SceneDef, ShadowNodeRecalculation};
pub use stencil::StencilDef;
pub use uav::{UavBufferSource, UavDef, UavTextureSource};

pub(crate) use scene::ScenePass;

use crate::channel::ResourceChannel;
use crate::config::CompositorConfig;
use crate::error::{CompositorError, Result};
use crate::listener::WorkspaceListener;
use crate::node::{Node, ShadowNode, ShadowNodes};
use crate::viewport::{self, ViewportModifier};
use crate::workspace::GlobalResources;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassType {
    Scene,
    Quad,
    Clear,
    Stencil,
    Resolve,
    DepthCopy,
    Uav,
    Mipmap,
    Compute,
    Custom,
}

impl PassType {
    /// Passes that write their target and therefore take part in begin/end update chains.
    pub fn writes_target(&self) -> bool {
        matches!(
            self,
            PassType::Scene | PassType::Quad | PassType::Clear | PassType::Resolve | PassType::Custom
        )
    }
}

/// A UAV slot a pass reads or writes, resolved through the slots bound by UAV passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UavDependency {
    pub slot: u32,
    pub access: ResourceAccess,
    pub allow_write_after_write: bool,
}

#[derive(Debug, Clone)]
pub enum PassKindDef {
    Scene(SceneDef),
    Quad(QuadDef),
    Clear(ClearDef),
    Stencil(StencilDef),
    Resolve(ResolveDef),
    DepthCopy(DepthCopyDef),
    Uav(UavDef),
    Mipmap(MipmapDef),
    Compute(ComputeDef),
    Custom(CustomDef),
}

impl PassKindDef {
    pub fn pass_type(&self) -> PassType {
        match self {
            PassKindDef::Scene(_) => PassType::Scene,
            PassKindDef::Quad(_) => PassType::Quad,
            PassKindDef::Clear(_) => PassType::Clear,
            PassKindDef::Stencil(_) => PassType::Stencil,
            PassKindDef::Resolve(_) => PassType::Resolve,
            PassKindDef::DepthCopy(_) => PassType::DepthCopy,
            PassKindDef::Uav(_) => PassType::Uav,
            PassKindDef::Mipmap(_) => PassType::Mipmap,
            PassKindDef::Compute(_) => PassType::Compute,
            PassKindDef::Custom(_) => PassType::Custom,
        }
    }
}

/// Shared pass blueprint.
#[derive(Debug, Clone)]
pub struct PassDef {
    /// User value forwarded to listeners.
    pub identifier: u32,
    /// Normalised viewport, scissor and overlay flag.
    pub viewport: ViewportDesc,
    /// How many times the pass runs over the workspace lifetime. `None` is unlimited.
    pub num_initial_passes: Option<u32>,
    pub execution_mask: u8,
    pub viewport_modifier_mask: u8,
    pub uav_dependencies: Vec<UavDependency>,
    pub kind: PassKindDef,
}

impl PassDef {
    pub fn new(kind: PassKindDef) -> Self {
        Self {
            identifier: 0,
            viewport: ViewportDesc::default(),
            num_initial_passes: None,
            execution_mask: 0xFF,
            viewport_modifier_mask: 0xFF,
            uav_dependencies: Vec::new(),
            kind,
        }
    }

    pub fn pass_type(&self) -> PassType {
        self.kind.pass_type()
    }

    pub fn set_viewport(&mut self, left: f32, top: f32, width: f32, height: f32) -> &mut Self {
        self.viewport.left = left;
        self.viewport.top = top;
        self.viewport.width = width;
        self.viewport.height = height;
        self
    }

    pub fn set_num_initial_passes(&mut self, passes: u32) -> &mut Self {
        self.num_initial_passes = Some(passes);
        self
    }

    pub fn add_uav_dependency(
        &mut self,
        slot: u32,
        access: ResourceAccess,
        allow_write_after_write: bool,
    ) -> &mut Self {
        self.uav_dependencies.push(UavDependency {
            slot,
            access,
            allow_write_after_write,
        });
        self
    }
}

/// Pass lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    /// Viewport resolved, not executed yet.
    Constructed,
    Active,
    /// Target dropped by graph rewiring or destruction of the channel.
    Cleared,
    Destroyed,
}

/// Everything pass creation needs from the owning workspace.
#[derive(Clone, Copy)]
pub(crate) struct SetupEnv<'a> {
    pub rs: &'a dyn RenderSystem,
    pub scene_manager: &'a dyn SceneManager,
    pub globals: &'a GlobalResources,
    pub final_target: &'a RenderTargetInfo,
    pub default_camera: CameraId,
    pub viewport_modifier: ViewportModifier,
    pub viewport_modifier_mask: u8,
    pub provider: Option<&'a dyn CompositorPassProvider>,
    pub config: &'a CompositorConfig,
}

/// Where scene passes find shadow nodes while being created.
pub(crate) enum ShadowScope<'s> {
    /// A regular node: shadow nodes are looked up (or instantiated) in the workspace.
    Workspace(&'s mut ShadowNodes),
    /// A pass inside a shadow node: shadow-map passes use these cameras.
    ShadowNode { cameras: &'s [CameraId] },
}

impl ShadowScope<'_> {
    pub(crate) fn reborrow(&mut self) -> ShadowScope<'_> {
        match self {
            ShadowScope::Workspace(nodes) => ShadowScope::Workspace(nodes),
            ShadowScope::ShadowNode { cameras } => ShadowScope::ShadowNode { cameras },
        }
    }
}

/// Per-frame execution context handed to every pass.
pub struct PassContext<'a> {
    pub render_system: &'a dyn RenderSystem,
    pub scene_manager: &'a dyn SceneManager,
    pub listeners: &'a [Arc<dyn WorkspaceListener>],
    pub frame_count: u64,
    pub execution_mask: u8,
}

/// A texture input sampled by a pass, kept as a channel so recreation can swap it.
#[derive(Debug, Clone)]
pub(crate) struct BoundTexture {
    pub unit: u32,
    pub channel: ResourceChannel,
    pub mrt_index: usize,
}

impl BoundTexture {
    pub(crate) fn resolve(
        node: &Node,
        globals: &GlobalResources,
        name: &str,
        unit: u32,
        mrt_index: usize,
    ) -> Result<Self> {
        node.get_defined_texture(name, mrt_index, globals)?;
        Ok(Self {
            unit,
            channel: node.defined_channel(name, globals)?,
            mrt_index,
        })
    }

    pub(crate) fn texture(&self) -> Option<TextureId> {
        let last = self.channel.textures.len().checked_sub(1)?;
        self.channel.textures.get(self.mrt_index.min(last)).copied()
    }

    pub(crate) fn notify_recreated(&mut self, old: &ResourceChannel, new: &ResourceChannel) {
        if self.channel == *old {
            self.channel = new.clone();
        }
    }

    pub(crate) fn notify_destroyed(&mut self, channel: &ResourceChannel) {
        if self.channel == *channel {
            self.channel = ResourceChannel::invalid();
        }
    }
}

/// A texture or buffer reachable through a UAV slot.
#[derive(Debug, Clone)]
pub(crate) enum UavResource {
    Texture {
        texture: BoundTexture,
        mip: u8,
    },
    Buffer {
        buffer: BufferId,
        offset: u64,
        size: u64,
    },
}

impl UavResource {
    pub(crate) fn gpu_resource(&self) -> Option<GpuResource> {
        match self {
            UavResource::Texture { texture, .. } => texture.texture().map(GpuResource::Texture),
            UavResource::Buffer { buffer, .. } => Some(GpuResource::Buffer(*buffer)),
        }
    }

    pub(crate) fn binding(&self, access: ResourceAccess) -> Option<UavBinding> {
        match self {
            UavResource::Texture { texture, mip } => texture.texture().map(|t| UavBinding::Texture {
                texture: t,
                mip: *mip,
                access,
            }),
            UavResource::Buffer {
                buffer,
                offset,
                size,
            } => Some(UavBinding::Buffer {
                buffer: *buffer,
                offset: *offset,
                size: *size,
                access,
            }),
        }
    }

    pub(crate) fn notify_recreated(&mut self, old: &ResourceChannel, new: &ResourceChannel) {
        if let UavResource::Texture { texture, .. } = self {
            texture.notify_recreated(old, new);
        }
    }

    pub(crate) fn notify_recreated_buffer(&mut self, old: BufferId, new: BufferId) {
        if let UavResource::Buffer { buffer, .. } = self {
            if *buffer == old {
                *buffer = new;
            }
        }
    }
}

pub(crate) enum PassKind {
    Scene(scene::ScenePass),
    Quad(quad::QuadPass),
    Clear,
    Stencil,
    Resolve(resolve::ResolvePass),
    DepthCopy(depth_copy::DepthCopyPass),
    Uav(uav::UavPass),
    Mipmap,
    Compute(compute::ComputePass),
    Custom(Box<dyn CustomPass>),
}

/// Live pass instance owned by a node.
pub struct Pass {
    def: Arc<PassDef>,
    target: ResourceChannel,
    rt_index: u32,
    render_target: Option<RenderTargetId>,
    viewport_desc: ViewportDesc,
    viewport: Option<ViewportId>,
    num_passes_left: Option<u32>,
    pub(crate) begin_rt_update: bool,
    pub(crate) end_rt_update: bool,
    transitions: Vec<ResourceTransition>,
    state: PassState,
    kind: PassKind,
}

impl std::fmt::Debug for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pass")
            .field("type", &self.def.pass_type())
            .field("identifier", &self.def.identifier)
            .field("target", &self.target)
            .field("state", &self.state)
            .finish()
    }
}

/// Render target for `rt_index` of `target`: the channel's own target for index 0, otherwise
/// the texture slice (cube face, array layer or depth slice).
fn resolve_render_target(
    rs: &dyn RenderSystem,
    target: &ResourceChannel,
    rt_index: u32,
) -> Result<RenderTargetId> {
    let rt = target
        .target
        .ok_or_else(|| CompositorError::InvalidState("pass target channel is not bound".into()))?;
    if rt_index == 0 {
        return Ok(rt);
    }
    if target.textures.len() != 1 {
        return Err(CompositorError::UnsupportedOperation(format!(
            "slice {} requested on a target with {} textures",
            rt_index,
            target.textures.len()
        )));
    }
    let texture = target.textures[0];
    let desc = rs.texture_desc(texture)?;
    if rt_index >= desc.num_slices() {
        return Err(CompositorError::UnsupportedOperation(format!(
            "slice {} requested but texture '{}' only has {}",
            rt_index,
            desc.label,
            desc.num_slices()
        )));
    }
    Ok(rs.texture_render_target(texture, rt_index)?)
}

impl Pass {
    pub(crate) fn new(
        def: Arc<PassDef>,
        target: ResourceChannel,
        rt_index: u32,
        node: &Node,
        env: &SetupEnv<'_>,
        scope: ShadowScope<'_>,
    ) -> Result<Pass> {
        let render_target = resolve_render_target(env.rs, &target, rt_index)?;
        let modifier = (def.viewport_modifier_mask & env.viewport_modifier_mask != 0)
            .then_some(env.viewport_modifier);
        let viewport_desc = viewport::apply_modifier(&def.viewport, modifier);
        let viewport = viewport::find_or_create(env.rs, render_target, &viewport_desc)?;

        let kind = match &def.kind {
            PassKindDef::Scene(scene) => PassKind::Scene(ScenePass::new(scene, env, scope)?),
            PassKindDef::Quad(quad) => PassKind::Quad(quad::QuadPass::new(quad, node, env)?),
            PassKindDef::Clear(_) => PassKind::Clear,
            PassKindDef::Stencil(_) => PassKind::Stencil,
            PassKindDef::Resolve(resolve) => {
                PassKind::Resolve(resolve::ResolvePass::new(resolve, node, env)?)
            }
            PassKindDef::DepthCopy(copy) => {
                PassKind::DepthCopy(depth_copy::DepthCopyPass::new(copy, node, env)?)
            }
            PassKindDef::Uav(uav) => PassKind::Uav(uav::UavPass::new(uav, node, env)?),
            PassKindDef::Mipmap(_) => {
                if target.textures.is_empty() {
                    return Err(CompositorError::AmbiguousRenderWindowUse(format!(
                        "mipmap pass in node '{}' targets a window",
                        node.name()
                    )));
                }
                PassKind::Mipmap
            }
            PassKindDef::Compute(compute) => {
                PassKind::Compute(compute::ComputePass::new(compute, node, env)?)
            }
            PassKindDef::Custom(custom) => {
                let provider = env.provider.ok_or_else(|| {
                    CompositorError::InvalidState(
                        "using custom compositor passes but no provider is set".into(),
                    )
                })?;
                PassKind::Custom(provider.create_pass(custom, node.name())?)
            }
        };

        Ok(Pass {
            num_passes_left: def.num_initial_passes,
            def,
            target,
            rt_index,
            render_target: Some(render_target),
            viewport_desc,
            viewport: Some(viewport),
            begin_rt_update: true,
            end_rt_update: true,
            transitions: Vec::new(),
            state: PassState::Constructed,
            kind,
        })
    }

    pub fn definition(&self) -> &PassDef {
        &self.def
    }

    pub fn pass_type(&self) -> PassType {
        self.def.pass_type()
    }

    pub fn target(&self) -> &ResourceChannel {
        &self.target
    }

    pub fn render_target(&self) -> Option<RenderTargetId> {
        self.render_target
    }

    pub fn viewport(&self) -> Option<ViewportId> {
        self.viewport
    }

    /// Effective normalised viewport after the workspace modifier.
    pub fn viewport_desc(&self) -> &ViewportDesc {
        &self.viewport_desc
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn num_passes_left(&self) -> Option<u32> {
        self.num_passes_left
    }

    pub fn begins_update(&self) -> bool {
        self.begin_rt_update
    }

    pub fn ends_update(&self) -> bool {
        self.end_rt_update
    }

    /// Transitions replayed before the pass's work, as computed by the last barrier placement.
    pub fn resource_transitions(&self) -> &[ResourceTransition] {
        &self.transitions
    }

    /// Camera of a scene pass.
    pub fn camera(&self) -> Option<CameraId> {
        match &self.kind {
            PassKind::Scene(scene) => Some(scene.camera),
            _ => None,
        }
    }

    /// Whether a scene pass with a shadow node triggers its recalculation.
    pub fn updates_shadow_node(&self) -> Option<bool> {
        match &self.kind {
            PassKind::Scene(scene) if scene.shadow_node.is_some() => Some(scene.update_shadow_node),
            _ => None,
        }
    }

    pub(crate) fn scene_mut(&mut self) -> Option<&mut ScenePass> {
        match &mut self.kind {
            PassKind::Scene(scene) => Some(scene),
            _ => None,
        }
    }

    /// Resets the repeat budget to the definition's count.
    pub fn reset_num_passes_left(&mut self) {
        self.num_passes_left = self.def.num_initial_passes;
    }

    pub(crate) fn execute(
        &mut self,
        ctx: &PassContext<'_>,
        shadow_nodes: &mut [ShadowNode],
        lod_camera: Option<CameraId>,
    ) {
        let (Some(rt), Some(viewport)) = (self.render_target, self.viewport) else {
            return;
        };
        if matches!(self.state, PassState::Cleared | PassState::Destroyed) {
            return;
        }
        if let Some(left) = self.num_passes_left.as_mut() {
            if *left == 0 {
                return;
            }
            *left -= 1;
        }
        self.state = PassState::Active;
        log::trace!("executing {:?} pass on {:?}", self.def.pass_type(), rt);

        for listener in ctx.listeners {
            listener.pass_early_pre_execute(self);
        }
        if let PassKind::Scene(scene) = &self.kind {
            scene.update_shadow_node(ctx, shadow_nodes, lod_camera);
        }
        if self.begin_rt_update {
            ctx.render_system.begin_update(rt);
        }
        ctx.render_system.execute_resource_transitions(&self.transitions);
        for listener in ctx.listeners {
            listener.pass_pre_execute(self);
        }

        let target = &self.target;
        let result = match &mut self.kind {
            PassKind::Scene(scene) => {
                scene.execute(ctx, shadow_nodes, lod_camera, &self.def, rt, viewport)
            }
            PassKind::Quad(quad) => quad.execute(ctx, &self.def, rt, viewport),
            PassKind::Clear => clear::execute(ctx, &self.def, rt, viewport),
            PassKind::Stencil => stencil::execute(ctx, &self.def),
            PassKind::Resolve(resolve) => resolve.execute(ctx, rt),
            PassKind::DepthCopy(copy) => copy.execute(ctx),
            PassKind::Uav(uav) => uav.execute(ctx),
            PassKind::Mipmap => mipmap::execute(ctx, &self.def, target),
            PassKind::Compute(compute) => compute.execute(ctx),
            PassKind::Custom(custom) => custom.execute(ctx, rt, viewport),
        };
        if let Err(err) = result {
            log::error!(
                "{:?} pass (id {}) failed: {}",
                self.def.pass_type(),
                self.def.identifier,
                err
            );
        }

        for listener in ctx.listeners {
            listener.pass_pos_execute(self);
        }
        if self.end_rt_update {
            ctx.render_system.end_update(rt);
        }
    }

    /// Recomputes this pass's transitions from `state` and advances `state` past the pass.
    pub(crate) fn place_barriers(
        &mut self,
        state: &mut BarrierState,
        shadow_nodes: &mut [ShadowNode],
        rs: &dyn RenderSystem,
        owner: &str,
    ) -> Result<()> {
        self.transitions.clear();
        if matches!(self.state, PassState::Cleared | PassState::Destroyed) {
            return Ok(());
        }
        let out = &mut self.transitions;
        match &self.kind {
            PassKind::Uav(uav) => return uav.emulate_binding(state),
            PassKind::Mipmap => {
                return mipmap::place_barriers(&self.def, &self.target, state, out, rs);
            }
            PassKind::DepthCopy(copy) => {
                copy.place_barriers(state, out);
                return Ok(());
            }
            PassKind::Compute(compute) => compute.place_barriers(state, out),
            PassKind::Scene(scene) => {
                scene.place_shadow_node_barriers(state, shadow_nodes, rs)?;
                for resource in self.target.written_resources() {
                    state.require_render_target(out, resource);
                }
                scene.require_shadow_maps(state, out, shadow_nodes);
            }
            PassKind::Quad(quad) => {
                for resource in self.target.written_resources() {
                    state.require_render_target(out, resource);
                }
                quad.require_inputs(state, out);
            }
            PassKind::Resolve(resolve) => {
                for resource in self.target.written_resources() {
                    state.require_render_target(out, resource);
                }
                resolve.require_source(state, out);
            }
            PassKind::Clear | PassKind::Stencil | PassKind::Custom(_) => {
                for resource in self.target.written_resources() {
                    state.require_render_target(out, resource);
                }
            }
        }
        state.require_uav_dependencies(out, &self.def.uav_dependencies, owner)
    }

    pub(crate) fn notify_recreated(
        &mut self,
        old: &ResourceChannel,
        new: &ResourceChannel,
        rs: &dyn RenderSystem,
    ) {
        if self.target == *old && old.is_valid() {
            self.target = new.clone();
            match resolve_render_target(rs, &self.target, self.rt_index).and_then(|rt| {
                let vp = viewport::find_or_create(rs, rt, &self.viewport_desc)?;
                Ok((rt, vp))
            }) {
                Ok((rt, vp)) => {
                    self.render_target = Some(rt);
                    self.viewport = Some(vp);
                }
                Err(err) => {
                    log::error!("pass lost its target after recreation: {}", err);
                    self.render_target = None;
                    self.viewport = None;
                    self.state = PassState::Cleared;
                }
            }
        }
        match &mut self.kind {
            PassKind::Quad(quad) => quad.notify_recreated(old, new),
            PassKind::Resolve(resolve) => resolve.source.notify_recreated(old, new),
            PassKind::DepthCopy(copy) => copy.notify_recreated(old, new),
            PassKind::Uav(uav) => uav.notify_recreated(old, new),
            PassKind::Compute(compute) => compute.notify_recreated(old, new),
            PassKind::Custom(custom) => custom.notify_recreated(old, new),
            PassKind::Scene(_) | PassKind::Clear | PassKind::Stencil | PassKind::Mipmap => {}
        }
    }

    pub(crate) fn notify_recreated_buffer(&mut self, old: BufferId, new: BufferId) {
        match &mut self.kind {
            PassKind::Uav(uav) => uav.notify_recreated_buffer(old, new),
            PassKind::Compute(compute) => compute.notify_recreated_buffer(old, new),
            _ => {}
        }
    }

    pub(crate) fn notify_destroyed(&mut self, channel: &ResourceChannel) {
        if self.target == *channel && channel.is_valid() {
            self.notify_cleared();
        }
        match &mut self.kind {
            PassKind::Quad(quad) => quad.notify_destroyed(channel),
            PassKind::Resolve(resolve) => resolve.source.notify_destroyed(channel),
            PassKind::DepthCopy(copy) => copy.notify_destroyed(channel),
            PassKind::Uav(uav) => uav.notify_destroyed(channel),
            PassKind::Compute(compute) => compute.notify_destroyed(channel),
            PassKind::Custom(custom) => custom.notify_destroyed(channel),
            PassKind::Scene(_) | PassKind::Clear | PassKind::Stencil | PassKind::Mipmap => {}
        }
    }

    pub(crate) fn notify_destroyed_buffer(&mut self, buffer: BufferId) {
        match &mut self.kind {
            PassKind::Uav(uav) => uav.notify_destroyed_buffer(buffer),
            PassKind::Compute(compute) => compute.notify_destroyed_buffer(buffer),
            _ => {}
        }
    }

    /// Drops the target reference; the pass no longer executes.
    pub(crate) fn notify_cleared(&mut self) {
        self.target = ResourceChannel::invalid();
        self.render_target = None;
        self.viewport = None;
        self.transitions.clear();
        self.state = PassState::Cleared;
    }

    pub(crate) fn destroy(&mut self) {
        self.notify_cleared();
        self.state = PassState::Destroyed;
    }
}

/// Marks the first pass of each run writing the same render target as beginning the update
/// and the last as ending it. Passes that do not write their target neither start nor break
/// a run.
pub(crate) fn assign_update_brackets(passes: &mut [Pass]) {
    let writers: Vec<usize> = passes
        .iter()
        .enumerate()
        .filter(|(_, p)| p.pass_type().writes_target())
        .map(|(i, _)| i)
        .collect();
    for pass in passes.iter_mut() {
        pass.begin_rt_update = false;
        pass.end_rt_update = false;
    }
    for (pos, &index) in writers.iter().enumerate() {
        let rt = passes[index].render_target;
        let prev = pos.checked_sub(1).map(|p| passes[writers[p]].render_target);
        let next = writers.get(pos + 1).map(|&n| passes[n].render_target);
        passes[index].begin_rt_update = prev != Some(rt);
        passes[index].end_rt_update = next != Some(rt);
    }
}
