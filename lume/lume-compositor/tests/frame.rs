mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::Harness;
use lume_compositor::pass::{
    ClearDef, CompositorPassProvider, CustomDef, CustomPass, DepthCopyDef, MipmapDef, QuadDef,
    SceneDef,
};
use lume_compositor::{
    CompositorConfig, CompositorError, Pass, PassContext, PassKindDef, ResourceChannel, Result,
    Workspace, WorkspaceId, WorkspaceListener,
};
use lume_rhi::headless::RhiCall;
use lume_rhi::{
    Capabilities, GpuResource, PixelFormat, RenderSystem, RenderTargetId, ResourceLayout, TextureId,
    ViewportId,
};

/// Caster renders the scene into its local `castTex`; Final samples it onto the window.
fn define_caster_final(harness: &mut Harness) {
    let caster = harness.manager.add_node_definition("Caster").unwrap();
    caster
        .add_texture_definition("castTex")
        .unwrap()
        .format(PixelFormat::Rgba16Float);
    caster.map_output_channel(0, "castTex").unwrap();
    let target = caster.add_target_pass("castTex", 0);
    target.add_pass(PassKindDef::Clear(ClearDef::color([0.0, 0.0, 0.0, 1.0])));
    target.add_pass(PassKindDef::Scene(SceneDef::default()));

    let final_node = harness.manager.add_node_definition("Final").unwrap();
    final_node.add_input_channel("rt_output").unwrap();
    final_node.add_input_channel("castTex").unwrap();
    let mut quad = QuadDef::new("Blit");
    quad.add_input(0, "castTex", 0);
    final_node
        .add_target_pass("rt_output", 0)
        .add_pass(PassKindDef::Quad(quad));

    let ws = harness.manager.add_workspace_definition("Main").unwrap();
    ws.connect("Caster", 0, "Final", 1);
    ws.connect_output("Final", 0);
}

fn cast_channel(workspace: &Workspace) -> (RenderTargetId, TextureId) {
    let caster = workspace.node(workspace.find_node("Caster").unwrap()).unwrap();
    let channel = &caster.local_textures()[0];
    (channel.target.unwrap(), channel.textures[0])
}

fn index_of(calls: &[RhiCall], pred: impl Fn(&RhiCall) -> bool) -> usize {
    calls.iter().position(pred).expect("call was recorded")
}

#[test]
fn caster_final_frame() {
    let mut harness = Harness::new();
    define_caster_final(&mut harness);
    let id = harness.add_workspace("Main").unwrap();
    let workspace = harness.workspace(id);
    assert!(workspace.is_valid());
    assert_eq!(workspace.execution_order_names(), vec!["Caster", "Final"]);
    let (cast_rt, cast_tex) = cast_channel(workspace);
    let window = harness.window;

    harness.rs.take_calls();
    harness.manager.update();
    let calls = harness.rs.take_calls();

    assert_eq!(calls.first(), Some(&RhiCall::BeginFrame));
    assert_eq!(calls.last(), Some(&RhiCall::SwapBuffers(window)));
    let clear = index_of(&calls, |c| matches!(c, RhiCall::Clear { target, .. } if *target == cast_rt));
    let quad = index_of(&calls, |c| matches!(c, RhiCall::DrawQuad { target, .. } if *target == window));
    let end = index_of(&calls, |c| *c == RhiCall::EndFrame);
    assert!(clear < quad && quad < end);
    assert_eq!(
        calls.iter().filter(|c| **c == RhiCall::BeginUpdate(cast_rt)).count(),
        1,
        "clear and scene share one update bracket"
    );
    match &calls[quad] {
        RhiCall::DrawQuad { draw, .. } => assert_eq!(draw.textures, vec![(0, cast_tex)]),
        other => panic!("unexpected call {:?}", other),
    }

    let rendered = harness.sm.rendered();
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].target, cast_rt);
    assert_eq!(rendered[0].camera, harness.camera);
    assert!(!rendered[0].casters_only);
}

#[test]
fn explicit_barriers_move_cast_texture_to_sampling() {
    let mut harness = Harness::new();
    define_caster_final(&mut harness);
    let id = harness.add_workspace("Main").unwrap();
    let workspace = harness.workspace(id);
    let (_, cast_tex) = cast_channel(workspace);

    let caster = workspace.node(workspace.find_node("Caster").unwrap()).unwrap();
    let clear = &caster.passes()[0];
    assert_eq!(clear.resource_transitions().len(), 1);
    assert_eq!(clear.resource_transitions()[0].new_layout, ResourceLayout::RenderTarget);
    assert!(caster.passes()[1].resource_transitions().is_empty());

    let final_node = workspace.node(workspace.find_node("Final").unwrap()).unwrap();
    let transitions = final_node.passes()[0].resource_transitions();
    assert_eq!(transitions.len(), 2);
    assert_eq!(transitions[0].resource, Some(GpuResource::Window(harness.window)));
    assert_eq!(transitions[1].resource, Some(GpuResource::Texture(cast_tex)));
    assert_eq!(transitions[1].old_layout, ResourceLayout::RenderTarget);
    assert_eq!(transitions[1].new_layout, ResourceLayout::Texture);
}

#[test]
fn implicit_api_needs_no_transitions_without_uavs() {
    let caps = Capabilities {
        explicit_api: false,
        ..Capabilities::default()
    };
    let mut harness = Harness::with(caps, CompositorConfig::default());
    define_caster_final(&mut harness);
    harness.add_workspace("Main").unwrap();
    harness.manager.update();
    assert!(!harness
        .rs
        .calls()
        .iter()
        .any(|c| matches!(c, RhiCall::Transitions(_))));
}

#[test]
fn window_resize_recreates_relative_textures_and_rewires() {
    let mut harness = Harness::new();
    define_caster_final(&mut harness);
    let id = harness.add_workspace("Main").unwrap();
    let (old_rt, old_tex) = cast_channel(harness.workspace(id));
    harness.manager.update();

    harness.rs.resize_window(harness.window, 1600, 900).unwrap();
    harness.rs.take_calls();
    harness.manager.update();
    let calls = harness.rs.take_calls();

    let workspace = harness.workspace(id);
    let (new_rt, new_tex) = cast_channel(workspace);
    assert_ne!(new_tex, old_tex);
    assert!(!harness.rs.is_texture_alive(old_tex));
    let desc = harness.rs.texture_desc(new_tex).unwrap();
    assert_eq!((desc.width, desc.height), (1600, 900));

    let caster = workspace.node(workspace.find_node("Caster").unwrap()).unwrap();
    let final_node = workspace.node(workspace.find_node("Final").unwrap()).unwrap();
    assert_eq!(final_node.inputs()[1], caster.outputs()[0]);
    assert_eq!(caster.passes()[0].render_target(), Some(new_rt));
    assert!(!calls
        .iter()
        .any(|c| matches!(c, RhiCall::Clear { target, .. } if *target == old_rt)));
    assert!(calls.iter().any(|c| matches!(
        c,
        RhiCall::DrawQuad { draw, .. } if draw.textures == vec![(0, new_tex)]
    )));
    assert!(final_node.passes()[0]
        .resource_transitions()
        .iter()
        .any(|t| t.resource == Some(GpuResource::Texture(new_tex))));
}

#[test]
fn resize_to_the_same_size_is_a_no_op() {
    let mut harness = Harness::new();
    define_caster_final(&mut harness);
    let id = harness.add_workspace("Main").unwrap();
    harness.rs.resize_window(harness.window, 1024, 768).unwrap();
    harness.workspace_mut(id).final_target_resized().unwrap();
    let after_first = cast_channel(harness.workspace(id));

    harness.rs.take_calls();
    harness.workspace_mut(id).final_target_resized().unwrap();
    harness.workspace_mut(id).final_target_resized().unwrap();
    assert!(!harness
        .rs
        .calls()
        .iter()
        .any(|c| matches!(c, RhiCall::CreateTexture { .. } | RhiCall::DestroyTexture(_))));
    assert_eq!(cast_channel(harness.workspace(id)), after_first);
}

#[test]
fn fixed_size_textures_survive_resize() {
    let mut harness = Harness::new();
    let def = harness.manager.add_node_definition("Fixed").unwrap();
    def.add_texture_definition("lut").unwrap().size(32, 32);
    harness
        .manager
        .add_workspace_definition("Main")
        .unwrap()
        .add_node_alias("Fixed", "Fixed")
        .unwrap();
    let id = harness.add_workspace("Main").unwrap();
    let before = harness.workspace(id).nodes()[0].local_textures().to_vec();
    harness.rs.resize_window(harness.window, 1600, 900).unwrap();
    harness.workspace_mut(id).final_target_resized().unwrap();
    assert_eq!(harness.workspace(id).nodes()[0].local_textures(), before.as_slice());
}

#[derive(Default)]
struct CountingListener {
    workspace_updates: AtomicUsize,
    early: AtomicUsize,
    pre: AtomicUsize,
    pos: AtomicUsize,
    frames: AtomicUsize,
}

impl WorkspaceListener for CountingListener {
    fn workspace_pre_update(&self, _workspace: &Workspace) {
        self.workspace_updates.fetch_add(1, Ordering::Relaxed);
    }

    fn pass_early_pre_execute(&self, _pass: &Pass) {
        self.early.fetch_add(1, Ordering::Relaxed);
    }

    fn pass_pre_execute(&self, _pass: &Pass) {
        self.pre.fetch_add(1, Ordering::Relaxed);
    }

    fn pass_pos_execute(&self, _pass: &Pass) {
        self.pos.fetch_add(1, Ordering::Relaxed);
    }

    fn all_workspaces_begin_update(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn listeners_see_every_pass() {
    let mut harness = Harness::new();
    define_caster_final(&mut harness);
    let listener = Arc::new(CountingListener::default());
    let params = harness.params("Main").listener(listener.clone());
    harness.manager.add_workspace(params).unwrap();
    harness.manager.add_listener(listener.clone());

    harness.manager.update();
    harness.manager.update();
    assert_eq!(listener.workspace_updates.load(Ordering::Relaxed), 2);
    assert_eq!(listener.frames.load(Ordering::Relaxed), 2);
    for hook in [&listener.early, &listener.pre, &listener.pos] {
        assert_eq!(hook.load(Ordering::Relaxed), 6);
    }
}

#[test]
fn execution_mask_filters_passes() {
    let mut harness = Harness::new();
    define_caster_final(&mut harness);
    harness
        .manager
        .node_definition_mut("Caster")
        .unwrap()
        .add_target_pass("castTex", 0)
        .add_pass(PassKindDef::Scene(SceneDef::default()))
        .execution_mask = 0x02;
    let params = harness.params("Main").execution_mask(0x01);
    harness.manager.add_workspace(params).unwrap();
    harness.manager.update();
    // Only the unmasked scene pass from the first target ran.
    assert_eq!(harness.sm.rendered().len(), 1);
}

#[test]
fn repeat_budget_limits_executions() {
    let mut harness = Harness::new();
    let def = harness.manager.add_node_definition("Once").unwrap();
    def.add_input_channel("rt_output").unwrap();
    def.add_target_pass("rt_output", 0)
        .add_pass(PassKindDef::Scene(SceneDef::default()))
        .set_num_initial_passes(1);
    harness.manager.add_workspace_definition("Main").unwrap().connect_output("Once", 0);
    let id = harness.add_workspace("Main").unwrap();
    for _ in 0..3 {
        harness.manager.update();
    }
    assert_eq!(harness.sm.rendered().len(), 1);
    assert_eq!(harness.workspace(id).nodes()[0].passes()[0].num_passes_left(), Some(0));
}

#[test]
fn disabling_a_node_skips_its_passes() {
    let mut harness = Harness::new();
    define_caster_final(&mut harness);
    let id = harness.add_workspace("Main").unwrap();
    harness.workspace_mut(id).set_node_enabled("Caster", false).unwrap();
    harness.manager.update();
    assert!(harness.sm.rendered().is_empty());
    assert!(matches!(
        harness.workspace_mut(id).set_node_enabled("Nope", false),
        Err(CompositorError::NotFound(_))
    ));
}

fn define_hud(harness: &mut Harness) {
    let def = harness.manager.add_node_definition("Hud").unwrap();
    def.add_input_channel("rt_output").unwrap();
    def.add_target_pass("rt_output", 0)
        .add_pass(PassKindDef::Custom(CustomDef::new("overlay")));
    harness.manager.add_workspace_definition("Main").unwrap().connect_output("Hud", 0);
}

#[test]
fn custom_pass_without_provider_is_rejected() {
    let mut harness = Harness::new();
    define_hud(&mut harness);
    assert!(matches!(
        harness.add_workspace("Main"),
        Err(CompositorError::InvalidState(_))
    ));
}

#[derive(Debug, Default)]
struct OverlayLog {
    runs: AtomicUsize,
    refuse: AtomicBool,
    destroyed: Mutex<Vec<ResourceChannel>>,
}

#[derive(Debug)]
struct OverlayPass {
    log: Arc<OverlayLog>,
}

impl CustomPass for OverlayPass {
    fn execute(&mut self, _ctx: &PassContext<'_>, _target: RenderTargetId, _viewport: ViewportId) -> Result<()> {
        self.log.runs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn notify_destroyed(&mut self, channel: &ResourceChannel) {
        self.log.destroyed.lock().unwrap().push(channel.clone());
    }
}

#[derive(Debug)]
struct OverlayProvider {
    log: Arc<OverlayLog>,
}

impl CompositorPassProvider for OverlayProvider {
    fn create_pass(&self, def: &CustomDef, node_name: &str) -> Result<Box<dyn CustomPass>> {
        if def.custom_id != "overlay" || self.log.refuse.load(Ordering::Relaxed) {
            return Err(CompositorError::NotFound(format!("custom pass '{}' in '{}'", def.custom_id, node_name)));
        }
        Ok(Box::new(OverlayPass {
            log: Arc::clone(&self.log),
        }))
    }
}

fn overlay_provider(harness: &mut Harness) -> Arc<OverlayLog> {
    let log = Arc::new(OverlayLog::default());
    harness.manager.set_pass_provider(Some(Arc::new(OverlayProvider {
        log: Arc::clone(&log),
    })));
    log
}

#[test]
fn custom_passes_come_from_the_provider() {
    let mut harness = Harness::new();
    define_hud(&mut harness);
    let log = overlay_provider(&mut harness);
    let id = harness.add_workspace("Main").unwrap();
    assert!(harness.workspace(id).is_valid());
    harness.manager.update();
    harness.manager.update();
    assert_eq!(log.runs.load(Ordering::Relaxed), 2);
}

#[test]
fn failed_reconnect_leaves_the_workspace_invalid() {
    let mut harness = Harness::new();
    define_hud(&mut harness);
    let log = overlay_provider(&mut harness);
    let id = harness.add_workspace("Main").unwrap();
    assert!(harness.workspace(id).is_valid());

    log.refuse.store(true, Ordering::Relaxed);
    assert!(matches!(
        harness.workspace_mut(id).reconnect_all_nodes(),
        Err(CompositorError::NotFound(_))
    ));
    let workspace = harness.workspace(id);
    assert!(!workspace.is_valid());
    assert!(workspace.execution_order().is_empty());
    harness.manager.update();
    assert_eq!(log.runs.load(Ordering::Relaxed), 0);
}

#[test]
fn consumers_hear_about_destroyed_inputs() {
    let mut harness = Harness::new();
    let caster = harness.manager.add_node_definition("Caster").unwrap();
    caster.add_texture_definition("castTex").unwrap();
    caster.map_output_channel(0, "castTex").unwrap();
    let hud = harness.manager.add_node_definition("Hud").unwrap();
    hud.add_input_channel("rt_output").unwrap();
    hud.add_input_channel("castTex").unwrap();
    hud.add_target_pass("rt_output", 0)
        .add_pass(PassKindDef::Custom(CustomDef::new("overlay")));
    let ws = harness.manager.add_workspace_definition("Main").unwrap();
    ws.connect("Caster", 0, "Hud", 1);
    ws.connect_output("Hud", 0);
    let log = overlay_provider(&mut harness);

    let id = harness.add_workspace("Main").unwrap();
    let workspace = harness.workspace(id);
    assert!(workspace.is_valid());
    let cast = workspace.node(workspace.find_node("Caster").unwrap()).unwrap().local_textures()[0].clone();
    assert!(log.destroyed.lock().unwrap().is_empty());

    harness.manager.remove_workspace(id).unwrap();
    let destroyed = log.destroyed.lock().unwrap();
    assert_eq!(destroyed.as_slice(), &[cast]);
    assert_eq!(harness.rs.live_textures(), 0);
}

fn define_depth_copy(harness: &mut Harness, alias_on_copy_failure: bool) {
    let def = harness.manager.add_node_definition("Depth").unwrap();
    def.add_texture_definition("depthA").unwrap().size(64, 64);
    def.add_texture_definition("depthB").unwrap().size(64, 64);
    def.add_target_pass("depthB", 0)
        .add_pass(PassKindDef::DepthCopy(DepthCopyDef {
            source: "depthA".into(),
            destination: "depthB".into(),
            alias_on_copy_failure,
        }));
    harness
        .manager
        .add_workspace_definition("Main")
        .unwrap()
        .add_node_alias("Depth", "Depth")
        .unwrap();
}

fn no_depth_copy() -> Capabilities {
    Capabilities {
        depth_copy: false,
        ..Capabilities::default()
    }
}

#[test]
fn depth_copy_falls_back_to_sharing() {
    let mut harness = Harness::with(no_depth_copy(), CompositorConfig::default());
    define_depth_copy(&mut harness, true);
    harness.add_workspace("Main").unwrap();
    harness.manager.update();
    let calls = harness.rs.calls();
    assert!(calls.iter().any(|c| matches!(c, RhiCall::ShareDepth { .. })));
    assert!(!calls.iter().any(|c| matches!(c, RhiCall::CopyDepth { .. })));
}

#[test]
fn depth_copy_failure_without_fallback_is_logged_only() {
    let mut harness = Harness::with(no_depth_copy(), CompositorConfig::default());
    define_depth_copy(&mut harness, false);
    let id = harness.add_workspace("Main").unwrap();
    harness.manager.update();
    assert!(harness.workspace(id).is_valid());
    assert!(!harness
        .rs
        .calls()
        .iter()
        .any(|c| matches!(c, RhiCall::ShareDepth { .. } | RhiCall::CopyDepth { .. })));
}

#[test]
fn depth_copy_uses_the_backend_when_supported() {
    let mut harness = Harness::new();
    define_depth_copy(&mut harness, true);
    harness.add_workspace("Main").unwrap();
    harness.manager.update();
    assert!(harness
        .rs
        .calls()
        .iter()
        .any(|c| matches!(c, RhiCall::CopyDepth { .. })));
}

#[test]
fn workspaces_update_in_insertion_order() {
    let mut harness = Harness::new();
    define_caster_final(&mut harness);
    let first: WorkspaceId = harness.add_workspace("Main").unwrap();
    let params = harness.params("Main").position(0);
    let second = harness.manager.add_workspace(params).unwrap();
    let first_rt = cast_channel(harness.workspace(first)).0;
    let second_rt = cast_channel(harness.workspace(second)).0;

    harness.manager.update();
    let targets: Vec<RenderTargetId> = harness.sm.rendered().iter().map(|r| r.target).collect();
    assert_eq!(targets, vec![second_rt, first_rt]);
}

#[test]
fn sampling_after_mipmaps_transitions_back_to_texture() {
    let mut harness = Harness::new();
    let def = harness.manager.add_node_definition("N").unwrap();
    def.add_input_channel("rt_output").unwrap();
    let tex = def.add_texture_definition("tex").unwrap();
    tex.size(64, 64).format(PixelFormat::Rgba8Unorm);
    tex.num_mipmaps = 3;
    tex.automipmaps = true;
    for target in ["rt_output", "tex", "rt_output"] {
        let kind = if target == "tex" {
            PassKindDef::Mipmap(MipmapDef::default())
        } else {
            let mut quad = QuadDef::new("Blit");
            quad.add_input(0, "tex", 0);
            PassKindDef::Quad(quad)
        };
        def.add_target_pass(target, 0).add_pass(kind);
    }
    harness
        .manager
        .add_workspace_definition("Main")
        .unwrap()
        .connect_output("N", 0);

    let id = harness.add_workspace("Main").unwrap();
    let workspace = harness.workspace(id);
    assert!(workspace.is_valid());
    let node = &workspace.nodes()[0];
    let texture = node.local_textures()[0].textures[0];
    let passes = node.passes();

    let mips = passes[1].resource_transitions();
    assert_eq!(mips.len(), 4);
    assert!(mips
        .iter()
        .all(|t| t.old_layout == ResourceLayout::Texture && t.new_layout == ResourceLayout::RenderTarget));

    let resample = passes[2].resource_transitions();
    assert_eq!(resample.len(), 1);
    assert_eq!(resample[0].resource, Some(GpuResource::Texture(texture)));
    assert_eq!(resample[0].old_layout, ResourceLayout::RenderTarget);
    assert_eq!(resample[0].new_layout, ResourceLayout::Texture);
}
