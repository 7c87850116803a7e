//! Runs a shadowed Caster -> Final workspace on the headless render system and prints what
//! the compositor asked the backend to do.
//! Run: RUST_LOG=debug cargo run -p debug --bin compositor_headless

use std::sync::Arc;

use lume_compositor::pass::{ClearDef, QuadDef, SceneDef, ShadowNodeRecalculation};
use lume_compositor::{CompositorConfig, CompositorManager, PassKindDef, WorkspaceParams};
use lume_rhi::headless::{HeadlessRenderSystem, RhiCall};
use lume_rhi::PixelFormat;
use render_api::recording::RecordingSceneManager;
use render_api::ShadowMapTechnique;

fn define(manager: &mut CompositorManager) -> Result<(), String> {
    let shadows = manager
        .add_shadow_node_definition("Shadows")
        .map_err(|e| e.to_string())?;
    shadows
        .add_shadow_map("shadowMap0", 0, 0, ShadowMapTechnique::Focused)
        .map_err(|e| e.to_string())?
        .size(1024, 1024)
        .format(PixelFormat::D32Float);
    shadows
        .node_def_mut()
        .add_target_pass("shadowMap0", 0)
        .add_pass(PassKindDef::Scene(SceneDef {
            shadow_map_index: Some(0),
            ..SceneDef::default()
        }));

    let caster = manager.add_node_definition("Caster").map_err(|e| e.to_string())?;
    caster
        .add_texture_definition("castTex")
        .map_err(|e| e.to_string())?
        .format(PixelFormat::Rgba16Float);
    caster.map_output_channel(0, "castTex").map_err(|e| e.to_string())?;
    let target = caster.add_target_pass("castTex", 0);
    target.add_pass(PassKindDef::Clear(ClearDef::color([0.1, 0.1, 0.1, 1.0])));
    target.add_pass(PassKindDef::Scene(
        SceneDef::default().shadows("Shadows", ShadowNodeRecalculation::FirstOnly),
    ));

    let final_node = manager.add_node_definition("Final").map_err(|e| e.to_string())?;
    final_node.add_input_channel("rt_output").map_err(|e| e.to_string())?;
    final_node.add_input_channel("castTex").map_err(|e| e.to_string())?;
    let mut blit = QuadDef::new("Blit");
    blit.add_input(0, "castTex", 0);
    final_node
        .add_target_pass("rt_output", 0)
        .add_pass(PassKindDef::Quad(blit));

    let workspace = manager
        .add_workspace_definition("Main")
        .map_err(|e| e.to_string())?;
    workspace.connect("Caster", 0, "Final", 1);
    workspace.connect_output("Final", 0);
    Ok(())
}

fn summarize(label: &str, calls: &[RhiCall]) {
    let count = |pred: fn(&RhiCall) -> bool| calls.iter().filter(|c| pred(c)).count();
    println!(
        "{}: {} calls, {} clears, {} quads, {} transition batches, {} textures created",
        label,
        calls.len(),
        count(|c| matches!(c, RhiCall::Clear { .. })),
        count(|c| matches!(c, RhiCall::DrawQuad { .. })),
        count(|c| matches!(c, RhiCall::Transitions(_))),
        count(|c| matches!(c, RhiCall::CreateTexture { .. })),
    );
}

fn main() -> Result<(), String> {
    env_logger::init();
    let rs = Arc::new(HeadlessRenderSystem::new());
    let scene = Arc::new(RecordingSceneManager::new());
    let window = rs.create_window(1280, 720, PixelFormat::Bgra8Unorm);
    let camera = scene.add_camera("Main");
    scene.add_light();

    let mut manager = CompositorManager::new_with_config(rs.clone(), CompositorConfig::from_env());
    define(&mut manager)?;
    let id = manager
        .add_workspace(WorkspaceParams::new("Main", scene.clone(), window, camera))
        .map_err(|e| e.to_string())?;
    log::info!("workspace {:?} created", id);
    if let Some(workspace) = manager.workspace(id) {
        println!("execution order: {:?}", workspace.execution_order_names());
    }
    summarize("setup", &rs.take_calls());

    for _ in 0..3 {
        manager.update();
    }
    summarize("3 frames", &rs.take_calls());

    rs.resize_window(window, 1920, 1080).map_err(|e| e.to_string())?;
    manager.update();
    summarize("resized frame", &rs.take_calls());

    println!(
        "scene renders: {}, live textures: {}",
        scene.rendered().len(),
        rs.live_textures()
    );
    manager.remove_all_workspaces();
    println!("compositor_headless: OK (live textures after teardown: {})", rs.live_textures());
    Ok(())
}
