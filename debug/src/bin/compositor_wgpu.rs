//! Drives the compositor on a real wgpu device: clears an HDR texture, tints it with a custom
//! quad material and blits the result into an offscreen window.
//! Run: cargo run -p debug --bin compositor_wgpu

use std::sync::Arc;

use lume_compositor::pass::{ClearDef, QuadDef};
use lume_compositor::{CompositorManager, PassKindDef, WorkspaceParams};
use lume_rhi::PixelFormat;
use lume_wgpu::{QuadMaterialDesc, WgpuRenderSystem};
use render_api::recording::RecordingSceneManager;

const TINT_FS: &str = r#"
@group(0) @binding(1) var quad_sampler: sampler;
@group(0) @binding(2) var source: texture_2d<f32>;

@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
    let color = textureSample(source, quad_sampler, in.uv);
    return vec4<f32>(color.rgb * vec3<f32>(1.0, 0.6, 0.3), color.a);
}
"#;

fn main() -> Result<(), String> {
    env_logger::init();
    let rs = Arc::new(WgpuRenderSystem::new_headless().map_err(|e| e.to_string())?);
    rs.register_quad_material(&QuadMaterialDesc {
        name: "Tint".to_string(),
        fragment_source: TINT_FS.to_string(),
        num_textures: 1,
        num_outputs: 1,
    })
    .map_err(|e| e.to_string())?;
    let window = rs
        .create_window(800, 600, PixelFormat::Bgra8Unorm)
        .map_err(|e| e.to_string())?;
    let scene = Arc::new(RecordingSceneManager::new());
    let camera = scene.add_camera("Main");

    let mut manager = CompositorManager::new(rs.clone());
    let hdr = manager.add_node_definition("Hdr").map_err(|e| e.to_string())?;
    hdr.add_texture_definition("hdrTex")
        .map_err(|e| e.to_string())?
        .format(PixelFormat::Rgba16Float);
    hdr.add_texture_definition("tinted")
        .map_err(|e| e.to_string())?
        .format(PixelFormat::Rgba16Float);
    hdr.map_output_channel(0, "tinted").map_err(|e| e.to_string())?;
    hdr.add_target_pass("hdrTex", 0)
        .add_pass(PassKindDef::Clear(ClearDef::color([0.8, 0.8, 0.8, 1.0])));
    let mut tint = QuadDef::new("Tint");
    tint.add_input(0, "hdrTex", 0);
    hdr.add_target_pass("tinted", 0).add_pass(PassKindDef::Quad(tint));

    let present = manager.add_node_definition("Present").map_err(|e| e.to_string())?;
    present.add_input_channel("rt_output").map_err(|e| e.to_string())?;
    present.add_input_channel("tinted").map_err(|e| e.to_string())?;
    let mut blit = QuadDef::new(lume_wgpu::BLIT_MATERIAL);
    blit.add_input(0, "tinted", 0);
    present
        .add_target_pass("rt_output", 0)
        .add_pass(PassKindDef::Quad(blit));

    let workspace = manager
        .add_workspace_definition("Main")
        .map_err(|e| e.to_string())?;
    workspace.connect("Hdr", 0, "Present", 1);
    workspace.connect_output("Present", 0);
    let id = manager
        .add_workspace(WorkspaceParams::new("Main", scene, window, camera))
        .map_err(|e| e.to_string())?;
    if !manager.workspace(id).is_some_and(|w| w.is_valid()) {
        return Err("workspace failed to connect".to_string());
    }

    for _ in 0..3 {
        manager.update();
    }
    log::info!("resizing window to 1024x768");
    rs.resize_window(window, 1024, 768).map_err(|e| e.to_string())?;
    manager.update();
    println!("compositor_wgpu: OK after {} frames", manager.frame_count());
    Ok(())
}
