#![allow(dead_code)]

use std::sync::Arc;

use lume_compositor::{CompositorConfig, CompositorManager, Result, Workspace, WorkspaceId, WorkspaceParams};
use lume_rhi::headless::HeadlessRenderSystem;
use lume_rhi::{Capabilities, PixelFormat, RenderTargetId};
use render_api::recording::RecordingSceneManager;
use render_api::CameraId;

/// Headless render system, recording scene manager and an 800x600 window.
pub struct Harness {
    pub rs: Arc<HeadlessRenderSystem>,
    pub sm: Arc<RecordingSceneManager>,
    pub window: RenderTargetId,
    pub camera: CameraId,
    pub manager: CompositorManager,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Capabilities::default(), CompositorConfig::default())
    }

    pub fn with(caps: Capabilities, config: CompositorConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let rs = Arc::new(HeadlessRenderSystem::with_capabilities(caps));
        let sm = Arc::new(RecordingSceneManager::new());
        let window = rs.create_window(800, 600, PixelFormat::Bgra8Unorm);
        let camera = sm.add_camera("Main");
        let manager = CompositorManager::new_with_config(rs.clone(), config);
        Self {
            rs,
            sm,
            window,
            camera,
            manager,
        }
    }

    pub fn params(&self, definition: &str) -> WorkspaceParams {
        WorkspaceParams::new(definition, self.sm.clone(), self.window, self.camera)
    }

    pub fn add_workspace(&mut self, definition: &str) -> Result<WorkspaceId> {
        let params = self.params(definition);
        self.manager.add_workspace(params)
    }

    pub fn workspace(&self, id: WorkspaceId) -> &Workspace {
        self.manager.workspace(id).expect("workspace exists")
    }

    pub fn workspace_mut(&mut self, id: WorkspaceId) -> &mut Workspace {
        self.manager.workspace_mut(id).expect("workspace exists")
    }
}
