//! Recording scene manager: named cameras, a fixed light list, and a log of every request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::{
    CameraId, ComputeDispatch, LightId, SceneManager, SceneRenderRequest, ShadowCameraSetup,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SceneCall {
    CreateCamera(String, CameraId),
    DestroyCamera(CameraId),
    RenderScene(SceneRenderRequest),
    DispatchCompute(ComputeDispatch),
    ClosestLights(CameraId),
    SetupShadowCamera(ShadowCameraSetup),
}

#[derive(Debug, Default)]
struct State {
    cameras: HashMap<String, CameraId>,
    lights: Vec<LightId>,
    calls: Vec<SceneCall>,
}

#[derive(Debug)]
pub struct RecordingSceneManager {
    next_id: AtomicU64,
    state: Mutex<State>,
}

impl Default for RecordingSceneManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSceneManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a named camera without recording a call.
    pub fn add_camera(&self, name: &str) -> CameraId {
        let id = CameraId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.state().cameras.insert(name.to_string(), id);
        id
    }

    /// Adds a shadow-casting light; lights are "closest" in insertion order.
    pub fn add_light(&self) -> LightId {
        let id = LightId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.state().lights.push(id);
        id
    }

    pub fn calls(&self) -> Vec<SceneCall> {
        self.state().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<SceneCall> {
        std::mem::take(&mut self.state().calls)
    }

    /// Rendered scene requests, in order.
    pub fn rendered(&self) -> Vec<SceneRenderRequest> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                SceneCall::RenderScene(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }
}

impl SceneManager for RecordingSceneManager {
    fn find_camera(&self, name: &str) -> Option<CameraId> {
        self.state().cameras.get(name).copied()
    }

    fn create_camera(&self, name: &str) -> CameraId {
        let id = self.add_camera(name);
        self.state().calls.push(SceneCall::CreateCamera(name.to_string(), id));
        id
    }

    fn destroy_camera(&self, camera: CameraId) {
        let mut state = self.state();
        state.cameras.retain(|_, c| *c != camera);
        state.calls.push(SceneCall::DestroyCamera(camera));
    }

    fn frustum_corners(&self, _camera: CameraId, world_space: bool) -> [[f32; 3]; 4] {
        let z = if world_space { 100.0 } else { -1.0 };
        [[-1.0, 1.0, z], [1.0, 1.0, z], [-1.0, -1.0, z], [1.0, -1.0, z]]
    }

    fn render_scene(&self, request: &SceneRenderRequest) -> Result<(), String> {
        log::trace!("render_scene camera={:?} target={:?}", request.camera, request.target);
        self.state().calls.push(SceneCall::RenderScene(request.clone()));
        Ok(())
    }

    fn dispatch_compute(&self, dispatch: &ComputeDispatch) -> Result<(), String> {
        if dispatch.job.is_empty() {
            return Err("compute job has no name".to_string());
        }
        self.state().calls.push(SceneCall::DispatchCompute(dispatch.clone()));
        Ok(())
    }

    fn closest_shadow_casting_lights(&self, camera: CameraId, max_lights: usize) -> Vec<LightId> {
        let mut state = self.state();
        state.calls.push(SceneCall::ClosestLights(camera));
        state.lights.iter().take(max_lights).copied().collect()
    }

    fn setup_shadow_camera(&self, setup: &ShadowCameraSetup) {
        self.state().calls.push(SceneCall::SetupShadowCamera(setup.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cameras_are_found_by_name() {
        let sm = RecordingSceneManager::new();
        let main = sm.add_camera("Main");
        assert_eq!(sm.find_camera("Main"), Some(main));
        assert_eq!(sm.find_camera("Other"), None);
        let shadow = sm.create_camera("Shadow0");
        sm.destroy_camera(shadow);
        assert_eq!(sm.find_camera("Shadow0"), None);
        assert_eq!(
            sm.calls(),
            vec![
                SceneCall::CreateCamera("Shadow0".to_string(), shadow),
                SceneCall::DestroyCamera(shadow)
            ]
        );
    }

    #[test]
    fn closest_lights_are_capped() {
        let sm = RecordingSceneManager::new();
        let cam = sm.add_camera("Main");
        let l0 = sm.add_light();
        let _l1 = sm.add_light();
        assert_eq!(sm.closest_shadow_casting_lights(cam, 1), vec![l0]);
        assert_eq!(sm.closest_shadow_casting_lights(cam, 8).len(), 2);
    }
}
