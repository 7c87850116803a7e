//! Definition registries and the set of live workspaces.

use std::collections::HashMap;
use std::sync::Arc;

use lume_rhi::{BufferId, RenderSystem, RenderTargetId};
use render_api::{CameraId, SceneManager};

use crate::channel::ResourceChannel;
use crate::config::CompositorConfig;
use crate::error::{CompositorError, Result};
use crate::listener::WorkspaceListener;
use crate::node::{NodeDef, ShadowNodeDef};
use crate::pass::CompositorPassProvider;
use crate::viewport::ViewportModifier;
use crate::workspace::{Workspace, WorkspaceDef, WorkspaceSetup};

/// Handle returned by [`CompositorManager::add_workspace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkspaceId(pub u64);

/// How to instantiate a workspace definition.
pub struct WorkspaceParams {
    definition_name: String,
    scene_manager: Arc<dyn SceneManager>,
    final_target: RenderTargetId,
    default_camera: CameraId,
    enabled: bool,
    position: Option<usize>,
    external_targets: Vec<ResourceChannel>,
    external_buffers: HashMap<String, BufferId>,
    execution_mask: u8,
    viewport_modifier_mask: u8,
    viewport_modifier: ViewportModifier,
    listeners: Vec<Arc<dyn WorkspaceListener>>,
}

impl WorkspaceParams {
    pub fn new(
        definition_name: &str,
        scene_manager: Arc<dyn SceneManager>,
        final_target: RenderTargetId,
        default_camera: CameraId,
    ) -> Self {
        Self {
            definition_name: definition_name.to_string(),
            scene_manager,
            final_target,
            default_camera,
            enabled: true,
            position: None,
            external_targets: Vec::new(),
            external_buffers: HashMap::new(),
            execution_mask: 0xFF,
            viewport_modifier_mask: 0xFF,
            viewport_modifier: ViewportModifier::default(),
            listeners: Vec::new(),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Insert before the workspace at `position` instead of appending; workspaces update in order.
    pub fn position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    /// Appends an external render target, addressed as `ExternalSource::External(n)` in order.
    pub fn external_target(mut self, channel: ResourceChannel) -> Self {
        self.external_targets.push(channel);
        self
    }

    pub fn external_buffer(mut self, name: &str, buffer: BufferId) -> Self {
        self.external_buffers.insert(name.to_string(), buffer);
        self
    }

    pub fn execution_mask(mut self, mask: u8) -> Self {
        self.execution_mask = mask;
        self
    }

    /// Passes whose viewport-modifier mask overlaps `mask` get `modifier` applied to their viewport.
    pub fn viewport_modifier(mut self, mask: u8, modifier: ViewportModifier) -> Self {
        self.viewport_modifier_mask = mask;
        self.viewport_modifier = modifier;
        self
    }

    pub fn listener(mut self, listener: Arc<dyn WorkspaceListener>) -> Self {
        self.listeners.push(listener);
        self
    }
}

/// Owns node, shadow-node and workspace definitions and runs every workspace once per frame.
pub struct CompositorManager {
    render_system: Arc<dyn RenderSystem>,
    config: CompositorConfig,
    node_defs: HashMap<String, Arc<NodeDef>>,
    shadow_defs: HashMap<String, Arc<ShadowNodeDef>>,
    workspace_defs: HashMap<String, Arc<WorkspaceDef>>,
    workspaces: Vec<(WorkspaceId, Workspace)>,
    next_workspace_id: u64,
    provider: Option<Arc<dyn CompositorPassProvider>>,
    listeners: Vec<Arc<dyn WorkspaceListener>>,
    frame_count: u64,
}

fn shared_definition(kind: &str, name: &str) -> CompositorError {
    CompositorError::InvalidState(format!(
        "{} definition '{}' is in use by a live workspace",
        kind, name
    ))
}

impl CompositorManager {
    pub fn new(render_system: Arc<dyn RenderSystem>) -> Self {
        Self::new_with_config(render_system, CompositorConfig::default())
    }

    pub fn new_with_config(render_system: Arc<dyn RenderSystem>, config: CompositorConfig) -> Self {
        Self {
            render_system,
            config,
            node_defs: HashMap::new(),
            shadow_defs: HashMap::new(),
            workspace_defs: HashMap::new(),
            workspaces: Vec::new(),
            next_workspace_id: 0,
            provider: None,
            listeners: Vec::new(),
            frame_count: 0,
        }
    }

    pub fn render_system(&self) -> &Arc<dyn RenderSystem> {
        &self.render_system
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn add_node_definition(&mut self, name: &str) -> Result<&mut NodeDef> {
        if self.node_defs.contains_key(name) {
            return Err(CompositorError::DuplicateName(format!("node definition '{}'", name)));
        }
        let def = self
            .node_defs
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(NodeDef::new(name)));
        Arc::get_mut(def).ok_or_else(|| shared_definition("node", name))
    }

    pub fn node_definition(&self, name: &str) -> Result<&NodeDef> {
        self.node_defs
            .get(name)
            .map(|d| d.as_ref())
            .ok_or_else(|| CompositorError::NotFound(format!("node definition '{}'", name)))
    }

    pub fn node_definition_mut(&mut self, name: &str) -> Result<&mut NodeDef> {
        let def = self
            .node_defs
            .get_mut(name)
            .ok_or_else(|| CompositorError::NotFound(format!("node definition '{}'", name)))?;
        Arc::get_mut(def).ok_or_else(|| shared_definition("node", name))
    }

    pub fn has_node_definition(&self, name: &str) -> bool {
        self.node_defs.contains_key(name)
    }

    pub fn add_shadow_node_definition(&mut self, name: &str) -> Result<&mut ShadowNodeDef> {
        if self.shadow_defs.contains_key(name) || self.node_defs.contains_key(name) {
            return Err(CompositorError::DuplicateName(format!("shadow node definition '{}'", name)));
        }
        let def = self
            .shadow_defs
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ShadowNodeDef::new(name)));
        Arc::get_mut(def).ok_or_else(|| shared_definition("shadow node", name))
    }

    pub fn shadow_node_definition(&self, name: &str) -> Result<&ShadowNodeDef> {
        self.shadow_defs
            .get(name)
            .map(|d| d.as_ref())
            .ok_or_else(|| CompositorError::NotFound(format!("shadow node definition '{}'", name)))
    }

    pub fn shadow_node_definition_mut(&mut self, name: &str) -> Result<&mut ShadowNodeDef> {
        let def = self
            .shadow_defs
            .get_mut(name)
            .ok_or_else(|| CompositorError::NotFound(format!("shadow node definition '{}'", name)))?;
        Arc::get_mut(def).ok_or_else(|| shared_definition("shadow node", name))
    }

    pub fn add_workspace_definition(&mut self, name: &str) -> Result<&mut WorkspaceDef> {
        if self.workspace_defs.contains_key(name) {
            return Err(CompositorError::DuplicateName(format!("workspace definition '{}'", name)));
        }
        let def = self
            .workspace_defs
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(WorkspaceDef::new(name)));
        Arc::get_mut(def).ok_or_else(|| shared_definition("workspace", name))
    }

    pub fn workspace_definition(&self, name: &str) -> Result<&WorkspaceDef> {
        self.workspace_defs
            .get(name)
            .map(|d| d.as_ref())
            .ok_or_else(|| CompositorError::NotFound(format!("workspace definition '{}'", name)))
    }

    pub fn workspace_definition_mut(&mut self, name: &str) -> Result<&mut WorkspaceDef> {
        let def = self
            .workspace_defs
            .get_mut(name)
            .ok_or_else(|| CompositorError::NotFound(format!("workspace definition '{}'", name)))?;
        Arc::get_mut(def).ok_or_else(|| shared_definition("workspace", name))
    }

    /// Provider for custom passes. Applies to workspaces added afterwards.
    pub fn set_pass_provider(&mut self, provider: Option<Arc<dyn CompositorPassProvider>>) {
        self.provider = provider;
    }

    /// Manager-wide listener; receives `all_workspaces_begin_update`.
    pub fn add_listener(&mut self, listener: Arc<dyn WorkspaceListener>) {
        self.listeners.push(listener);
    }

    /// Instantiates a workspace definition. The returned workspace may still be invalid (see
    /// [`Workspace::is_valid`]) when its graph cannot be fully connected.
    pub fn add_workspace(&mut self, params: WorkspaceParams) -> Result<WorkspaceId> {
        let def = self
            .workspace_defs
            .get(&params.definition_name)
            .cloned()
            .ok_or_else(|| {
                CompositorError::NotFound(format!("workspace definition '{}'", params.definition_name))
            })?;

        let mut node_defs = HashMap::new();
        let mut shadow_defs = HashMap::new();
        for (alias, def_name) in def.aliases() {
            if alias != def_name && self.node_defs.contains_key(alias) {
                return Err(CompositorError::DuplicateName(format!(
                    "alias '{}' in workspace '{}' names a different node definition",
                    alias,
                    def.name()
                )));
            }
            let node_def = self.node_defs.get(def_name).ok_or_else(|| {
                CompositorError::NotFound(format!(
                    "node definition '{}' used by alias '{}' in workspace '{}'",
                    def_name,
                    alias,
                    def.name()
                ))
            })?;
            for shadow_name in node_def.shadow_node_references() {
                let shadow_def = self.shadow_defs.get(shadow_name).ok_or_else(|| {
                    CompositorError::NotFound(format!(
                        "shadow node definition '{}' used by node '{}'",
                        shadow_name, def_name
                    ))
                })?;
                shadow_defs.insert(shadow_name.to_string(), Arc::clone(shadow_def));
            }
            node_defs.insert(def_name.clone(), Arc::clone(node_def));
        }

        let workspace = Workspace::new(WorkspaceSetup {
            render_system: Arc::clone(&self.render_system),
            scene_manager: params.scene_manager,
            provider: self.provider.clone(),
            config: self.config.clone(),
            def,
            node_defs,
            shadow_defs,
            final_target: params.final_target,
            default_camera: params.default_camera,
            enabled: params.enabled,
            external_targets: params.external_targets,
            external_buffers: params.external_buffers,
            execution_mask: params.execution_mask,
            viewport_modifier_mask: params.viewport_modifier_mask,
            viewport_modifier: params.viewport_modifier,
            listeners: params.listeners,
        })?;

        let id = WorkspaceId(self.next_workspace_id);
        self.next_workspace_id += 1;
        let position = params.position.unwrap_or(self.workspaces.len()).min(self.workspaces.len());
        self.workspaces.insert(position, (id, workspace));
        log::debug!("added workspace {:?} ('{}') at position {}", id, params.definition_name, position);
        Ok(id)
    }

    pub fn remove_workspace(&mut self, id: WorkspaceId) -> Result<()> {
        let index = self
            .workspaces
            .iter()
            .position(|(wid, _)| *wid == id)
            .ok_or_else(|| CompositorError::NotFound(format!("workspace {:?}", id)))?;
        self.workspaces.remove(index);
        Ok(())
    }

    pub fn remove_all_workspaces(&mut self) {
        self.workspaces.clear();
    }

    pub fn workspace(&self, id: WorkspaceId) -> Option<&Workspace> {
        self.workspaces.iter().find(|(wid, _)| *wid == id).map(|(_, w)| w)
    }

    pub fn workspace_mut(&mut self, id: WorkspaceId) -> Option<&mut Workspace> {
        self.workspaces.iter_mut().find(|(wid, _)| *wid == id).map(|(_, w)| w)
    }

    /// Workspace handles in update order.
    pub fn workspace_ids(&self) -> Vec<WorkspaceId> {
        self.workspaces.iter().map(|(id, _)| *id).collect()
    }

    /// Runs one frame over every workspace in order, then presents.
    pub fn update(&mut self) {
        for (_, workspace) in &mut self.workspaces {
            workspace.begin_update();
        }
        for listener in &self.listeners {
            listener.all_workspaces_begin_update();
        }
        for (_, workspace) in &mut self.workspaces {
            workspace.update(self.frame_count);
        }
        for (_, workspace) in &mut self.workspaces {
            workspace.end_update();
        }
        for (_, workspace) in &mut self.workspaces {
            workspace.swap_final_target();
        }
        self.frame_count += 1;
    }
}

impl Drop for CompositorManager {
    fn drop(&mut self) {
        // Workspaces release resources through the render system; drop them before the definitions.
        self.workspaces.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lume_rhi::headless::HeadlessRenderSystem;
    use lume_rhi::PixelFormat;
    use render_api::recording::RecordingSceneManager;

    fn setup() -> (Arc<HeadlessRenderSystem>, Arc<RecordingSceneManager>, RenderTargetId, CameraId) {
        let rs = Arc::new(HeadlessRenderSystem::new());
        let window = rs.create_window(800, 600, PixelFormat::Rgba8Unorm);
        let sm = Arc::new(RecordingSceneManager::new());
        let camera = sm.create_camera("Main");
        (rs, sm, window, camera)
    }

    #[test]
    fn registries_reject_duplicates_and_report_missing() {
        let (rs, _, _, _) = setup();
        let mut manager = CompositorManager::new(rs);
        manager.add_node_definition("Final").unwrap();
        assert!(matches!(
            manager.add_node_definition("Final"),
            Err(CompositorError::DuplicateName(_))
        ));
        assert!(matches!(
            manager.node_definition("Missing"),
            Err(CompositorError::NotFound(_))
        ));
        manager.add_workspace_definition("Main").unwrap();
        assert!(manager.add_workspace_definition("Main").is_err());
    }

    #[test]
    fn alias_colliding_with_other_definition_is_rejected() {
        let (rs, sm, window, camera) = setup();
        let mut manager = CompositorManager::new(rs);
        manager.add_node_definition("A").unwrap();
        manager.add_node_definition("B").unwrap();
        manager.add_workspace_definition("Main").unwrap().add_node_alias("B", "A").unwrap();
        let err = manager
            .add_workspace(WorkspaceParams::new("Main", sm, window, camera))
            .unwrap_err();
        assert!(matches!(err, CompositorError::DuplicateName(_)));
    }

    #[test]
    fn live_definitions_are_frozen() {
        let (rs, sm, window, camera) = setup();
        let mut manager = CompositorManager::new(rs);
        manager.add_node_definition("Final").unwrap();
        manager
            .add_workspace_definition("Main")
            .unwrap()
            .add_node_alias("Final", "Final")
            .unwrap();
        let id = manager
            .add_workspace(WorkspaceParams::new("Main", sm, window, camera))
            .unwrap();
        assert!(matches!(
            manager.node_definition_mut("Final"),
            Err(CompositorError::InvalidState(_))
        ));
        manager.remove_workspace(id).unwrap();
        assert!(manager.node_definition_mut("Final").is_ok());
    }

    #[test]
    fn update_counts_frames_and_respects_position() {
        let (rs, sm, window, camera) = setup();
        let mut manager = CompositorManager::new(rs);
        manager.add_node_definition("Final").unwrap();
        manager
            .add_workspace_definition("Main")
            .unwrap()
            .add_node_alias("Final", "Final")
            .unwrap();
        let first = manager
            .add_workspace(WorkspaceParams::new("Main", sm.clone(), window, camera))
            .unwrap();
        let second = manager
            .add_workspace(WorkspaceParams::new("Main", sm, window, camera).position(0))
            .unwrap();
        assert_eq!(manager.workspace_ids(), vec![second, first]);
        manager.update();
        manager.update();
        assert_eq!(manager.frame_count(), 2);
    }
}
