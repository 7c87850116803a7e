//! Hooks fired around workspace and pass execution.

use crate::pass::Pass;
use crate::workspace::Workspace;

/// Observer registered on a workspace (per-pass and per-update hooks) or on the manager
/// (`all_workspaces_begin_update`). Every hook defaults to a no-op.
pub trait WorkspaceListener: Send + Sync {
    fn workspace_pre_update(&self, _workspace: &Workspace) {}

    /// Before the shadow-node update and the target's begin-update.
    fn pass_early_pre_execute(&self, _pass: &Pass) {}

    fn pass_pre_execute(&self, _pass: &Pass) {}

    fn pass_pos_execute(&self, _pass: &Pass) {}

    fn all_workspaces_begin_update(&self) {}
}
