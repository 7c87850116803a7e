//! Lume compositor: node graphs of render passes instantiated into workspaces.
//!
//! Definitions ([`NodeDef`], [`ShadowNodeDef`], [`WorkspaceDef`]) are registered with a
//! [`CompositorManager`] and instantiated through [`CompositorManager::add_workspace`]. A
//! workspace connects its nodes, computes the execution order and emulates resource barriers
//! against a [`lume_rhi::RenderSystem`]; scenes are drawn through a
//! [`render_api::SceneManager`].

pub mod channel;
pub mod config;
pub mod error;
pub mod listener;
pub mod manager;
pub mod node;
pub mod pass;
pub mod texture_def;
pub mod viewport;
pub mod workspace;

pub use channel::{ChannelSwap, ResourceChannel};
pub use config::CompositorConfig;
pub use error::{CompositorError, Result};
pub use listener::WorkspaceListener;
pub use manager::{CompositorManager, WorkspaceId, WorkspaceParams};
pub use node::{Node, NodeDef, NodeId, ShadowMapDef, ShadowNode, ShadowNodeDef, ShadowNodeId, TargetDef};
pub use pass::{Pass, PassContext, PassDef, PassKindDef, PassState, PassType};
pub use texture_def::{TextureDefinition, TextureDefinitionTable, TextureSourceKind, GLOBAL_PREFIX};
pub use viewport::ViewportModifier;
pub use workspace::{ExternalSource, GlobalResources, Workspace, WorkspaceDef};
