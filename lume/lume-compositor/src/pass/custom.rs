use std::fmt::Debug;

use lume_rhi::{RenderTargetId, ViewportId};

use super::PassContext;
use crate::channel::ResourceChannel;
use crate::error::Result;

/// A pass implemented outside the compositor. `custom_id` selects the implementation in the
/// registered provider; `properties` are passed through untouched.
#[derive(Debug, Clone, Default)]
pub struct CustomDef {
    pub custom_id: String,
    pub properties: Vec<(String, String)>,
}

impl CustomDef {
    pub fn new(custom_id: &str) -> Self {
        Self {
            custom_id: custom_id.to_string(),
            properties: Vec::new(),
        }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Factory for custom passes, registered on the manager.
pub trait CompositorPassProvider: Send + Sync + Debug {
    fn create_pass(&self, def: &CustomDef, node_name: &str) -> Result<Box<dyn CustomPass>>;
}

/// The work of a custom pass. The compositor handles the repeat budget, update brackets,
/// barriers and listeners around it.
pub trait CustomPass: Send + Debug {
    fn execute(
        &mut self,
        ctx: &PassContext<'_>,
        target: RenderTargetId,
        viewport: ViewportId,
    ) -> Result<()>;

    /// The pass target or a texture the pass cached was replaced.
    fn notify_recreated(&mut self, old: &ResourceChannel, new: &ResourceChannel) {
        let _ = (old, new);
    }

    /// A texture the pass may have cached was destroyed without replacement.
    fn notify_destroyed(&mut self, channel: &ResourceChannel) {
        let _ = channel;
    }
}
