use lume_rhi::BufferBindFlags;

use crate::error::{CompositorError, Result};
use crate::texture_def::{TextureDefinition, TextureDefinitionTable, TextureSourceKind};

/// A declared connection between two node aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteSpec {
    Channel {
        out_node: String,
        out_channel: usize,
        in_node: String,
        in_channel: usize,
    },
    /// Every output of `out_node` into the input of the same index of `in_node`, as many as
    /// both sides declare. Expanded when the workspace is instantiated.
    AllChannels { out_node: String, in_node: String },
}

impl RouteSpec {
    fn mentions(&self, alias: &str) -> bool {
        match self {
            RouteSpec::Channel {
                out_node, in_node, ..
            }
            | RouteSpec::AllChannels { out_node, in_node } => out_node == alias || in_node == alias,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferRoute {
    pub out_node: String,
    pub out_channel: usize,
    pub in_node: String,
    pub in_channel: usize,
}

/// Render target fed into a node input from outside the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalSource {
    /// The workspace's final target (usually the window).
    Final,
    /// Index into the external targets given at instantiation.
    External(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRoute {
    pub source: ExternalSource,
    pub in_node: String,
    pub in_channel: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalBufferRoute {
    pub buffer_name: String,
    pub in_node: String,
    pub in_channel: usize,
}

/// Blueprint of a workspace: which nodes it instantiates under which aliases, how they are
/// wired and which global textures and buffers it owns.
#[derive(Debug, Clone)]
pub struct WorkspaceDef {
    name: String,
    globals: TextureDefinitionTable,
    /// (alias, node definition name) in declaration order.
    aliases: Vec<(String, String)>,
    routes: Vec<RouteSpec>,
    buffer_routes: Vec<BufferRoute>,
    external_routes: Vec<ExternalRoute>,
    external_buffer_routes: Vec<ExternalBufferRoute>,
}

impl WorkspaceDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            globals: TextureDefinitionTable::new(TextureSourceKind::Global),
            aliases: Vec::new(),
            routes: Vec::new(),
            buffer_routes: Vec::new(),
            external_routes: Vec::new(),
            external_buffer_routes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Global textures must be named with the `global_` prefix.
    pub fn add_texture_definition(&mut self, name: &str) -> Result<&mut TextureDefinition> {
        self.globals.add_texture_definition(name)
    }

    pub fn add_buffer_definition(
        &mut self,
        name: &str,
        num_elements: u32,
        bytes_per_element: u32,
        bind_flags: BufferBindFlags,
        width_factor: f32,
        height_factor: f32,
    ) -> Result<()> {
        self.globals.add_buffer_definition(
            name,
            num_elements,
            bytes_per_element,
            bind_flags,
            width_factor,
            height_factor,
        )
    }

    pub fn globals(&self) -> &TextureDefinitionTable {
        &self.globals
    }

    /// Instantiates node definition `node_def_name` under `alias`. The same definition may be
    /// aliased several times.
    pub fn add_node_alias(&mut self, alias: &str, node_def_name: &str) -> Result<()> {
        if self.aliases.iter().any(|(a, _)| a == alias) {
            return Err(CompositorError::DuplicateName(format!(
                "node alias '{}' in workspace '{}'",
                alias, self.name
            )));
        }
        self.aliases.push((alias.to_string(), node_def_name.to_string()));
        Ok(())
    }

    /// Names used in routes without an explicit alias refer to the node definition itself.
    fn implicit_alias(&mut self, alias: &str) {
        if !self.aliases.iter().any(|(a, _)| a == alias) {
            self.aliases.push((alias.to_string(), alias.to_string()));
        }
    }

    pub fn remove_node_alias(&mut self, alias: &str) -> Result<()> {
        let index = self
            .aliases
            .iter()
            .position(|(a, _)| a == alias)
            .ok_or_else(|| CompositorError::NotFound(format!("node alias '{}'", alias)))?;
        self.aliases.remove(index);
        self.routes.retain(|r| !r.mentions(alias));
        self.buffer_routes
            .retain(|r| r.out_node != alias && r.in_node != alias);
        self.external_routes.retain(|r| r.in_node != alias);
        self.external_buffer_routes.retain(|r| r.in_node != alias);
        Ok(())
    }

    pub fn aliases(&self) -> &[(String, String)] {
        &self.aliases
    }

    pub fn node_definition_of(&self, alias: &str) -> Option<&str> {
        self.aliases
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, d)| d.as_str())
    }

    pub fn connect(&mut self, out_node: &str, out_channel: usize, in_node: &str, in_channel: usize) {
        self.implicit_alias(out_node);
        self.implicit_alias(in_node);
        self.routes.push(RouteSpec::Channel {
            out_node: out_node.to_string(),
            out_channel,
            in_node: in_node.to_string(),
            in_channel,
        });
    }

    pub fn connect_all(&mut self, out_node: &str, in_node: &str) {
        self.implicit_alias(out_node);
        self.implicit_alias(in_node);
        self.routes.push(RouteSpec::AllChannels {
            out_node: out_node.to_string(),
            in_node: in_node.to_string(),
        });
    }

    pub fn connect_buffer(&mut self, out_node: &str, out_channel: usize, in_node: &str, in_channel: usize) {
        self.implicit_alias(out_node);
        self.implicit_alias(in_node);
        self.buffer_routes.push(BufferRoute {
            out_node: out_node.to_string(),
            out_channel,
            in_node: in_node.to_string(),
            in_channel,
        });
    }

    /// Binds the final target into `in_node`'s input `in_channel`.
    pub fn connect_output(&mut self, in_node: &str, in_channel: usize) {
        self.connect_external(ExternalSource::Final, in_node, in_channel);
    }

    pub fn connect_external(&mut self, source: ExternalSource, in_node: &str, in_channel: usize) {
        self.implicit_alias(in_node);
        self.external_routes.push(ExternalRoute {
            source,
            in_node: in_node.to_string(),
            in_channel,
        });
    }

    pub fn connect_external_buffer(&mut self, buffer_name: &str, in_node: &str, in_channel: usize) {
        self.implicit_alias(in_node);
        self.external_buffer_routes.push(ExternalBufferRoute {
            buffer_name: buffer_name.to_string(),
            in_node: in_node.to_string(),
            in_channel,
        });
    }

    /// Drops every node-to-node route (textures and buffers). External routes stay.
    pub fn clear_all_inter_node_connections(&mut self) {
        self.routes.clear();
        self.buffer_routes.clear();
    }

    /// Drops every route from the final and external targets and buffers.
    pub fn clear_output_connections(&mut self) {
        self.external_routes.clear();
        self.external_buffer_routes.clear();
    }

    pub fn routes(&self) -> &[RouteSpec] {
        &self.routes
    }

    pub fn buffer_routes(&self) -> &[BufferRoute] {
        &self.buffer_routes
    }

    pub fn external_routes(&self) -> &[ExternalRoute] {
        &self.external_routes
    }

    pub fn external_buffer_routes(&self) -> &[ExternalBufferRoute] {
        &self.external_buffer_routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_create_implicit_aliases() {
        let mut def = WorkspaceDef::new("Main");
        def.add_node_alias("Blur2", "Blur").unwrap();
        def.connect("Scene", 0, "Blur2", 0);
        def.connect_output("Blur2", 1);
        assert_eq!(
            def.aliases(),
            &[
                ("Blur2".to_string(), "Blur".to_string()),
                ("Scene".to_string(), "Scene".to_string())
            ]
        );
        assert!(matches!(
            def.add_node_alias("Scene", "Other"),
            Err(CompositorError::DuplicateName(_))
        ));
    }

    #[test]
    fn removing_an_alias_drops_its_routes() {
        let mut def = WorkspaceDef::new("Main");
        def.connect("A", 0, "B", 0);
        def.connect_all("B", "C");
        def.connect_buffer("A", 0, "C", 0);
        def.connect_output("C", 0);
        def.remove_node_alias("B").unwrap();
        assert!(def.routes().is_empty());
        assert_eq!(def.buffer_routes().len(), 1);
        assert_eq!(def.external_routes().len(), 1);
        assert!(def.remove_node_alias("B").is_err());

        def.clear_all_inter_node_connections();
        assert!(def.buffer_routes().is_empty());
        def.clear_output_connections();
        assert!(def.external_routes().is_empty());
    }

    #[test]
    fn globals_require_prefix() {
        let mut def = WorkspaceDef::new("Main");
        assert!(matches!(
            def.add_texture_definition("shadow"),
            Err(CompositorError::InvalidNaming(_))
        ));
        def.add_texture_definition("global_shadow").unwrap();
    }
}
