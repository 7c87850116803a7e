//! Texture and buffer definitions owned by a node or a workspace: name to storage resolution,
//! and creation, destruction and recreation of the resources they describe.
//!
//! Nodes default new definitions to [`TextureSourceKind::Local`], workspaces to
//! [`TextureSourceKind::Global`]. Names starting with [`GLOBAL_PREFIX`] are reserved for globals.

use std::collections::HashMap;

use lume_rhi::{
    BufferBindFlags, BufferId, PixelFormat, RenderSystem, RenderTargetInfo, TextureDescriptor,
    TextureDimension, TextureUsage, UavBufferDescriptor,
};

use crate::channel::{ChannelSwap, ResourceChannel};
use crate::error::{CompositorError, Result};

pub const GLOBAL_PREFIX: &str = "global_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSourceKind {
    /// Bound from another node's output (or an external target) through a route.
    Input,
    /// Created and owned by the node.
    Local,
    /// Created and owned by the workspace; resolved by name.
    Global,
}

/// Where a named texture lives: `index` into the node's inputs or locals. For globals
/// referenced from a node the index is unused and the workspace resolves the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSource {
    pub index: usize,
    pub kind: TextureSourceKind,
}

/// Declarative description of a render texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDefinition {
    pub name: String,
    pub dimension: TextureDimension,
    /// 0 derives the width from the final target and `width_factor`.
    pub width: u32,
    /// 0 derives the height from the final target and `height_factor`.
    pub height: u32,
    pub depth_or_slices: u32,
    pub width_factor: f32,
    pub height_factor: f32,
    /// More than one format creates an MRT. Empty uses the final target's format.
    pub formats: Vec<PixelFormat>,
    pub num_mipmaps: u32,
    pub automipmaps: bool,
    pub uav: bool,
    /// None inherits the final target's setting.
    pub fsaa: Option<u8>,
    pub hw_gamma_write: Option<bool>,
    pub depth_buffer_pool: u16,
    pub prefer_depth_texture: bool,
}

impl TextureDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dimension: TextureDimension::D2,
            width: 0,
            height: 0,
            depth_or_slices: 1,
            width_factor: 1.0,
            height_factor: 1.0,
            formats: Vec::new(),
            num_mipmaps: 0,
            automipmaps: false,
            uav: false,
            fsaa: None,
            hw_gamma_write: None,
            depth_buffer_pool: 1,
            prefer_depth_texture: false,
        }
    }

    pub fn size(&mut self, width: u32, height: u32) -> &mut Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn factors(&mut self, width_factor: f32, height_factor: f32) -> &mut Self {
        self.width = 0;
        self.height = 0;
        self.width_factor = width_factor;
        self.height_factor = height_factor;
        self
    }

    pub fn format(&mut self, format: PixelFormat) -> &mut Self {
        self.formats = vec![format];
        self
    }

    pub fn mrt_formats(&mut self, formats: &[PixelFormat]) -> &mut Self {
        self.formats = formats.to_vec();
        self
    }

    /// Sized relative to the final target; recreated when it resizes.
    pub fn is_resizable(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn resolved_size(&self, final_target: &RenderTargetInfo) -> (u32, u32) {
        let derive = |fixed: u32, dim: u32, factor: f32| {
            if fixed == 0 {
                ((dim as f32 * factor).ceil() as u32).max(1)
            } else {
                fixed
            }
        };
        (
            derive(self.width, final_target.width, self.width_factor),
            derive(self.height, final_target.height, self.height_factor),
        )
    }
}

/// Declarative description of a UAV buffer. Positive factors multiply `num_elements` by the
/// final target's (ceiled, scaled) width and/or height.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferDefinition {
    pub name: String,
    pub num_elements: u32,
    pub bytes_per_element: u32,
    pub bind_flags: BufferBindFlags,
    pub width_factor: f32,
    pub height_factor: f32,
}

impl BufferDefinition {
    pub fn is_resizable(&self) -> bool {
        self.width_factor > 0.0 || self.height_factor > 0.0
    }

    pub fn resolved_elements(&self, final_target: &RenderTargetInfo) -> u32 {
        let mut count = self.num_elements;
        if self.width_factor > 0.0 {
            count *= (final_target.width as f32 * self.width_factor).ceil() as u32;
        }
        if self.height_factor > 0.0 {
            count *= (final_target.height as f32 * self.height_factor).ceil() as u32;
        }
        count
    }
}

#[derive(Debug, Clone)]
pub struct TextureDefinitionTable {
    default_source: TextureSourceKind,
    texture_defs: Vec<TextureDefinition>,
    buffer_defs: Vec<BufferDefinition>,
    name_to_source: HashMap<String, TextureSource>,
}

fn check_prefix(name: &str, kind: TextureSourceKind) -> Result<()> {
    let global_name = name.starts_with(GLOBAL_PREFIX);
    match (kind, global_name) {
        (TextureSourceKind::Global, false) => Err(CompositorError::InvalidNaming(format!(
            "global resource '{}' must start with '{}'",
            name, GLOBAL_PREFIX
        ))),
        (TextureSourceKind::Input | TextureSourceKind::Local, true) => {
            Err(CompositorError::InvalidNaming(format!(
                "only global resources may start with '{}' (got '{}')",
                GLOBAL_PREFIX, name
            )))
        }
        _ => Ok(()),
    }
}

impl TextureDefinitionTable {
    pub fn new(default_source: TextureSourceKind) -> Self {
        Self {
            default_source,
            texture_defs: Vec::new(),
            buffer_defs: Vec::new(),
            name_to_source: HashMap::new(),
        }
    }

    pub fn default_source(&self) -> TextureSourceKind {
        self.default_source
    }

    /// Maps `name` to a storage location. Re-registering the identical mapping is a no-op.
    pub fn add_texture_source_name(
        &mut self,
        name: &str,
        index: usize,
        kind: TextureSourceKind,
    ) -> Result<()> {
        check_prefix(name, kind)?;
        let source = TextureSource { index, kind };
        match self.name_to_source.get(name) {
            Some(existing) if *existing != source => Err(CompositorError::DuplicateName(format!(
                "texture '{}' is already mapped to {:?}",
                name, existing
            ))),
            Some(_) => Ok(()),
            None => {
                self.name_to_source.insert(name.to_string(), source);
                Ok(())
            }
        }
    }

    pub fn texture_source(&self, name: &str) -> Result<TextureSource> {
        if let Some(source) = self.name_to_source.get(name) {
            return Ok(*source);
        }
        if self.default_source != TextureSourceKind::Global && name.starts_with(GLOBAL_PREFIX) {
            return Ok(TextureSource {
                index: 0,
                kind: TextureSourceKind::Global,
            });
        }
        Err(CompositorError::NotFound(format!("texture '{}'", name)))
    }

    pub fn has_texture(&self, name: &str) -> bool {
        self.name_to_source.contains_key(name)
    }

    /// Declares a texture owned by this table's owner (local for nodes, global for workspaces).
    pub fn add_texture_definition(&mut self, name: &str) -> Result<&mut TextureDefinition> {
        if let Some(existing) = self.name_to_source.get(name) {
            return Err(CompositorError::DuplicateName(format!(
                "texture '{}' is already declared as {:?}",
                name, existing
            )));
        }
        let index = self.texture_defs.len();
        self.add_texture_source_name(name, index, self.default_source)?;
        self.texture_defs.push(TextureDefinition::new(name));
        Ok(&mut self.texture_defs[index])
    }

    pub fn texture_definitions(&self) -> &[TextureDefinition] {
        &self.texture_defs
    }

    pub fn texture_definition_mut(&mut self, name: &str) -> Result<&mut TextureDefinition> {
        self.texture_defs
            .iter_mut()
            .find(|d| d.name == name)
            .ok_or_else(|| CompositorError::NotFound(format!("texture definition '{}'", name)))
    }

    /// Removes an owned texture definition; later indices shift down.
    pub fn remove_texture(&mut self, name: &str) -> Result<()> {
        let source = match self.name_to_source.get(name) {
            Some(s) if s.kind == self.default_source => *s,
            _ => {
                return Err(CompositorError::NotFound(format!(
                    "texture definition '{}'",
                    name
                )))
            }
        };
        self.name_to_source.remove(name);
        self.texture_defs.remove(source.index);
        for other in self.name_to_source.values_mut() {
            if other.kind == source.kind && other.index > source.index {
                other.index -= 1;
            }
        }
        Ok(())
    }

    pub fn rename_texture(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        let source = self.texture_source(old_name)?;
        if !self.name_to_source.contains_key(old_name) {
            return Err(CompositorError::NotFound(format!("texture '{}'", old_name)));
        }
        check_prefix(new_name, source.kind)?;
        if self.name_to_source.contains_key(new_name) {
            return Err(CompositorError::DuplicateName(format!("texture '{}'", new_name)));
        }
        self.name_to_source.remove(old_name);
        self.name_to_source.insert(new_name.to_string(), source);
        if source.kind == self.default_source {
            if let Some(def) = self.texture_defs.get_mut(source.index) {
                def.name = new_name.to_string();
            }
        }
        Ok(())
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
        check_prefix(name, self.default_source)?;
        if self.has_buffer_definition(name) {
            return Err(CompositorError::DuplicateName(format!("buffer '{}'", name)));
        }
        self.buffer_defs.push(BufferDefinition {
            name: name.to_string(),
            num_elements,
            bytes_per_element,
            bind_flags,
            width_factor,
            height_factor,
        });
        Ok(())
    }

    pub fn has_buffer_definition(&self, name: &str) -> bool {
        self.buffer_defs.iter().any(|b| b.name == name)
    }

    pub fn buffer_definitions(&self) -> &[BufferDefinition] {
        &self.buffer_defs
    }
}

/// Buffers by name, as owned by a node or workspace.
pub type BufferMap = HashMap<String, BufferId>;

/// A buffer replaced by recreation; broadcast to every holder of `old`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSwap {
    pub old: BufferId,
    pub new: BufferId,
}

pub fn create_textures(
    defs: &[TextureDefinition],
    final_target: &RenderTargetInfo,
    rs: &dyn RenderSystem,
) -> Result<Vec<ResourceChannel>> {
    let mut channels = Vec::with_capacity(defs.len());
    for def in defs {
        match create_texture(def, final_target, rs) {
            Ok(channel) => channels.push(channel),
            Err(err) => {
                destroy_textures(&mut channels, rs);
                return Err(err);
            }
        }
    }
    Ok(channels)
}

pub fn create_texture(
    def: &TextureDefinition,
    final_target: &RenderTargetInfo,
    rs: &dyn RenderSystem,
) -> Result<ResourceChannel> {
    let (width, height) = def.resolved_size(final_target);
    let mut usage = TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED;
    if def.uav {
        if !rs.capabilities().uav {
            return Err(CompositorError::UnsupportedOperation(format!(
                "texture '{}' requests UAV access but the render system has no UAV support",
                def.name
            )));
        }
        usage |= TextureUsage::UAV;
    }
    if def.automipmaps {
        usage |= TextureUsage::AUTOMIPMAP;
    }
    let formats = if def.formats.is_empty() {
        vec![final_target.format]
    } else {
        def.formats.clone()
    };
    let base = TextureDescriptor {
        label: def.name.clone(),
        dimension: def.dimension,
        width,
        height,
        depth_or_slices: def.depth_or_slices,
        num_mipmaps: def.num_mipmaps,
        format: formats[0],
        usage,
        fsaa: def.fsaa.unwrap_or(final_target.fsaa),
        hw_gamma_write: def.hw_gamma_write.unwrap_or(final_target.hw_gamma_write),
    };
    log::debug!("creating texture '{}' {}x{} ({} surfaces)", def.name, width, height, formats.len());

    if formats.len() == 1 {
        let texture = rs.create_texture(&base)?;
        let target = rs
            .texture_render_target(texture, 0)
            .and_then(|rt| {
                rs.set_depth_buffer_pool(rt, def.depth_buffer_pool, def.prefer_depth_texture)?;
                Ok(rt)
            });
        return match target {
            Ok(rt) => Ok(ResourceChannel::texture(rt, texture)),
            Err(err) => {
                let _ = rs.destroy_texture(texture);
                Err(err.into())
            }
        };
    }

    let mrt = rs.create_multi_render_target(&def.name)?;
    let mut channel = ResourceChannel {
        target: Some(mrt),
        textures: Vec::with_capacity(formats.len()),
    };
    for (index, format) in formats.iter().enumerate() {
        let desc = TextureDescriptor {
            label: format!("{}/{}", def.name, index),
            format: *format,
            ..base.clone()
        };
        let step = rs.create_texture(&desc).and_then(|texture| {
            channel.textures.push(texture);
            rs.bind_surface(mrt, index, texture)
        });
        if let Err(err) = step {
            let _ = rs.destroy_render_target(mrt);
            for texture in &channel.textures {
                let _ = rs.destroy_texture(*texture);
            }
            return Err(err.into());
        }
    }
    rs.set_depth_buffer_pool(mrt, def.depth_buffer_pool, def.prefer_depth_texture)?;
    Ok(channel)
}

fn destroy_channel(channel: &ResourceChannel, rs: &dyn RenderSystem) {
    if channel.is_mrt() {
        if let Some(mrt) = channel.target {
            if let Err(err) = rs.destroy_render_target(mrt) {
                log::warn!("failed to destroy MRT {:?}: {}", mrt, err);
            }
        }
    }
    for texture in &channel.textures {
        if let Err(err) = rs.destroy_texture(*texture) {
            log::warn!("failed to destroy texture {:?}: {}", texture, err);
        }
    }
}

/// Destroys every channel created by [`create_textures`] and empties the list.
pub fn destroy_textures(channels: &mut Vec<ResourceChannel>, rs: &dyn RenderSystem) {
    for channel in channels.drain(..) {
        destroy_channel(&channel, rs);
    }
}

/// Rebuilds the channels whose definitions are sized relative to the final target. Returns the
/// swaps the caller must broadcast to every node and pass holding the old channels.
pub fn recreate_resizable_textures(
    defs: &[TextureDefinition],
    channels: &mut [ResourceChannel],
    final_target: &RenderTargetInfo,
    rs: &dyn RenderSystem,
) -> Result<Vec<ChannelSwap>> {
    let mut swaps = Vec::new();
    for (def, channel) in defs.iter().zip(channels.iter_mut()) {
        if !def.is_resizable() || !channel.is_valid() {
            continue;
        }
        let new = create_texture(def, final_target, rs)?;
        let old = std::mem::replace(channel, new.clone());
        destroy_channel(&old, rs);
        swaps.push(ChannelSwap { old, new });
    }
    Ok(swaps)
}

pub fn create_buffer(
    def: &BufferDefinition,
    final_target: &RenderTargetInfo,
    rs: &dyn RenderSystem,
) -> Result<BufferId> {
    let num_elements = def.resolved_elements(final_target);
    log::debug!("creating buffer '{}' with {} elements", def.name, num_elements);
    Ok(rs.create_uav_buffer(&UavBufferDescriptor {
        label: def.name.clone(),
        num_elements,
        bytes_per_element: def.bytes_per_element,
        bind_flags: def.bind_flags,
    })?)
}

pub fn create_buffers(
    defs: &[BufferDefinition],
    buffers: &mut BufferMap,
    final_target: &RenderTargetInfo,
    rs: &dyn RenderSystem,
) -> Result<()> {
    for def in defs {
        let buffer = create_buffer(def, final_target, rs)?;
        buffers.insert(def.name.clone(), buffer);
    }
    Ok(())
}

/// Destroys the buffers named by `defs`; buffers bound from elsewhere are left alone.
pub fn destroy_buffers(defs: &[BufferDefinition], buffers: &mut BufferMap, rs: &dyn RenderSystem) {
    for def in defs {
        if let Some(buffer) = buffers.remove(&def.name) {
            if let Err(err) = rs.destroy_uav_buffer(buffer) {
                log::warn!("failed to destroy buffer '{}': {}", def.name, err);
            }
        }
    }
}

pub fn recreate_resizable_buffers(
    defs: &[BufferDefinition],
    buffers: &mut BufferMap,
    final_target: &RenderTargetInfo,
    rs: &dyn RenderSystem,
) -> Result<Vec<BufferSwap>> {
    let mut swaps = Vec::new();
    for def in defs.iter().filter(|d| d.is_resizable()) {
        let Some(old) = buffers.get(&def.name).copied() else {
            continue;
        };
        let new = create_buffer(def, final_target, rs)?;
        buffers.insert(def.name.clone(), new);
        if let Err(err) = rs.destroy_uav_buffer(old) {
            log::warn!("failed to destroy buffer '{}': {}", def.name, err);
        }
        swaps.push(BufferSwap { old, new });
    }
    Ok(swaps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lume_rhi::headless::{HeadlessRenderSystem, RhiCall};

    fn final_info(width: u32, height: u32) -> RenderTargetInfo {
        RenderTargetInfo {
            width,
            height,
            format: PixelFormat::Bgra8Unorm,
            fsaa: 1,
            hw_gamma_write: false,
            is_window: true,
            depth_buffer_pool: 1,
        }
    }

    #[test]
    fn global_prefix_is_enforced_both_ways() {
        let mut local = TextureDefinitionTable::new(TextureSourceKind::Local);
        assert!(matches!(
            local.add_texture_definition("global_bad"),
            Err(CompositorError::InvalidNaming(_))
        ));
        assert!(matches!(
            local.add_texture_source_name("global_in", 0, TextureSourceKind::Input),
            Err(CompositorError::InvalidNaming(_))
        ));
        let mut global = TextureDefinitionTable::new(TextureSourceKind::Global);
        assert!(matches!(
            global.add_texture_definition("plain"),
            Err(CompositorError::InvalidNaming(_))
        ));
        global.add_texture_definition("global_ok").unwrap();
        assert_eq!(
            global.texture_source("global_ok").unwrap(),
            TextureSource {
                index: 0,
                kind: TextureSourceKind::Global
            }
        );
    }

    #[test]
    fn duplicate_and_missing_names() {
        let mut table = TextureDefinitionTable::new(TextureSourceKind::Local);
        table
            .add_texture_source_name("rt_input", 0, TextureSourceKind::Input)
            .unwrap();
        table
            .add_texture_source_name("rt_input", 0, TextureSourceKind::Input)
            .unwrap();
        assert!(matches!(
            table.add_texture_source_name("rt_input", 1, TextureSourceKind::Input),
            Err(CompositorError::DuplicateName(_))
        ));
        assert!(matches!(
            table.add_texture_definition("rt_input"),
            Err(CompositorError::DuplicateName(_))
        ));
        assert!(matches!(
            table.texture_source("nope"),
            Err(CompositorError::NotFound(_))
        ));
        // Node tables resolve undeclared global names lazily.
        assert_eq!(
            table.texture_source("global_shared").unwrap().kind,
            TextureSourceKind::Global
        );
    }

    #[test]
    fn remove_and_rename_shift_indices() {
        let mut table = TextureDefinitionTable::new(TextureSourceKind::Local);
        table.add_texture_definition("a").unwrap();
        table.add_texture_definition("b").unwrap();
        table.add_texture_definition("c").unwrap();
        table.remove_texture("a").unwrap();
        assert_eq!(table.texture_source("c").unwrap().index, 1);
        table.rename_texture("c", "d").unwrap();
        assert_eq!(table.texture_definitions()[1].name, "d");
        assert!(table.texture_source("c").is_err());
        assert!(matches!(
            table.rename_texture("d", "b"),
            Err(CompositorError::DuplicateName(_))
        ));
        assert!(matches!(
            table.remove_texture("a"),
            Err(CompositorError::NotFound(_))
        ));
    }

    #[test]
    fn sizes_derive_from_final_target() {
        let mut def = TextureDefinition::new("half");
        def.factors(0.5, 0.5);
        assert_eq!(def.resolved_size(&final_info(801, 600)), (401, 300));
        assert!(def.is_resizable());
        def.size(256, 128);
        assert_eq!(def.resolved_size(&final_info(801, 600)), (256, 128));
        assert!(!def.is_resizable());
    }

    #[test]
    fn buffer_elements_scale_with_factors() {
        let mut table = TextureDefinitionTable::new(TextureSourceKind::Local);
        table
            .add_buffer_definition("tiles", 4, 16, BufferBindFlags::UAV, 0.25, 0.0)
            .unwrap();
        assert!(matches!(
            table.add_buffer_definition("tiles", 1, 4, BufferBindFlags::UAV, 0.0, 0.0),
            Err(CompositorError::DuplicateName(_))
        ));
        let def = &table.buffer_definitions()[0];
        assert_eq!(def.resolved_elements(&final_info(100, 50)), 4 * 25);
    }

    #[test]
    fn mrt_creation_and_teardown_order() {
        let rs = HeadlessRenderSystem::new();
        let mut def = TextureDefinition::new("gbuffer");
        def.mrt_formats(&[PixelFormat::Rgba8Unorm, PixelFormat::Rgba16Float]);
        let mut channels = create_textures(&[def], &final_info(64, 32), &rs).unwrap();
        assert!(channels[0].is_mrt());
        let mrt = channels[0].target.unwrap();
        let textures = channels[0].textures.clone();
        rs.take_calls();
        destroy_textures(&mut channels, &rs);
        assert!(channels.is_empty());
        assert_eq!(
            rs.calls(),
            vec![
                RhiCall::DestroyRenderTarget(mrt),
                RhiCall::DestroyTexture(textures[0]),
                RhiCall::DestroyTexture(textures[1]),
            ]
        );
        assert_eq!(rs.live_textures(), 0);
    }

    #[test]
    fn empty_formats_use_final_format() {
        let rs = HeadlessRenderSystem::new();
        let def = TextureDefinition::new("colour");
        let channel = create_texture(&def, &final_info(10, 10), &rs).unwrap();
        let desc = rs.texture_desc(channel.textures[0]).unwrap();
        assert_eq!(desc.format, PixelFormat::Bgra8Unorm);
        assert!(desc.usage.contains(TextureUsage::RENDER_TARGET));
        assert!(!desc.usage.contains(TextureUsage::UAV));
    }

    #[test]
    fn recreate_touches_only_resizable() {
        let rs = HeadlessRenderSystem::new();
        let relative = TextureDefinition::new("relative");
        let mut fixed = TextureDefinition::new("fixed");
        fixed.size(128, 128);
        let defs = vec![relative, fixed];
        let mut channels = create_textures(&defs, &final_info(800, 600), &rs).unwrap();
        let fixed_before = channels[1].clone();
        let swaps =
            recreate_resizable_textures(&defs, &mut channels, &final_info(1600, 900), &rs).unwrap();
        assert_eq!(swaps.len(), 1);
        assert_ne!(swaps[0].old, swaps[0].new);
        assert_eq!(channels[0], swaps[0].new);
        assert_eq!(channels[1], fixed_before);
        let desc = rs.texture_desc(channels[0].textures[0]).unwrap();
        assert_eq!((desc.width, desc.height), (1600, 900));
        assert!(!rs.is_texture_alive(swaps[0].old.textures[0]));
    }

    #[test]
    fn recreate_skips_unbound_channels() {
        let rs = HeadlessRenderSystem::new();
        let defs = vec![TextureDefinition::new("relative")];
        let mut channels = vec![ResourceChannel::invalid()];
        let swaps =
            recreate_resizable_textures(&defs, &mut channels, &final_info(8, 8), &rs).unwrap();
        assert!(swaps.is_empty());
        assert!(rs.calls().is_empty());
    }

    #[test]
    fn buffers_recreate_by_name() {
        let rs = HeadlessRenderSystem::new();
        let mut table = TextureDefinitionTable::new(TextureSourceKind::Local);
        table
            .add_buffer_definition("fixed", 16, 4, BufferBindFlags::UAV, 0.0, 0.0)
            .unwrap();
        table
            .add_buffer_definition("per_pixel", 1, 4, BufferBindFlags::UAV, 1.0, 1.0)
            .unwrap();
        let mut buffers = BufferMap::new();
        create_buffers(table.buffer_definitions(), &mut buffers, &final_info(4, 4), &rs).unwrap();
        let fixed = buffers["fixed"];
        let swaps = recreate_resizable_buffers(
            table.buffer_definitions(),
            &mut buffers,
            &final_info(8, 8),
            &rs,
        )
        .unwrap();
        assert_eq!(swaps.len(), 1);
        assert_eq!(buffers["fixed"], fixed);
        assert_eq!(rs.buffer_desc(buffers["per_pixel"]).unwrap().num_elements, 64);
        destroy_buffers(table.buffer_definitions(), &mut buffers, &rs);
        assert!(buffers.is_empty());
        assert_eq!(rs.live_buffers(), 0);
    }
}
