use lume_rhi::{BufferId, ResourceAccess, TextureUsage};

use super::{BarrierState, BoundTexture, BoundUav, PassContext, SetupEnv, UavResource};
use crate::channel::ResourceChannel;
use crate::error::{CompositorError, Result};
use crate::node::Node;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UavTextureSource {
    /// Relative to [`UavDef::starting_slot`].
    pub slot: u32,
    pub texture_name: String,
    pub mrt_index: usize,
    pub mip: u8,
    pub access: ResourceAccess,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UavBufferSource {
    pub slot: u32,
    pub buffer_name: String,
    pub offset: u64,
    /// 0 binds the whole buffer.
    pub size: u64,
    pub access: ResourceAccess,
}

/// Binds textures and buffers to UAV slots for the passes that follow.
#[derive(Debug, Clone, Default)]
pub struct UavDef {
    pub starting_slot: u32,
    pub keep_previous_uavs: bool,
    pub textures: Vec<UavTextureSource>,
    pub buffers: Vec<UavBufferSource>,
}

impl UavDef {
    pub fn bind_texture(&mut self, slot: u32, texture_name: &str, access: ResourceAccess) -> &mut Self {
        self.textures.push(UavTextureSource {
            slot,
            texture_name: texture_name.to_string(),
            mrt_index: 0,
            mip: 0,
            access,
        });
        self
    }

    pub fn bind_buffer(&mut self, slot: u32, buffer_name: &str, access: ResourceAccess) -> &mut Self {
        self.buffers.push(UavBufferSource {
            slot,
            buffer_name: buffer_name.to_string(),
            offset: 0,
            size: 0,
            access,
        });
        self
    }
}

struct SlotBinding {
    slot: u32,
    resource: UavResource,
    access: ResourceAccess,
}

pub(crate) struct UavPass {
    keep_previous_uavs: bool,
    bindings: Vec<SlotBinding>,
}

impl UavPass {
    pub(super) fn new(def: &UavDef, node: &Node, env: &SetupEnv<'_>) -> Result<Self> {
        if !env.rs.capabilities().uav {
            return Err(CompositorError::UnsupportedOperation(
                "UAV pass on a render system without UAV support".into(),
            ));
        }
        let check_slot = |slot: u32| -> Result<u32> {
            let absolute = def.starting_slot + slot;
            if absolute as usize >= env.config.max_uav_slots {
                return Err(CompositorError::InvalidState(format!(
                    "UAV slot {} exceeds the {} available",
                    absolute, env.config.max_uav_slots
                )));
            }
            Ok(absolute)
        };

        let mut bindings = Vec::with_capacity(def.textures.len() + def.buffers.len());
        for source in &def.textures {
            let texture =
                BoundTexture::resolve(node, env.globals, &source.texture_name, 0, source.mrt_index)?;
            if let Some(id) = texture.texture() {
                let desc = env.rs.texture_desc(id)?;
                if !desc.usage.contains(TextureUsage::UAV) {
                    return Err(CompositorError::InvalidState(format!(
                        "texture '{}' bound as UAV was not created with UAV access",
                        source.texture_name
                    )));
                }
            }
            bindings.push(SlotBinding {
                slot: check_slot(source.slot)?,
                resource: UavResource::Texture {
                    texture,
                    mip: source.mip,
                },
                access: source.access,
            });
        }
        for source in &def.buffers {
            let buffer = node.get_defined_buffer(&source.buffer_name, env.globals)?;
            bindings.push(SlotBinding {
                slot: check_slot(source.slot)?,
                resource: UavResource::Buffer {
                    buffer,
                    offset: source.offset,
                    size: source.size,
                },
                access: source.access,
            });
        }
        Ok(Self {
            keep_previous_uavs: def.keep_previous_uavs,
            bindings,
        })
    }

    pub(super) fn execute(&self, ctx: &PassContext<'_>) -> Result<()> {
        let rs = ctx.render_system;
        if !self.keep_previous_uavs {
            rs.clear_uav_bindings();
        }
        for binding in &self.bindings {
            if let Some(uav) = binding.resource.binding(binding.access) {
                rs.queue_bind_uav(binding.slot, uav)?;
            }
        }
        rs.flush_uavs();
        Ok(())
    }

    /// Mirrors `execute` on the barrier state's slot table; emits no transitions.
    pub(super) fn emulate_binding(&self, state: &mut BarrierState) -> Result<()> {
        if !self.keep_previous_uavs {
            state.clear_uavs();
        }
        for binding in &self.bindings {
            if let Some(resource) = binding.resource.gpu_resource() {
                state.bind_uav(
                    binding.slot,
                    BoundUav {
                        resource,
                        access: binding.access,
                    },
                )?;
            }
        }
        Ok(())
    }

    pub(super) fn notify_recreated(&mut self, old: &ResourceChannel, new: &ResourceChannel) {
        for binding in &mut self.bindings {
            binding.resource.notify_recreated(old, new);
        }
    }

    pub(super) fn notify_destroyed(&mut self, channel: &ResourceChannel) {
        for binding in &mut self.bindings {
            if let UavResource::Texture { texture, .. } = &mut binding.resource {
                texture.notify_destroyed(channel);
            }
        }
    }

    pub(super) fn notify_recreated_buffer(&mut self, old: BufferId, new: BufferId) {
        for binding in &mut self.bindings {
            binding.resource.notify_recreated_buffer(old, new);
        }
    }

    pub(super) fn notify_destroyed_buffer(&mut self, buffer: BufferId) {
        self.bindings.retain(|binding| {
            !matches!(binding.resource, UavResource::Buffer { buffer: b, .. } if b == buffer)
        });
    }
}
