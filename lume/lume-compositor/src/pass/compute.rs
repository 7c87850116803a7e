use lume_rhi::{BufferId, GpuResource, ResourceAccess, ResourceTransition};
use render_api::{CameraId, ComputeDispatch};

use super::{BarrierState, BoundTexture, PassContext, SetupEnv, UavResource};
use crate::channel::ResourceChannel;
use crate::error::{CompositorError, Result};
use crate::node::Node;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeTextureSource {
    pub slot: u32,
    pub texture_name: String,
    pub mrt_index: usize,
}

/// A texture (by name) or buffer (by name) written or read as a UAV by the compute job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeUavSource {
    Texture {
        slot: u32,
        texture_name: String,
        mip: u8,
        access: ResourceAccess,
        allow_write_after_write: bool,
    },
    Buffer {
        slot: u32,
        buffer_name: String,
        access: ResourceAccess,
        allow_write_after_write: bool,
    },
}

/// Dispatches a compute job through the scene manager.
#[derive(Debug, Clone, Default)]
pub struct ComputeDef {
    pub job: String,
    pub camera_name: Option<String>,
    pub textures: Vec<ComputeTextureSource>,
    pub uav_sources: Vec<ComputeUavSource>,
}

impl ComputeDef {
    pub fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
            ..Self::default()
        }
    }

    pub fn add_texture(&mut self, slot: u32, texture_name: &str) -> &mut Self {
        self.textures.push(ComputeTextureSource {
            slot,
            texture_name: texture_name.to_string(),
            mrt_index: 0,
        });
        self
    }

    pub fn add_uav_texture(&mut self, slot: u32, texture_name: &str, access: ResourceAccess) -> &mut Self {
        self.uav_sources.push(ComputeUavSource::Texture {
            slot,
            texture_name: texture_name.to_string(),
            mip: 0,
            access,
            allow_write_after_write: false,
        });
        self
    }

    pub fn add_uav_buffer(
        &mut self,
        slot: u32,
        buffer_name: &str,
        access: ResourceAccess,
        allow_write_after_write: bool,
    ) -> &mut Self {
        self.uav_sources.push(ComputeUavSource::Buffer {
            slot,
            buffer_name: buffer_name.to_string(),
            access,
            allow_write_after_write,
        });
        self
    }
}

struct ComputeUav {
    slot: u32,
    resource: UavResource,
    access: ResourceAccess,
    allow_write_after_write: bool,
}

pub(crate) struct ComputePass {
    job: String,
    camera: Option<CameraId>,
    textures: Vec<BoundTexture>,
    uavs: Vec<ComputeUav>,
}

impl ComputePass {
    pub(super) fn new(def: &ComputeDef, node: &Node, env: &SetupEnv<'_>) -> Result<Self> {
        if !env.rs.capabilities().compute_programs {
            return Err(CompositorError::UnsupportedOperation(format!(
                "compute job '{}' on a render system without compute programs",
                def.job
            )));
        }
        let camera = match &def.camera_name {
            Some(name) => Some(env.scene_manager.find_camera(name).ok_or_else(|| {
                CompositorError::NotFound(format!("compute pass camera '{}'", name))
            })?),
            None => None,
        };
        let textures = def
            .textures
            .iter()
            .map(|t| BoundTexture::resolve(node, env.globals, &t.texture_name, t.slot, t.mrt_index))
            .collect::<Result<Vec<_>>>()?;
        let mut uavs = Vec::with_capacity(def.uav_sources.len());
        for source in &def.uav_sources {
            uavs.push(match source {
                ComputeUavSource::Texture {
                    slot,
                    texture_name,
                    mip,
                    access,
                    allow_write_after_write,
                } => ComputeUav {
                    slot: *slot,
                    resource: UavResource::Texture {
                        texture: BoundTexture::resolve(node, env.globals, texture_name, *slot, 0)?,
                        mip: *mip,
                    },
                    access: *access,
                    allow_write_after_write: *allow_write_after_write,
                },
                ComputeUavSource::Buffer {
                    slot,
                    buffer_name,
                    access,
                    allow_write_after_write,
                } => ComputeUav {
                    slot: *slot,
                    resource: UavResource::Buffer {
                        buffer: node.get_defined_buffer(buffer_name, env.globals)?,
                        offset: 0,
                        size: 0,
                    },
                    access: *access,
                    allow_write_after_write: *allow_write_after_write,
                },
            });
        }
        Ok(Self {
            job: def.job.clone(),
            camera,
            textures,
            uavs,
        })
    }

    pub(super) fn execute(&self, ctx: &PassContext<'_>) -> Result<()> {
        let dispatch = ComputeDispatch {
            job: self.job.clone(),
            camera: self.camera,
            textures: self
                .textures
                .iter()
                .filter_map(|t| t.texture().map(|id| (t.unit, id)))
                .collect(),
            uavs: self
                .uavs
                .iter()
                .filter_map(|u| u.resource.gpu_resource().map(|r| (u.slot, r, u.access)))
                .collect(),
        };
        ctx.scene_manager
            .dispatch_compute(&dispatch)
            .map_err(CompositorError::Scene)
    }

    /// Compute passes never render, so there is no target rule: sampled inputs go to Texture and
    /// UAV sources follow the hazard rule.
    pub(super) fn place_barriers(&self, state: &mut BarrierState, out: &mut Vec<ResourceTransition>) {
        for texture in self.textures.iter().filter_map(BoundTexture::texture) {
            state.require_texture(out, GpuResource::Texture(texture));
        }
        for uav in &self.uavs {
            if let Some(resource) = uav.resource.gpu_resource() {
                state.require_uav(out, resource, uav.access, uav.allow_write_after_write);
            }
        }
    }

    pub(super) fn notify_recreated(&mut self, old: &ResourceChannel, new: &ResourceChannel) {
        for texture in &mut self.textures {
            texture.notify_recreated(old, new);
        }
        for uav in &mut self.uavs {
            uav.resource.notify_recreated(old, new);
        }
    }

    pub(super) fn notify_destroyed(&mut self, channel: &ResourceChannel) {
        for texture in &mut self.textures {
            texture.notify_destroyed(channel);
        }
        for uav in &mut self.uavs {
            if let UavResource::Texture { texture, .. } = &mut uav.resource {
                texture.notify_destroyed(channel);
            }
        }
    }

    pub(super) fn notify_recreated_buffer(&mut self, old: BufferId, new: BufferId) {
        for uav in &mut self.uavs {
            uav.resource.notify_recreated_buffer(old, new);
        }
    }

    pub(super) fn notify_destroyed_buffer(&mut self, buffer: BufferId) {
        self.uavs.retain(|uav| {
            !matches!(uav.resource, UavResource::Buffer { buffer: b, .. } if b == buffer)
        });
    }
}
