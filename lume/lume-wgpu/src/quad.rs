//! Fullscreen-quad materials and their pipeline cache.

use std::collections::HashMap;

use lume_rhi::{RhiError, RhiResult, StencilParams, ViewportDesc};
use wgpu::util::DeviceExt;

use crate::format::{self, DEPTH_FORMAT};

const QUAD_VS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/quad.wgsl"));
const BLIT_FS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/blit.wgsl"));

/// Material copying texture unit 0 to the target. Always registered.
pub const BLIT_MATERIAL: &str = "Blit";

/// A fragment stage registered as a named quad material. The source is appended to the shared
/// vertex stage: it must define `fs(in: VsOut)`, sample with `quad_sampler` (binding 1) and read
/// its textures from bindings `2..2 + num_textures`.
#[derive(Debug, Clone)]
pub struct QuadMaterialDesc {
    pub name: String,
    pub fragment_source: String,
    pub num_textures: u32,
    /// Color outputs written by `fs`; extra MRT surfaces are left untouched.
    pub num_outputs: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct QuadUniforms {
    corners: [[f32; 4]; 4],
}

impl QuadUniforms {
    fn new(corners: Option<[[f32; 3]; 4]>) -> Self {
        let corners = corners.unwrap_or_default();
        Self {
            corners: corners.map(|[x, y, z]| [x, y, z, 0.0]),
        }
    }
}

#[derive(Debug)]
struct QuadMaterial {
    module: wgpu::ShaderModule,
    num_textures: u32,
    num_outputs: u32,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

#[derive(Debug, Clone, PartialEq)]
struct PipelineKey {
    material: String,
    formats: Vec<wgpu::TextureFormat>,
    sample_count: u32,
    depth: bool,
    stencil: StencilParams,
}

/// One attachment of a render target.
#[derive(Debug)]
pub(crate) struct ColorView {
    pub view: wgpu::TextureView,
    pub format: wgpu::TextureFormat,
}

/// Everything a render pass needs to draw into a render target.
#[derive(Debug)]
pub(crate) struct ResolvedTarget {
    pub colors: Vec<ColorView>,
    pub depth: Option<wgpu::TextureView>,
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
}

/// A quad draw ready to be encoded.
pub(crate) struct QuadJob<'a> {
    pub material: &'a str,
    pub textures: &'a [wgpu::TextureView],
    pub corners: Option<[[f32; 3]; 4]>,
    pub viewport: &'a ViewportDesc,
    pub stencil: StencilParams,
}

#[derive(Debug)]
pub(crate) struct QuadRenderer {
    sampler: wgpu::Sampler,
    materials: HashMap<String, QuadMaterial>,
    pipelines: Vec<(PipelineKey, wgpu::RenderPipeline)>,
}

impl QuadRenderer {
    pub fn new(device: &wgpu::Device) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("quad_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let mut renderer = Self {
            sampler,
            materials: HashMap::new(),
            pipelines: Vec::new(),
        };
        renderer.insert(
            device,
            &QuadMaterialDesc {
                name: BLIT_MATERIAL.to_string(),
                fragment_source: BLIT_FS.to_string(),
                num_textures: 1,
                num_outputs: 1,
            },
        );
        renderer
    }

    pub fn has_material(&self, name: &str) -> bool {
        self.materials.contains_key(name)
    }

    /// Replaces any material of the same name and drops its cached pipelines.
    pub fn insert(&mut self, device: &wgpu::Device, desc: &QuadMaterialDesc) {
        let source = format!("{}\n{}", QUAD_VS, desc.fragment_source);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.name.as_str()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<QuadUniforms>() as u64
                    ),
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                count: None,
            },
        ];
        entries.extend((0..desc.num_textures).map(|unit| wgpu::BindGroupLayoutEntry {
            binding: 2 + unit,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        }));
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(desc.name.as_str()),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.name.as_str()),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        self.pipelines.retain(|(key, _)| key.material != desc.name);
        self.materials.insert(
            desc.name.clone(),
            QuadMaterial {
                module,
                num_textures: desc.num_textures,
                num_outputs: desc.num_outputs,
                bind_group_layout,
                pipeline_layout,
            },
        );
    }

    fn pipeline_index(&mut self, device: &wgpu::Device, key: PipelineKey) -> RhiResult<usize> {
        if let Some(index) = self.pipelines.iter().position(|(k, _)| *k == key) {
            return Ok(index);
        }
        let material = self
            .materials
            .get(&key.material)
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown quad material '{}'", key.material)))?;
        let targets: Vec<Option<wgpu::ColorTargetState>> = key
            .formats
            .iter()
            .enumerate()
            .map(|(index, format)| {
                let write_mask = if (index as u32) < material.num_outputs {
                    wgpu::ColorWrites::ALL
                } else {
                    wgpu::ColorWrites::empty()
                };
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: None,
                    write_mask,
                })
            })
            .collect();
        let depth_stencil = key.depth.then(|| wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Always,
            stencil: format::stencil_state(&key.stencil),
            bias: wgpu::DepthBiasState::default(),
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(key.material.as_str()),
            layout: Some(&material.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &material.module,
                entry_point: Some("vs"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &material.module,
                entry_point: Some("fs"),
                targets: &targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState {
                count: key.sample_count,
                ..Default::default()
            },
            multiview: None,
            cache: None,
        });
        log::debug!(
            "created quad pipeline '{}' for {:?} (samples {}, depth {})",
            key.material,
            key.formats,
            key.sample_count,
            key.depth
        );
        self.pipelines.push((key, pipeline));
        Ok(self.pipelines.len() - 1)
    }

    pub fn encode(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        target: &ResolvedTarget,
        job: QuadJob<'_>,
    ) -> RhiResult<()> {
        let num_textures = self
            .materials
            .get(job.material)
            .map(|m| m.num_textures)
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown quad material '{}'", job.material)))?;
        if job.textures.len() != num_textures as usize {
            return Err(RhiError::OutOfRange(format!(
                "quad material '{}' takes {} textures, got {}",
                job.material,
                num_textures,
                job.textures.len()
            )));
        }
        let (x, y, width, height) = viewport_rect(job.viewport, target.width, target.height)?;
        let scissor = scissor_rect(job.viewport, target.width, target.height);
        let stencil = if target.depth.is_some() {
            job.stencil
        } else {
            StencilParams::default()
        };
        let key = PipelineKey {
            material: job.material.to_string(),
            formats: target.colors.iter().map(|c| c.format).collect(),
            sample_count: target.sample_count,
            depth: target.depth.is_some(),
            stencil,
        };
        let index = self.pipeline_index(device, key)?;
        let Some(material) = self.materials.get(job.material) else {
            return Err(RhiError::InvalidHandle(format!("unknown quad material '{}'", job.material)));
        };

        let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad_uniforms"),
            contents: bytemuck::bytes_of(&QuadUniforms::new(job.corners)),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        entries.extend(job.textures.iter().zip(2u32..).map(|(view, binding)| wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::TextureView(view),
        }));
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(job.material),
            layout: &material.bind_group_layout,
            entries: &entries,
        });

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = target
            .colors
            .iter()
            .map(|color| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &color.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();
        let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(job.material),
            color_attachments: &color_attachments,
            depth_stencil_attachment: target.depth.as_ref().map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        rp.set_viewport(x, y, width, height, 0.0, 1.0);
        rp.set_scissor_rect(scissor.0, scissor.1, scissor.2, scissor.3);
        rp.set_pipeline(&self.pipelines[index].1);
        rp.set_bind_group(0, &bind_group, &[]);
        if stencil.enabled {
            rp.set_stencil_reference(stencil.reference);
        }
        rp.draw(0..4, 0..1);
        drop(rp);
        Ok(())
    }
}

/// Pixel-space viewport for a normalised rectangle, clamped to the target.
pub(crate) fn viewport_rect(desc: &ViewportDesc, width: u32, height: u32) -> RhiResult<(f32, f32, f32, f32)> {
    let (w, h) = (width as f32, height as f32);
    let x = (desc.left * w).clamp(0.0, w);
    let y = (desc.top * h).clamp(0.0, h);
    let vw = (desc.width * w).min(w - x);
    let vh = (desc.height * h).min(h - y);
    if vw <= 0.0 || vh <= 0.0 {
        return Err(RhiError::OutOfRange(format!(
            "empty viewport {:?} on a {}x{} target",
            desc, width, height
        )));
    }
    Ok((x, y, vw, vh))
}

/// Pixel-space scissor rectangle, rounded outwards and clamped to the target.
pub(crate) fn scissor_rect(desc: &ViewportDesc, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let to_px = |v: f32, extent: u32| ((v * extent as f32).round().max(0.0) as u32).min(extent);
    let x = to_px(desc.scissor_left, width);
    let y = to_px(desc.scissor_top, height);
    let right = to_px(desc.scissor_left + desc.scissor_width, width);
    let bottom = to_px(desc.scissor_top + desc.scissor_height, height);
    (x, y, right.saturating_sub(x), bottom.saturating_sub(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_viewport_covers_target() {
        let desc = ViewportDesc::default();
        assert_eq!(viewport_rect(&desc, 800, 600).unwrap(), (0.0, 0.0, 800.0, 600.0));
        assert_eq!(scissor_rect(&desc, 800, 600), (0, 0, 800, 600));
    }

    #[test]
    fn partial_viewport_is_clamped() {
        let desc = ViewportDesc {
            left: 0.5,
            top: 0.25,
            width: 1.0,
            height: 0.5,
            scissor_left: 0.5,
            scissor_top: 0.25,
            scissor_width: 1.0,
            scissor_height: 0.5,
            ..ViewportDesc::default()
        };
        assert_eq!(viewport_rect(&desc, 800, 600).unwrap(), (400.0, 150.0, 400.0, 300.0));
        assert_eq!(scissor_rect(&desc, 800, 600), (400, 150, 400, 300));
    }

    #[test]
    fn empty_viewport_is_rejected() {
        let desc = ViewportDesc {
            width: 0.0,
            ..ViewportDesc::default()
        };
        assert!(matches!(viewport_rect(&desc, 64, 64), Err(RhiError::OutOfRange(_))));
    }

    #[test]
    fn corners_are_padded() {
        let uniforms = QuadUniforms::new(Some([[1.0, 2.0, 3.0]; 4]));
        assert_eq!(uniforms.corners[3], [1.0, 2.0, 3.0, 0.0]);
        assert_eq!(QuadUniforms::new(None).corners, [[0.0; 4]; 4]);
    }
}
