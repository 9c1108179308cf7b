use anyhow::Result;
use glam::Mat4;

use crate::ibl::DisplayMode;
use crate::mesh::{GpuMesh, Mesh, MeshVertex};

use super::resources::IblResources;
use super::shaders::{checked, SKYBOX};
use super::{sampler_entry, texture_entry, uniform_entry, FrameTarget, DEPTH_FORMAT};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkyboxUniform {
    pub view_proj: [[f32; 4]; 4],
    pub mode: u32,
    pub lod: f32,
    pub exposure: f32,
    pub _pad: f32,
}

impl SkyboxUniform {
    /// `roughness` picks the prefiltered level shown in [`DisplayMode::Prefiltered`].
    pub fn new(rotation_view_proj: Mat4, mode: DisplayMode, roughness: f32, prefilter_mips: u32, exposure: f32) -> Self {
        let max_lod = prefilter_mips.saturating_sub(1) as f32;
        Self {
            view_proj: rotation_view_proj.to_cols_array_2d(),
            mode: mode.shader_index(),
            lod: roughness.clamp(0.0, 1.0) * max_lod,
            exposure,
            _pad: 0.0,
        }
    }
}

/// Draws the environment at the far plane behind the scene.
pub struct SkyboxPass {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    cube: GpuMesh,
}

impl SkyboxPass {
    pub fn new(device: &wgpu::Device, resources: &IblResources, target_format: wgpu::TextureFormat) -> Result<Self> {
        let filterable_cube = |binding| {
            texture_entry(
                binding,
                wgpu::ShaderStages::FRAGMENT,
                wgpu::TextureSampleType::Float { filterable: true },
                wgpu::TextureViewDimension::Cube,
            )
        };
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Skybox BGL"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT),
                filterable_cube(1),
                filterable_cube(2),
                texture_entry(
                    3,
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::TextureSampleType::Float { filterable: false },
                    wgpu::TextureViewDimension::D2,
                ),
                sampler_entry(4, wgpu::ShaderStages::FRAGMENT),
            ],
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Skybox Uniform Buffer"),
            size: std::mem::size_of::<SkyboxUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Skybox BG"),
            layout: &bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: uniform_buffer.as_entire_binding() },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&resources.environment_cube),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&resources.prefiltered_cube),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&resources.sh_coefficients_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&resources.linear_sampler),
                },
            ],
        });

        let module = SKYBOX.create_module(device)?;
        let pipeline = checked(device, SKYBOX.label, || {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Skybox Pipeline Layout"),
                bind_group_layouts: &[&bgl],
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Skybox Pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    buffers: &[MeshVertex::layout()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;

        Ok(Self { pipeline, bind_group, uniform_buffer, cube: GpuMesh::upload(device, "Skybox Cube", &Mesh::cube(2.0)) })
    }

    pub fn prepare(&self, queue: &wgpu::Queue, uniform: &SkyboxUniform) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniform));
    }

    /// Loads the scene's color and depth; fills only uncovered pixels.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, target: &FrameTarget<'_>) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Skybox Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: target.depth,
                depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        self.cube.draw(&mut pass, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_matches_shader_layout() {
        assert_eq!(std::mem::size_of::<SkyboxUniform>(), 80);
    }

    #[test]
    fn prefiltered_lod_follows_roughness() {
        let uniform = SkyboxUniform::new(Mat4::IDENTITY, DisplayMode::Prefiltered, 0.5, 7, 1.0);
        assert_eq!(uniform.mode, 2);
        assert!((uniform.lod - 3.0).abs() < 1e-6);
        let clamped = SkyboxUniform::new(Mat4::IDENTITY, DisplayMode::Irradiance, 4.0, 7, 1.0);
        assert_eq!(clamped.mode, 1);
        assert!((clamped.lod - 6.0).abs() < 1e-6);
        assert_eq!(SkyboxUniform::new(Mat4::IDENTITY, DisplayMode::Sky, 0.0, 7, 1.0).mode, 0);
    }
}
