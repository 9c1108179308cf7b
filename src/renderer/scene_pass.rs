use anyhow::Result;
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::mesh::{GpuMesh, Mesh, MeshVertex};

use super::resources::IblResources;
use super::shaders::{checked, SCENE_PBR};
use super::{sampler_entry, texture_entry, uniform_entry, FrameTarget, DEPTH_FORMAT};

const GRID_COLUMNS: u32 = 7;
const GRID_ROWS: u32 = 7;
const GRID_SPACING: f32 = 2.5;
const SPHERE_RADIUS: f32 = 1.0;
const ALBEDO: Vec3 = Vec3::new(0.9, 0.9, 0.9);

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SceneUniform {
    view_proj: [[f32; 4]; 4],
    /// `xyz` camera position, `w` exposure.
    camera: [f32; 4],
    /// `rgb` albedo, `a` prefilter max lod.
    albedo: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SphereInstance {
    /// `xyz` translation, `w` scale.
    pub placement: [f32; 4],
    /// `x` roughness, `y` metallic.
    pub material: [f32; 4],
}

impl SphereInstance {
    fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SphereInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute { offset: 0, shader_location: 2, format: wgpu::VertexFormat::Float32x4 },
                wgpu::VertexAttribute { offset: 16, shader_location: 3, format: wgpu::VertexFormat::Float32x4 },
            ],
        }
    }
}

/// Roughness increases across columns, metalness up the rows; the grid is centred on the origin.
pub fn sphere_grid(columns: u32, rows: u32, spacing: f32) -> Vec<SphereInstance> {
    let span = |count: u32, index: u32| if count <= 1 { 0.0 } else { index as f32 / (count - 1) as f32 };
    let mut instances = Vec::with_capacity((columns * rows) as usize);
    for row in 0..rows {
        for column in 0..columns {
            let x = (column as f32 - (columns.saturating_sub(1)) as f32 * 0.5) * spacing;
            let y = (row as f32 - (rows.saturating_sub(1)) as f32 * 0.5) * spacing;
            instances.push(SphereInstance {
                placement: [x, y, 0.0, SPHERE_RADIUS],
                material: [span(columns, column).max(0.05), span(rows, row), 0.0, 0.0],
            });
        }
    }
    instances
}

pub struct ScenePass {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    sphere: GpuMesh,
    instance_buffer: wgpu::Buffer,
    instance_count: u32,
    prefilter_max_lod: f32,
}

impl ScenePass {
    pub fn new(device: &wgpu::Device, resources: &IblResources, target_format: wgpu::TextureFormat) -> Result<Self> {
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene BGL"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT),
                texture_entry(
                    1,
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::TextureSampleType::Float { filterable: false },
                    wgpu::TextureViewDimension::D2,
                ),
                texture_entry(
                    2,
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::Cube,
                ),
                texture_entry(
                    3,
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::D2,
                ),
                sampler_entry(4, wgpu::ShaderStages::FRAGMENT),
            ],
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene Uniform Buffer"),
            size: std::mem::size_of::<SceneUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene BG"),
            layout: &bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: uniform_buffer.as_entire_binding() },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&resources.sh_coefficients_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&resources.prefiltered_cube),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&resources.brdf_lut_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&resources.linear_sampler),
                },
            ],
        });

        let module = SCENE_PBR.create_module(device)?;
        let pipeline = checked(device, SCENE_PBR.label, || {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Scene Pipeline Layout"),
                bind_group_layouts: &[&bgl],
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Scene Pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    buffers: &[MeshVertex::layout(), SphereInstance::layout()],
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
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;

        let instances = sphere_grid(GRID_COLUMNS, GRID_ROWS, GRID_SPACING);
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sphere Instances"),
            contents: bytemuck::cast_slice(&instances),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Ok(Self {
            pipeline,
            bind_group,
            uniform_buffer,
            sphere: GpuMesh::upload(device, "Sphere", &Mesh::uv_sphere(1.0, 48, 24)),
            instance_buffer,
            instance_count: instances.len() as u32,
            prefilter_max_lod: resources.layout.prefilter_mips.saturating_sub(1) as f32,
        })
    }

    pub fn prepare(&self, queue: &wgpu::Queue, view_proj: Mat4, camera_position: Vec3, exposure: f32) {
        let uniform = SceneUniform {
            view_proj: view_proj.to_cols_array_2d(),
            camera: camera_position.extend(exposure).to_array(),
            albedo: ALBEDO.extend(self.prefilter_max_lod).to_array(),
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    /// Clears the frame and draws the sphere grid.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, target: &FrameTarget<'_>) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations { load: wgpu::LoadOp::Clear(wgpu::Color::BLACK), store: wgpu::StoreOp::Store },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: target.depth,
                depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Clear(1.0), store: wgpu::StoreOp::Store }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
        self.sphere.draw(&mut pass, 0..self.instance_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_spans_roughness_and_metalness() {
        let grid = sphere_grid(7, 7, 2.5);
        assert_eq!(grid.len(), 49);
        assert_eq!(grid[0].material[1], 0.0);
        assert_eq!(grid[6].material[0], 1.0);
        assert_eq!(grid[48].material[1], 1.0);
        assert!(grid.iter().all(|s| s.material[0] > 0.0));
        let centre: f32 = grid.iter().map(|s| s.placement[0] + s.placement[1]).sum();
        assert!(centre.abs() < 1e-4);
    }

    #[test]
    fn single_sphere_sits_at_origin() {
        let grid = sphere_grid(1, 1, 2.5);
        assert_eq!(grid[0].placement, [0.0, 0.0, 0.0, SPHERE_RADIUS]);
        assert_eq!(grid[0].material[0], 0.05);
    }
}
