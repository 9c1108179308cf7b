use anyhow::{Context, Result};
use wgpu::util::DeviceExt;

use crate::ibl::cubemap::{capture_projection, CubeFace};
use crate::mesh::{GpuMesh, Mesh, MeshVertex};

use super::resources::{IblResources, ENVIRONMENT_FORMAT};
use super::shaders::{checked, WgslShader, EQUIRECT_TO_CUBE, SKY_CAPTURE};
use super::{sampler_entry, texture_entry, uniform_entry, DEPTH_FORMAT};

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CaptureUniform {
    view_proj: [[f32; 4]; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    Panorama,
    Sky,
}

/// Renders a source onto the six faces of environment mip 0.
pub struct CapturePass {
    cube: GpuMesh,
    face_bind_groups: Vec<wgpu::BindGroup>,
    panorama_pipeline: wgpu::RenderPipeline,
    panorama_bind_group: wgpu::BindGroup,
    sky: Option<(wgpu::RenderPipeline, wgpu::BindGroup)>,
}

impl CapturePass {
    pub fn new(device: &wgpu::Device, resources: &IblResources) -> Result<Self> {
        let face_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Capture Face BGL"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX)],
        });
        let projection = capture_projection();
        let face_bind_groups = CubeFace::ALL
            .iter()
            .map(|face| {
                let uniform = CaptureUniform { view_proj: (projection * face.capture_view()).to_cols_array_2d() };
                let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("Capture {} Uniform", face.label())),
                    contents: bytemuck::bytes_of(&uniform),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("Capture {} BG", face.label())),
                    layout: &face_bgl,
                    entries: &[wgpu::BindGroupEntry { binding: 0, resource: buffer.as_entire_binding() }],
                })
            })
            .collect();

        let panorama_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Capture Panorama BGL"),
            entries: &[
                texture_entry(
                    0,
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::D2,
                ),
                sampler_entry(1, wgpu::ShaderStages::FRAGMENT),
            ],
        });
        let panorama_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Capture Panorama BG"),
            layout: &panorama_bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&resources.panorama) },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&resources.panorama_sampler),
                },
            ],
        });
        let panorama_pipeline = create_capture_pipeline(device, &EQUIRECT_TO_CUBE, &face_bgl, &panorama_bgl)?;

        let sky = match resources.sky.as_ref() {
            Some(tables) => {
                let sky_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Capture Sky BGL"),
                    entries: &[
                        uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                        texture_entry(
                            1,
                            wgpu::ShaderStages::FRAGMENT,
                            wgpu::TextureSampleType::Float { filterable: true },
                            wgpu::TextureViewDimension::D2,
                        ),
                        texture_entry(
                            2,
                            wgpu::ShaderStages::FRAGMENT,
                            wgpu::TextureSampleType::Float { filterable: true },
                            wgpu::TextureViewDimension::D2,
                        ),
                        texture_entry(
                            3,
                            wgpu::ShaderStages::FRAGMENT,
                            wgpu::TextureSampleType::Float { filterable: true },
                            wgpu::TextureViewDimension::D3,
                        ),
                        sampler_entry(4, wgpu::ShaderStages::FRAGMENT),
                    ],
                });
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Capture Sky BG"),
                    layout: &sky_bgl,
                    entries: &[
                        wgpu::BindGroupEntry { binding: 0, resource: tables.uniform.as_entire_binding() },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&tables.transmittance),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(&tables.irradiance),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::TextureView(&tables.inscatter),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: wgpu::BindingResource::Sampler(&resources.linear_sampler),
                        },
                    ],
                });
                Some((create_capture_pipeline(device, &SKY_CAPTURE, &face_bgl, &sky_bgl)?, bind_group))
            }
            None => None,
        };

        Ok(Self {
            cube: GpuMesh::upload(device, "Capture Cube", &Mesh::cube(2.0)),
            face_bind_groups,
            panorama_pipeline,
            panorama_bind_group,
            sky,
        })
    }

    /// One render pass per face, each clearing color and the shared capture depth.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        resources: &IblResources,
        source: CaptureSource,
    ) -> Result<()> {
        let (pipeline, source_bind_group) = match source {
            CaptureSource::Panorama => (&self.panorama_pipeline, &self.panorama_bind_group),
            CaptureSource::Sky => {
                let (pipeline, bind_group) = self.sky.as_ref().context("Sky capture requested without sky tables")?;
                (pipeline, bind_group)
            }
        };
        for (face, (view, face_bind_group)) in
            CubeFace::ALL.iter().zip(resources.environment_faces.iter().zip(&self.face_bind_groups))
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&format!("Capture {}", face.label())),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &resources.capture_depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, face_bind_group, &[]);
            pass.set_bind_group(1, source_bind_group, &[]);
            self.cube.draw(&mut pass, 0..1);
        }
        Ok(())
    }
}

fn create_capture_pipeline(
    device: &wgpu::Device,
    shader: &WgslShader,
    face_bgl: &wgpu::BindGroupLayout,
    source_bgl: &wgpu::BindGroupLayout,
) -> Result<wgpu::RenderPipeline> {
    let module = shader.create_module(device)?;
    let pipeline = checked(device, shader.label, || {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Capture Pipeline Layout"),
            bind_group_layouts: &[face_bgl, source_bgl],
            push_constant_ranges: &[],
        });
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(shader.label),
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
                    format: ENVIRONMENT_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                // the face basis is mirrored, so winding flips per face
                cull_mode: None,
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
    Ok(pipeline)
}
