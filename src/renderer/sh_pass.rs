use anyhow::Result;
use wgpu::util::DeviceExt;

use crate::ibl::SH_COEFFICIENT_COUNT;

use super::resources::{IblResources, SH_FORMAT};
use super::shaders::{SH_PROJECTION, SH_REDUCE};
use super::{create_compute_pipeline, sampler_entry, storage_entry, texture_entry, uniform_entry};

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ProjectionParams {
    sample_size: u32,
    tiles: u32,
    source_lod: f32,
    _pad: f32,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ReduceParams {
    tiles: u32,
    _pad: [u32; 3],
}

/// Two-stage SH9 projection: per-tile partial sums, then one work-group per basis function.
pub struct ShPass {
    project_pipeline: wgpu::ComputePipeline,
    project_bind_group: wgpu::BindGroup,
    reduce_pipeline: wgpu::ComputePipeline,
    reduce_bind_group: wgpu::BindGroup,
    tiles: u32,
}

impl ShPass {
    pub fn new(device: &wgpu::Device, resources: &IblResources) -> Result<Self> {
        let layout = resources.layout;
        let tiles = layout.sh_tiles();

        let project_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SH Projection BGL"),
            entries: &[
                texture_entry(
                    0,
                    wgpu::ShaderStages::COMPUTE,
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::Cube,
                ),
                sampler_entry(1, wgpu::ShaderStages::COMPUTE),
                storage_entry(2, SH_FORMAT, wgpu::TextureViewDimension::D2Array),
                uniform_entry(3, wgpu::ShaderStages::COMPUTE),
            ],
        });
        let project_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("SH Projection Params"),
            contents: bytemuck::bytes_of(&ProjectionParams {
                sample_size: layout.sh_sample_size,
                tiles,
                source_lod: layout.sh_source_lod(),
                _pad: 0.0,
            }),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let project_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SH Projection BG"),
            layout: &project_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&resources.environment_cube),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&resources.linear_sampler),
                },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(&resources.sh_partials) },
                wgpu::BindGroupEntry { binding: 3, resource: project_params.as_entire_binding() },
            ],
        });

        let reduce_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SH Reduce BGL"),
            entries: &[
                texture_entry(
                    0,
                    wgpu::ShaderStages::COMPUTE,
                    wgpu::TextureSampleType::Float { filterable: false },
                    wgpu::TextureViewDimension::D2Array,
                ),
                storage_entry(1, SH_FORMAT, wgpu::TextureViewDimension::D2),
                uniform_entry(2, wgpu::ShaderStages::COMPUTE),
            ],
        });
        let reduce_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("SH Reduce Params"),
            contents: bytemuck::bytes_of(&ReduceParams { tiles, _pad: [0; 3] }),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let reduce_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SH Reduce BG"),
            layout: &reduce_bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&resources.sh_partials) },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&resources.sh_coefficients_view),
                },
                wgpu::BindGroupEntry { binding: 2, resource: reduce_params.as_entire_binding() },
            ],
        });

        Ok(Self {
            project_pipeline: create_compute_pipeline(device, &SH_PROJECTION, &project_bgl)?,
            project_bind_group,
            reduce_pipeline: create_compute_pipeline(device, &SH_REDUCE, &reduce_bgl)?,
            reduce_bind_group,
            tiles,
        })
    }

    pub fn encode_projection(&self, pass: &mut wgpu::ComputePass<'_>) {
        pass.set_pipeline(&self.project_pipeline);
        pass.set_bind_group(0, &self.project_bind_group, &[]);
        pass.dispatch_workgroups(self.tiles, self.tiles, 6);
    }

    pub fn encode_reduction(&self, pass: &mut wgpu::ComputePass<'_>) {
        pass.set_pipeline(&self.reduce_pipeline);
        pass.set_bind_group(0, &self.reduce_bind_group, &[]);
        pass.dispatch_workgroups(SH_COEFFICIENT_COUNT as u32, 1, 1);
    }
}
