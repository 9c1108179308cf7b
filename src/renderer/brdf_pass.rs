use anyhow::Result;
use wgpu::util::DeviceExt;

use super::resources::{IblResources, BRDF_LUT_FORMAT};
use super::shaders::BRDF_LUT;
use super::{create_compute_pipeline, storage_entry, uniform_entry, workgroups};

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct LutParams {
    size: u32,
    sample_count: u32,
    _pad: [u32; 2],
}

/// Split-sum BRDF table. Built and dispatched once.
pub struct BrdfPass {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    size: u32,
}

impl BrdfPass {
    pub fn new(device: &wgpu::Device, resources: &IblResources, sample_count: u32) -> Result<Self> {
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("BRDF LUT BGL"),
            entries: &[
                storage_entry(0, BRDF_LUT_FORMAT, wgpu::TextureViewDimension::D2),
                uniform_entry(1, wgpu::ShaderStages::COMPUTE),
            ],
        });
        let size = resources.layout.brdf_lut_size;
        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("BRDF LUT Params"),
            contents: bytemuck::bytes_of(&LutParams { size, sample_count: sample_count.max(1), _pad: [0; 2] }),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("BRDF LUT BG"),
            layout: &bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&resources.brdf_lut_view),
                },
                wgpu::BindGroupEntry { binding: 1, resource: params.as_entire_binding() },
            ],
        });
        Ok(Self { pipeline: create_compute_pipeline(device, &BRDF_LUT, &bgl)?, bind_group, size })
    }

    pub fn encode(&self, pass: &mut wgpu::ComputePass<'_>) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.dispatch_workgroups(workgroups(self.size), workgroups(self.size), 1);
    }
}
