use anyhow::{Context, Result};

use super::resources::{IblResources, PREFILTER_FORMAT};
use super::shaders::PREFILTER;
use super::{create_compute_pipeline, sampler_entry, storage_entry, texture_entry, uniform_entry, workgroups};

/// GGX specular prefilter. Each mip binds its own sample block and storage view.
pub struct PrefilterPass {
    pipeline: wgpu::ComputePipeline,
    bind_groups: Vec<wgpu::BindGroup>,
}

impl PrefilterPass {
    pub fn new(device: &wgpu::Device, resources: &IblResources) -> Result<Self> {
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Prefilter BGL"),
            entries: &[
                texture_entry(
                    0,
                    wgpu::ShaderStages::COMPUTE,
                    wgpu::TextureSampleType::Float { filterable: true },
                    wgpu::TextureViewDimension::Cube,
                ),
                sampler_entry(1, wgpu::ShaderStages::COMPUTE),
                uniform_entry(2, wgpu::ShaderStages::COMPUTE),
                storage_entry(3, PREFILTER_FORMAT, wgpu::TextureViewDimension::D2Array),
            ],
        });
        let pipeline = create_compute_pipeline(device, &PREFILTER, &bgl)?;
        let bind_groups = resources
            .prefiltered_mips
            .iter()
            .zip(&resources.sample_buffers)
            .enumerate()
            .map(|(mip, (view, samples))| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("Prefilter Mip {mip} BG")),
                    layout: &bgl,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&resources.environment_cube),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&resources.linear_sampler),
                        },
                        wgpu::BindGroupEntry { binding: 2, resource: samples.as_entire_binding() },
                        wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::TextureView(view) },
                    ],
                })
            })
            .collect();
        Ok(Self { pipeline, bind_groups })
    }

    pub fn encode(&self, pass: &mut wgpu::ComputePass<'_>, resources: &IblResources, mip: u32) -> Result<()> {
        let bind_group = self.bind_groups.get(mip as usize).context("Prefilter mip out of range")?;
        let size = (resources.layout.prefilter_size >> mip).max(1);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(workgroups(size), workgroups(size), 6);
        Ok(())
    }
}
