use anyhow::{Context, Result};

use super::resources::{IblResources, ENVIRONMENT_FORMAT};
use super::shaders::CUBE_MIP_DOWNSAMPLE;
use super::{create_compute_pipeline, storage_entry, texture_entry, workgroups};

/// Box-filtered environment mip chain, one dispatch per level.
pub struct EnvMipPass {
    pipeline: wgpu::ComputePipeline,
    /// Index `m - 1` reads mip `m - 1` and writes mip `m`.
    bind_groups: Vec<wgpu::BindGroup>,
}

impl EnvMipPass {
    pub fn new(device: &wgpu::Device, resources: &IblResources) -> Result<Self> {
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Env Mip BGL"),
            entries: &[
                texture_entry(
                    0,
                    wgpu::ShaderStages::COMPUTE,
                    wgpu::TextureSampleType::Float { filterable: false },
                    wgpu::TextureViewDimension::D2Array,
                ),
                storage_entry(1, ENVIRONMENT_FORMAT, wgpu::TextureViewDimension::D2Array),
            ],
        });
        let pipeline = create_compute_pipeline(device, &CUBE_MIP_DOWNSAMPLE, &bgl)?;

        let bind_groups = resources
            .environment_mips
            .windows(2)
            .enumerate()
            .map(|(index, pair)| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("Env Mip {} BG", index + 1)),
                    layout: &bgl,
                    entries: &[
                        wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&pair[0]) },
                        wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&pair[1]) },
                    ],
                })
            })
            .collect();
        Ok(Self { pipeline, bind_groups })
    }

    /// Records the downsample into `mip` (>= 1).
    pub fn encode(&self, pass: &mut wgpu::ComputePass<'_>, resources: &IblResources, mip: u32) -> Result<()> {
        let index = mip.checked_sub(1).context("Environment mip 0 is produced by capture")?;
        let bind_group = self.bind_groups.get(index as usize).context("Environment mip out of range")?;
        let size = (resources.layout.environment_size >> mip).max(1);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(workgroups(size), workgroups(size), 6);
        Ok(())
    }
}
