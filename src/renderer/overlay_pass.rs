use anyhow::Result;
use winit::dpi::PhysicalSize;

use super::resources::IblResources;
use super::shaders::{checked, DEBUG_OVERLAY};
use super::{sampler_entry, texture_entry, FrameTarget};

const OVERLAY_FRACTION: f32 = 0.25;
const OVERLAY_MARGIN: f32 = 16.0;

/// Square viewport in the bottom-right corner as `(x, y, side)`.
pub fn overlay_viewport(size: PhysicalSize<u32>) -> Option<(f32, f32, f32)> {
    let (width, height) = (size.width as f32, size.height as f32);
    let side = (width.min(height) * OVERLAY_FRACTION).floor();
    if side < 1.0 || side + OVERLAY_MARGIN > width || side + OVERLAY_MARGIN > height {
        return None;
    }
    Some((width - side - OVERLAY_MARGIN, height - side - OVERLAY_MARGIN, side))
}

/// Shows the BRDF LUT as a debug inset.
pub struct OverlayPass {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
}

impl OverlayPass {
    pub fn new(device: &wgpu::Device, resources: &IblResources, target_format: wgpu::TextureFormat) -> Result<Self> {
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Overlay BGL"),
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
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Overlay BG"),
            layout: &bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&resources.brdf_lut_view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(&resources.linear_sampler) },
            ],
        });
        let module = DEBUG_OVERLAY.create_module(device)?;
        let pipeline = checked(device, DEBUG_OVERLAY.label, || {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Overlay Pipeline Layout"),
                bind_group_layouts: &[&bgl],
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Overlay Pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    buffers: &[],
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
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;
        Ok(Self { pipeline, bind_group })
    }

    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, target: &FrameTarget<'_>) {
        let Some((x, y, side)) = overlay_viewport(target.size) else {
            return;
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Debug Overlay Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations { load: wgpu::LoadOp::Load, store: wgpu::StoreOp::Store },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_viewport(x, y, side, side, 0.0, 1.0);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}
