//! GPU side of the pipeline: surface management, the IBL resource set, one module per pass and
//! readback helpers used by the tests.

mod brdf_pass;
mod capture_pass;
mod env_mip_pass;
mod overlay_pass;
mod prefilter_pass;
pub mod readback;
pub mod resources;
mod scene_pass;
pub mod shaders;
mod sh_pass;
mod skybox_pass;
mod window_surface;

use anyhow::Result;
use winit::dpi::PhysicalSize;

pub use brdf_pass::BrdfPass;
pub use capture_pass::{CapturePass, CaptureSource};
pub use env_mip_pass::EnvMipPass;
pub use overlay_pass::{overlay_viewport, OverlayPass};
pub use prefilter_pass::PrefilterPass;
pub use scene_pass::{sphere_grid, ScenePass, SphereInstance};
pub use sh_pass::ShPass;
pub use skybox_pass::{SkyboxPass, SkyboxUniform};
pub use window_surface::{request_headless_device, SurfaceFrame, WindowSurface};

use shaders::{checked, WgslShader};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Edge length of the compute work-groups used by the image passes.
const WORKGROUP_EDGE: u32 = 8;

/// Color and depth views a frame's render stages draw into.
pub struct FrameTarget<'a> {
    pub color: &'a wgpu::TextureView,
    pub depth: &'a wgpu::TextureView,
    pub size: PhysicalSize<u32>,
}

fn workgroups(size: u32) -> u32 {
    size.div_ceil(WORKGROUP_EDGE).max(1)
}

fn texture_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    sample_type: wgpu::TextureSampleType,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture { sample_type, view_dimension, multisampled: false },
        count: None,
    }
}

fn storage_entry(
    binding: u32,
    format: wgpu::TextureFormat,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture { access: wgpu::StorageTextureAccess::WriteOnly, format, view_dimension },
        count: None,
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn create_compute_pipeline(
    device: &wgpu::Device,
    shader: &WgslShader,
    bgl: &wgpu::BindGroupLayout,
) -> Result<wgpu::ComputePipeline> {
    let module = shader.create_module(device)?;
    let pipeline = checked(device, shader.label, || {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(shader.label),
            bind_group_layouts: &[bgl],
            push_constant_ranges: &[],
        });
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(shader.label),
            layout: Some(&layout),
            module: &module,
            entry_point: Some("cs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        })
    })?;
    Ok(pipeline)
}
