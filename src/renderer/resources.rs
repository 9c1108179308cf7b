//! GPU registry shared by every IBL pass. Each texture here has exactly one writer stage per frame.

use anyhow::{bail, Result};
use wgpu::util::DeviceExt;

use crate::ibl::panorama::HdrImage;
use crate::ibl::sampling::PrefilterSampleBlock;
use crate::ibl::{SH_COEFFICIENT_COUNT, SH_TILE_SIZE};
use crate::sky::{SkyModel, SkyTable, SkyUniform};

use super::DEPTH_FORMAT;

pub const ENVIRONMENT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const PREFILTER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const SH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
pub const BRDF_LUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Sizes every resource is allocated with; already sanitized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IblLayout {
    pub environment_size: u32,
    pub environment_mips: u32,
    pub prefilter_size: u32,
    pub prefilter_mips: u32,
    pub sh_sample_size: u32,
    pub brdf_lut_size: u32,
}

impl IblLayout {
    /// SH projection tiles per face edge.
    pub fn sh_tiles(&self) -> u32 {
        self.sh_sample_size.div_ceil(SH_TILE_SIZE)
    }

    /// Environment mip whose resolution matches the SH sample grid.
    pub fn sh_source_lod(&self) -> f32 {
        (self.environment_size as f32 / self.sh_sample_size.max(1) as f32).log2().max(0.0)
    }
}

pub struct SkyTextures {
    pub uniform: wgpu::Buffer,
    pub transmittance: wgpu::TextureView,
    pub irradiance: wgpu::TextureView,
    pub inscatter: wgpu::TextureView,
}

pub struct IblResources {
    pub layout: IblLayout,
    pub environment: wgpu::Texture,
    pub environment_cube: wgpu::TextureView,
    /// Mip 0 render target per face, in [`crate::ibl::cubemap::CubeFace`] order.
    pub environment_faces: Vec<wgpu::TextureView>,
    /// One six-layer view per mip, used both as downsample source and destination.
    pub environment_mips: Vec<wgpu::TextureView>,
    pub capture_depth: wgpu::TextureView,
    pub panorama: wgpu::TextureView,
    pub sh_partials: wgpu::TextureView,
    pub sh_coefficients: wgpu::Texture,
    pub sh_coefficients_view: wgpu::TextureView,
    pub prefiltered: wgpu::Texture,
    pub prefiltered_cube: wgpu::TextureView,
    pub prefiltered_mips: Vec<wgpu::TextureView>,
    /// One uniform block per prefilter mip.
    pub sample_buffers: Vec<wgpu::Buffer>,
    pub brdf_lut: wgpu::Texture,
    pub brdf_lut_view: wgpu::TextureView,
    pub linear_sampler: wgpu::Sampler,
    pub panorama_sampler: wgpu::Sampler,
    pub sky: Option<SkyTextures>,
}

impl IblResources {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: IblLayout,
        panorama: &HdrImage,
        sky: Option<&SkyModel>,
    ) -> Result<Self> {
        let max_2d = device.limits().max_texture_dimension_2d;
        if panorama.width() > max_2d || panorama.height() > max_2d {
            bail!(
                "Panorama {}x{} exceeds the adapter texture limit {max_2d}",
                panorama.width(),
                panorama.height()
            );
        }

        let environment = create_cube_texture(
            device,
            "Environment Cubemap",
            layout.environment_size,
            layout.environment_mips,
            ENVIRONMENT_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );
        let environment_cube = cube_view(&environment, "Environment Cube View");
        let environment_faces = (0..6)
            .map(|layer| {
                environment.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("Environment Face View"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_mip_level: 0,
                    mip_level_count: Some(1),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();
        let environment_mips = mip_array_views(&environment, "Environment Mip View", layout.environment_mips);

        let capture_depth = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("Capture Depth"),
                size: wgpu::Extent3d {
                    width: layout.environment_size,
                    height: layout.environment_size,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());

        let panorama = upload_half_texture(
            device,
            queue,
            "Panorama",
            [panorama.width(), panorama.height(), 1],
            wgpu::TextureDimension::D2,
            &panorama.to_rgba(),
        )
        .create_view(&wgpu::TextureViewDescriptor::default());

        let tiles = layout.sh_tiles();
        let sh_partials = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("SH Partials"),
                size: wgpu::Extent3d {
                    width: tiles * SH_COEFFICIENT_COUNT as u32,
                    height: tiles,
                    depth_or_array_layers: 6,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: SH_FORMAT,
                usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor {
                label: Some("SH Partials View"),
                dimension: Some(wgpu::TextureViewDimension::D2Array),
                ..Default::default()
            });

        let sh_coefficients = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("SH Coefficients"),
            size: wgpu::Extent3d { width: SH_COEFFICIENT_COUNT as u32, height: 1, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SH_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let sh_coefficients_view = sh_coefficients.create_view(&wgpu::TextureViewDescriptor::default());

        let prefiltered = create_cube_texture(
            device,
            "Prefiltered Cubemap",
            layout.prefilter_size,
            layout.prefilter_mips,
            PREFILTER_FORMAT,
            wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );
        let prefiltered_cube = cube_view(&prefiltered, "Prefiltered Cube View");
        let prefiltered_mips = mip_array_views(&prefiltered, "Prefiltered Mip View", layout.prefilter_mips);

        let sample_buffers = (0..layout.prefilter_mips)
            .map(|mip| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("Prefilter Samples Mip {mip}")),
                    size: std::mem::size_of::<PrefilterSampleBlock>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();

        let brdf_lut = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("BRDF LUT"),
            size: wgpu::Extent3d {
                width: layout.brdf_lut_size,
                height: layout.brdf_lut_size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: BRDF_LUT_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let brdf_lut_view = brdf_lut.create_view(&wgpu::TextureViewDescriptor::default());

        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("IBL Linear Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let panorama_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Panorama Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let sky = sky.map(|model| upload_sky(device, queue, model));

        log::info!(
            "[ibl] resources: environment {}² x{} mips, prefilter {}² x{} mips, SH grid {}², LUT {}²",
            layout.environment_size,
            layout.environment_mips,
            layout.prefilter_size,
            layout.prefilter_mips,
            layout.sh_sample_size,
            layout.brdf_lut_size
        );

        Ok(Self {
            layout,
            environment,
            environment_cube,
            environment_faces,
            environment_mips,
            capture_depth,
            panorama,
            sh_partials,
            sh_coefficients,
            sh_coefficients_view,
            prefiltered,
            prefiltered_cube,
            prefiltered_mips,
            sample_buffers,
            brdf_lut,
            brdf_lut_view,
            linear_sampler,
            panorama_sampler,
            sky,
        })
    }

    /// Writes every mip's sample block; callers gate this on the arena's dirty flag.
    pub fn upload_sample_blocks(&self, queue: &wgpu::Queue, blocks: &[PrefilterSampleBlock]) {
        for (buffer, block) in self.sample_buffers.iter().zip(blocks) {
            queue.write_buffer(buffer, 0, bytemuck::bytes_of(block));
        }
    }

    pub fn upload_sky_uniform(&self, queue: &wgpu::Queue, uniform: &SkyUniform) {
        if let Some(sky) = self.sky.as_ref() {
            queue.write_buffer(&sky.uniform, 0, bytemuck::bytes_of(uniform));
        }
    }
}

fn create_cube_texture(
    device: &wgpu::Device,
    label: &str,
    size: u32,
    mips: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d { width: size, height: size, depth_or_array_layers: 6 },
        mip_level_count: mips,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    })
}

fn cube_view(texture: &wgpu::Texture, label: &str) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(label),
        dimension: Some(wgpu::TextureViewDimension::Cube),
        ..Default::default()
    })
}

fn mip_array_views(texture: &wgpu::Texture, label: &str, mips: u32) -> Vec<wgpu::TextureView> {
    (0..mips)
        .map(|mip| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(label),
                dimension: Some(wgpu::TextureViewDimension::D2Array),
                base_mip_level: mip,
                mip_level_count: Some(1),
                base_array_layer: 0,
                array_layer_count: Some(6),
                ..Default::default()
            })
        })
        .collect()
}

fn f32_to_f16_bits(values: &[f32]) -> Vec<u16> {
    values.iter().map(|value| half::f16::from_f32(*value).to_bits()).collect()
}

/// RGBA float data uploaded as a sampled `Rgba16Float` texture.
fn upload_half_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    dims: [u32; 3],
    dimension: wgpu::TextureDimension,
    rgba: &[f32],
) -> wgpu::Texture {
    let halves = f32_to_f16_bits(rgba);
    device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d { width: dims[0], height: dims[1], depth_or_array_layers: dims[2] },
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format: wgpu::TextureFormat::Rgba16Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        bytemuck::cast_slice(&halves),
    )
}

fn upload_table(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    table: &SkyTable,
    dimension: wgpu::TextureDimension,
) -> wgpu::TextureView {
    upload_half_texture(device, queue, label, table.dims(), dimension, table.data())
        .create_view(&wgpu::TextureViewDescriptor::default())
}

fn upload_sky(device: &wgpu::Device, queue: &wgpu::Queue, model: &SkyModel) -> SkyTextures {
    let tables = model.tables();
    let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Sky Uniform"),
        contents: bytemuck::bytes_of(&model.uniform()),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    SkyTextures {
        uniform,
        transmittance: upload_table(
            device,
            queue,
            "Sky Transmittance",
            &tables.transmittance,
            wgpu::TextureDimension::D2,
        ),
        irradiance: upload_table(device, queue, "Sky Irradiance", &tables.irradiance, wgpu::TextureDimension::D2),
        inscatter: upload_table(device, queue, "Sky Inscatter", &tables.inscatter, wgpu::TextureDimension::D3),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(environment_size: u32, sh_sample_size: u32) -> IblLayout {
        IblLayout {
            environment_size,
            environment_mips: crate::ibl::full_mip_count(environment_size),
            prefilter_size: 256,
            prefilter_mips: 7,
            sh_sample_size,
            brdf_lut_size: 512,
        }
    }

    #[test]
    fn sh_grid_reads_matching_environment_mip() {
        assert_eq!(layout(512, 128).sh_source_lod(), 2.0);
        assert_eq!(layout(512, 128).sh_tiles(), 16);
        assert_eq!(layout(64, 64).sh_source_lod(), 0.0);
    }

    #[test]
    fn half_conversion_round_trips_representable_values() {
        let bits = f32_to_f16_bits(&[0.0, 0.5, 1.0, -2.0]);
        let back: Vec<f32> = bits.iter().map(|b| half::f16::from_bits(*b).to_f32()).collect();
        assert_eq!(back, vec![0.0, 0.5, 1.0, -2.0]);
    }
}
