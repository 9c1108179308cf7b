//! Blocking texture readback for tests and diagnostics.

use anyhow::{anyhow, bail, Context, Result};
use std::sync::mpsc;

/// Copies `layers` array layers of `mip` back to the CPU as RGBA floats, layer-major then row-major.
pub fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    mip: u32,
    layers: u32,
) -> Result<Vec<[f32; 4]>> {
    let format = texture.format();
    let texel_bytes = match format {
        wgpu::TextureFormat::Rgba16Float => 8u32,
        wgpu::TextureFormat::Rgba32Float => 16u32,
        other => bail!("Readback does not support {other:?}"),
    };
    if mip >= texture.mip_level_count() {
        bail!("Mip {mip} out of range for a {}-level texture", texture.mip_level_count());
    }
    let width = (texture.width() >> mip).max(1);
    let height = (texture.height() >> mip).max(1);
    let unpadded = width * texel_bytes;
    let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Buffer"),
        size: (padded * height * layers) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Readback") });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: mip,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d { width, height, depth_or_array_layers: layers },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::PollType::wait_indefinitely()).context("Device poll failed during readback")?;
    rx.recv().map_err(|_| anyhow!("Readback callback dropped"))?.context("Failed to map readback buffer")?;

    let mut texels = Vec::with_capacity((width * height * layers) as usize);
    {
        let data = slice.get_mapped_range();
        for row in data.chunks_exact(padded as usize) {
            for texel in row[..unpadded as usize].chunks_exact(texel_bytes as usize) {
                texels.push(decode_texel(format, texel));
            }
        }
    }
    buffer.unmap();
    Ok(texels)
}

fn decode_texel(format: wgpu::TextureFormat, bytes: &[u8]) -> [f32; 4] {
    let mut out = [0.0f32; 4];
    match format {
        wgpu::TextureFormat::Rgba16Float => {
            for (slot, chunk) in out.iter_mut().zip(bytes.chunks_exact(2)) {
                *slot = half::f16::from_bits(u16::from_le_bytes([chunk[0], chunk[1]])).to_f32();
            }
        }
        _ => {
            for (slot, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
                *slot = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_half_and_full_floats() {
        let half_bytes: Vec<u8> = [0.5f32, 1.0, 2.0, -1.0]
            .iter()
            .flat_map(|v| half::f16::from_f32(*v).to_bits().to_le_bytes())
            .collect();
        assert_eq!(decode_texel(wgpu::TextureFormat::Rgba16Float, &half_bytes), [0.5, 1.0, 2.0, -1.0]);
        let full_bytes: Vec<u8> = [0.25f32, 3.0, 4.5, 1.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(decode_texel(wgpu::TextureFormat::Rgba32Float, &full_bytes), [0.25, 3.0, 4.5, 1.0]);
    }
}
