use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};

use super::cubemap::CpuCubemap;
use super::{prefilter_roughness, MAX_SAMPLE_COUNT};

/// Van der Corput radical inverse in base 2, in `[0, 1)`. Keeps the top 24 reversed bits so the
/// result is exact in `f32`.
pub fn radical_inverse_vdc(bits: u32) -> f32 {
    let mut b = bits;
    b = (b << 16) | (b >> 16);
    b = ((b & 0x5555_5555) << 1) | ((b & 0xAAAA_AAAA) >> 1);
    b = ((b & 0x3333_3333) << 2) | ((b & 0xCCCC_CCCC) >> 2);
    b = ((b & 0x0F0F_0F0F) << 4) | ((b & 0xF0F0_F0F0) >> 4);
    b = ((b & 0x00FF_00FF) << 8) | ((b & 0xFF00_FF00) >> 8);
    (b >> 8) as f32 * (1.0 / 16_777_216.0)
}

pub fn hammersley(i: u32, n: u32) -> Vec2 {
    Vec2::new(i as f32 / n.max(1) as f32, radical_inverse_vdc(i))
}

/// GGX half vector in tangent space (`+Z` is the surface normal), `a = roughness²`.
pub fn importance_sample_ggx(xi: Vec2, roughness: f32) -> Vec3 {
    let a = roughness * roughness;
    let phi = TAU * xi.x;
    let cos_theta = ((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y)).max(0.0).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta)
}

pub fn ggx_distribution(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let d = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    a2 / (PI * d * d).max(1e-12)
}

pub fn tangent_to_world(normal: Vec3, vec: Vec3) -> Vec3 {
    let up = if normal.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = normal.cross(up).normalize();
    let bitangent = normal.cross(tangent);
    tangent * vec.x + bitangent * vec.y + normal * vec.z
}

pub fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - 2.0 * v.dot(n) * n
}

pub fn clamp_sample_count(requested: u32) -> u32 {
    requested.clamp(1, MAX_SAMPLE_COUNT as u32)
}

/// Source mip to read for one GGX sample so the sample's footprint matches the texel
/// footprint of the source cubemap. Zero for a mirror lobe.
pub fn source_lod(n_dot_h: f32, roughness: f32, sample_count: u32, source_size: u32, source_mips: u32) -> f32 {
    if roughness <= 0.0 || source_mips <= 1 {
        return 0.0;
    }
    let pdf = ggx_distribution(n_dot_h, roughness) * 0.25;
    let texel_solid_angle = 4.0 * PI / (6.0 * (source_size as f32).powi(2));
    let sample_solid_angle = 1.0 / (sample_count.max(1) as f32 * pdf + 1e-4);
    let lod = 0.5 * (sample_solid_angle / texel_solid_angle).log2() + 1.0;
    lod.clamp(0.0, (source_mips - 1) as f32)
}

/// GPU layout of one prefilter mip's sample-direction buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PrefilterSampleBlock {
    pub roughness: f32,
    pub sample_count: u32,
    pub face_size: u32,
    pub source_max_lod: f32,
    /// `xyz` tangent-space half vector, `w` source mip.
    pub samples: [[f32; 4]; MAX_SAMPLE_COUNT],
}

impl PrefilterSampleBlock {
    pub fn active(&self) -> &[[f32; 4]] {
        &self.samples[..(self.sample_count as usize).min(MAX_SAMPLE_COUNT)]
    }
}

/// Per-mip sample buffers, allocated once at full capacity. Changing the sample count only
/// rewrites the used prefix of every block.
pub struct SampleArena {
    blocks: Vec<PrefilterSampleBlock>,
    base_size: u32,
    source_size: u32,
    source_mips: u32,
    sample_count: u32,
    generation: u64,
    dirty: bool,
}

impl SampleArena {
    pub fn new(mip_levels: u32, base_size: u32, source_size: u32, source_mips: u32, sample_count: u32) -> Self {
        let mut arena = Self {
            blocks: vec![bytemuck::Zeroable::zeroed(); mip_levels.max(1) as usize],
            base_size,
            source_size,
            source_mips,
            sample_count: 0,
            generation: 0,
            dirty: false,
        };
        arena.regenerate(sample_count);
        arena
    }

    pub const fn capacity() -> usize {
        MAX_SAMPLE_COUNT
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn mip_levels(&self) -> u32 {
        self.blocks.len() as u32
    }

    pub fn block(&self, mip: u32) -> Option<&PrefilterSampleBlock> {
        self.blocks.get(mip as usize)
    }

    pub fn blocks(&self) -> &[PrefilterSampleBlock] {
        &self.blocks
    }

    /// Requests a new sample count. Returns true when the blocks were regenerated.
    pub fn set_sample_count(&mut self, requested: u32) -> bool {
        if clamp_sample_count(requested) == self.sample_count {
            return false;
        }
        self.regenerate(requested);
        true
    }

    /// Refills every mip block for `requested` samples, clamped to the buffer capacity.
    pub fn regenerate(&mut self, requested: u32) -> u32 {
        let count = clamp_sample_count(requested);
        if count != requested {
            log::warn!("[ibl] sample count {requested} clamped to {count} (capacity {MAX_SAMPLE_COUNT})");
        }
        let levels = self.blocks.len() as u32;
        for (mip, block) in self.blocks.iter_mut().enumerate() {
            let mip = mip as u32;
            let roughness = prefilter_roughness(mip, levels);
            block.roughness = roughness;
            block.sample_count = count;
            block.face_size = (self.base_size >> mip).max(1);
            block.source_max_lod = self.source_mips.saturating_sub(1) as f32;
            for (i, slot) in block.samples.iter_mut().enumerate() {
                let i = i as u32;
                *slot = if i < count {
                    let h = importance_sample_ggx(hammersley(i, count), roughness);
                    let lod = source_lod(h.z, roughness, count, self.source_size, self.source_mips);
                    [h.x, h.y, h.z, lod]
                } else {
                    [0.0; 4]
                };
            }
        }
        self.sample_count = count;
        self.generation += 1;
        self.dirty = true;
        count
    }

    /// Returns true once after each regeneration so the uploader writes the blocks exactly once.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

/// CPU evaluation of one prefiltered texel: GGX lobe around `normal` with `N = V = R`.
/// Reads the base level of `source` for every sample.
pub fn prefilter_reference(source: &CpuCubemap, normal: Vec3, block: &PrefilterSampleBlock) -> Vec3 {
    let n = normal.normalize();
    let mut color = Vec3::ZERO;
    let mut weight = 0.0;
    for sample in block.active() {
        let h = tangent_to_world(n, Vec3::new(sample[0], sample[1], sample[2])).normalize();
        let l = reflect(-n, h).normalize();
        let n_dot_l = n.dot(l);
        if n_dot_l > 0.0 {
            color += source.sample(l) * n_dot_l;
            weight += n_dot_l;
        }
    }
    if weight > 0.0 {
        color / weight
    } else {
        source.sample(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hammersley_first_coordinate_is_index_over_count() {
        for i in 0..32 {
            assert_eq!(hammersley(i, 32).x, i as f32 / 32.0);
        }
    }

    #[test]
    fn radical_inverse_reverses_bits() {
        assert_eq!(radical_inverse_vdc(0), 0.0);
        assert_eq!(radical_inverse_vdc(1), 0.5);
        assert_eq!(radical_inverse_vdc(2), 0.25);
        assert_eq!(radical_inverse_vdc(3), 0.75);
        assert!(radical_inverse_vdc(u32::MAX >> 8) < 1.0);
        assert!(radical_inverse_vdc(0x01FF_FFFF) < 1.0);
        assert!(radical_inverse_vdc(u32::MAX) < 1.0);
        assert!(hammersley(0x01FF_FFFF, u32::MAX).y < 1.0);
    }

    #[test]
    fn hammersley_second_coordinate_is_a_permuted_grid() {
        for n in [16u32, 64, 1024] {
            let mut ys: Vec<f32> = (0..n).map(|i| hammersley(i, n).y).collect();
            ys.sort_by(f32::total_cmp);
            for (k, y) in ys.iter().enumerate() {
                assert_eq!(*y, k as f32 / n as f32, "n = {n}, k = {k}");
            }
            let min_gap = ys.windows(2).map(|pair| pair[1] - pair[0]).fold(f32::MAX, f32::min);
            assert!(min_gap >= 1.0 / n as f32, "n = {n}: gap {min_gap}");
        }
    }

    #[test]
    fn mirror_roughness_collapses_onto_normal() {
        for i in 0..16 {
            let h = importance_sample_ggx(hammersley(i, 16), 0.0);
            assert!((h - Vec3::Z).length() < 1e-5, "sample {i} was {h:?}");
        }
    }

    #[test]
    fn ggx_samples_are_unit_and_upper_hemisphere() {
        for roughness in [0.1, 0.5, 1.0] {
            for i in 0..64 {
                let h = importance_sample_ggx(hammersley(i, 64), roughness);
                assert!((h.length() - 1.0).abs() < 1e-4);
                assert!(h.z >= 0.0);
            }
        }
    }

    #[test]
    fn rougher_lobes_spread_further() {
        let mean_cos = |roughness: f32| {
            (0..64).map(|i| importance_sample_ggx(hammersley(i, 64), roughness).z).sum::<f32>() / 64.0
        };
        assert!(mean_cos(0.2) > mean_cos(0.6));
        assert!(mean_cos(0.6) > mean_cos(1.0));
    }

    #[test]
    fn source_lod_is_zero_for_mirror_and_bounded_otherwise() {
        assert_eq!(source_lod(1.0, 0.0, 32, 512, 10), 0.0);
        for i in 0..32 {
            let h = importance_sample_ggx(hammersley(i, 32), 1.0);
            let lod = source_lod(h.z, 1.0, 32, 512, 10);
            assert!((0.0..=9.0).contains(&lod));
        }
    }

    #[test]
    fn arena_fills_prefix_and_zeroes_tail() {
        let arena = SampleArena::new(7, 256, 512, 10, 16);
        assert_eq!(arena.mip_levels(), 7);
        for (mip, block) in arena.blocks().iter().enumerate() {
            assert_eq!(block.sample_count, 16);
            assert_eq!(block.face_size, 256 >> mip);
            assert!(block.samples[..16].iter().all(|s| s[2] > 0.0));
            assert!(block.samples[16..].iter().all(|s| *s == [0.0; 4]));
        }
        assert_eq!(arena.block(0).map(|b| b.roughness), Some(0.0));
        assert_eq!(arena.block(6).map(|b| b.roughness), Some(1.0));
    }

    #[test]
    fn arena_clamps_requests_to_capacity() {
        let mut arena = SampleArena::new(2, 64, 64, 7, 0);
        assert_eq!(arena.sample_count(), 1);
        assert_eq!(arena.regenerate(500), SampleArena::capacity() as u32);
        assert_eq!(arena.block(1).map(|b| b.active().len()), Some(SampleArena::capacity()));
    }

    #[test]
    fn dirty_flag_is_consumed_once_per_regeneration() {
        let mut arena = SampleArena::new(3, 64, 64, 7, 8);
        assert!(arena.take_dirty());
        assert!(!arena.take_dirty());
        assert!(!arena.set_sample_count(8));
        assert!(!arena.take_dirty());
        assert!(arena.set_sample_count(9));
        assert!(arena.take_dirty());
    }

    #[test]
    fn prefilter_reference_preserves_uniform_radiance() {
        let source = CpuCubemap::uniform(16, Vec3::splat(0.5));
        let arena = SampleArena::new(5, 16, 16, 5, 32);
        for block in arena.blocks() {
            let value = prefilter_reference(&source, Vec3::new(0.3, -0.2, 0.9), block);
            assert!((value - Vec3::splat(0.5)).abs().max_element() < 1e-5);
        }
    }
}
