//! Order-2 real spherical harmonics (9 coefficients).

use std::f32::consts::PI;

use glam::Vec3;

use super::cubemap::{texel_direction, texel_solid_angle, CpuCubemap, CubeFace};
use super::{SH_COEFFICIENT_COUNT, SH_TILE_SIZE};

const Y00: f32 = 0.282_094_8;
const Y1: f32 = 0.488_602_5;
const Y2: f32 = 1.092_548_4;
const Y20: f32 = 0.315_391_6;
const Y22: f32 = 0.546_274_2;

/// Clamped-cosine convolution weights per band.
const COSINE_LOBE: [f32; 3] = [PI, 2.0 * PI / 3.0, PI / 4.0];
const BAND: [usize; SH_COEFFICIENT_COUNT] = [0, 1, 1, 1, 2, 2, 2, 2, 2];

pub fn sh_basis(dir: Vec3) -> [f32; SH_COEFFICIENT_COUNT] {
    let Vec3 { x, y, z } = dir;
    [
        Y00,
        Y1 * y,
        Y1 * z,
        Y1 * x,
        Y2 * x * y,
        Y2 * y * z,
        Y20 * (3.0 * z * z - 1.0),
        Y2 * x * z,
        Y22 * (x * x - y * y),
    ]
}

/// Projected radiance `∫ L Y_i dω` per basis function plus the integrated solid angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShCoefficients {
    pub coefficients: [Vec3; SH_COEFFICIENT_COUNT],
    pub weight: f32,
}

impl Default for ShCoefficients {
    fn default() -> Self {
        Self { coefficients: [Vec3::ZERO; SH_COEFFICIENT_COUNT], weight: 0.0 }
    }
}

impl ShCoefficients {
    /// Reads the 9-texel GPU layout: `rgb` coefficient, `a` integrated weight.
    pub fn from_texels(texels: &[[f32; 4]]) -> Option<Self> {
        if texels.len() < SH_COEFFICIENT_COUNT {
            return None;
        }
        let mut out = Self::default();
        for (slot, texel) in out.coefficients.iter_mut().zip(texels) {
            *slot = Vec3::new(texel[0], texel[1], texel[2]);
        }
        out.weight = texels[0][3];
        Some(out)
    }

    pub fn dc(&self) -> Vec3 {
        self.coefficients[0]
    }

    /// Reconstructed radiance along `dir`.
    pub fn radiance(&self, dir: Vec3) -> Vec3 {
        let basis = sh_basis(dir.normalize());
        self.coefficients.iter().zip(basis).map(|(c, y)| *c * y).sum()
    }

    /// Irradiance arriving at a surface facing `normal`.
    pub fn irradiance(&self, normal: Vec3) -> Vec3 {
        let basis = sh_basis(normal.normalize());
        let mut total = Vec3::ZERO;
        for i in 0..SH_COEFFICIENT_COUNT {
            total += self.coefficients[i] * basis[i] * COSINE_LOBE[BAND[i]];
        }
        total.max(Vec3::ZERO)
    }

    fn accumulate(&mut self, other: &ShCoefficients) {
        for (a, b) in self.coefficients.iter_mut().zip(other.coefficients.iter()) {
            *a += *b;
        }
        self.weight += other.weight;
    }
}

/// Projects `source` onto SH over a `sample_size`² grid per face, reducing per 8×8 tile
/// and then across tiles in the same order as the GPU passes.
pub fn project_cubemap(source: &CpuCubemap, sample_size: u32) -> ShCoefficients {
    let sample_size = sample_size.max(1);
    let tiles = sample_size.div_ceil(SH_TILE_SIZE);
    let mut partials = Vec::with_capacity((tiles * tiles * 6) as usize);
    for face in CubeFace::ALL {
        for ty in 0..tiles {
            for tx in 0..tiles {
                let mut tile = ShCoefficients::default();
                for ly in 0..SH_TILE_SIZE {
                    for lx in 0..SH_TILE_SIZE {
                        let x = tx * SH_TILE_SIZE + lx;
                        let y = ty * SH_TILE_SIZE + ly;
                        if x >= sample_size || y >= sample_size {
                            continue;
                        }
                        let dir = texel_direction(face, x, y, sample_size);
                        let weight = texel_solid_angle(x, y, sample_size);
                        let radiance = source.sample(dir);
                        for (slot, basis) in tile.coefficients.iter_mut().zip(sh_basis(dir)) {
                            *slot += radiance * basis * weight;
                        }
                        tile.weight += weight;
                    }
                }
                partials.push(tile);
            }
        }
    }
    let mut total = ShCoefficients::default();
    for tile in &partials {
        total.accumulate(tile);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOUR_PI: f32 = 4.0 * PI;

    #[test]
    fn uniform_environment_projects_onto_dc_only() {
        let source = CpuCubemap::uniform(32, Vec3::splat(0.5));
        let sh = project_cubemap(&source, 32);
        assert!((sh.weight - FOUR_PI).abs() / FOUR_PI < 1e-3, "weight {}", sh.weight);
        let expected = 0.5 * FOUR_PI.sqrt();
        assert!((sh.dc() - Vec3::splat(expected)).abs().max_element() < 1e-3);
        for coefficient in &sh.coefficients[1..] {
            assert!(coefficient.abs().max_element() < 1e-3, "{coefficient:?}");
        }
    }

    #[test]
    fn uniform_environment_irradiance_is_pi_times_radiance() {
        let sh = project_cubemap(&CpuCubemap::uniform(16, Vec3::ONE), 16);
        for normal in [Vec3::X, -Vec3::Y, Vec3::new(1.0, 1.0, -1.0)] {
            assert!((sh.irradiance(normal) - Vec3::splat(PI)).abs().max_element() < 1e-2);
        }
    }

    #[test]
    fn linear_gradient_reconstructs_exactly() {
        let source = CpuCubemap::from_fn(32, |dir| Vec3::splat(1.0 + 0.5 * dir.y));
        let sh = project_cubemap(&source, 32);
        for dir in [Vec3::Y, -Vec3::Y, Vec3::X, Vec3::new(0.3, 0.6, -0.2)] {
            let expected = 1.0 + 0.5 * dir.normalize().y;
            assert!((sh.radiance(dir).x - expected).abs() < 2e-2, "{dir:?}");
        }
    }

    #[test]
    fn texel_layout_round_trips_weight() {
        let mut texels = [[0.0f32; 4]; 9];
        texels[0] = [1.0, 2.0, 3.0, FOUR_PI];
        texels[8] = [4.0, 5.0, 6.0, FOUR_PI];
        let sh = ShCoefficients::from_texels(&texels).expect("nine texels");
        assert_eq!(sh.dc(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(sh.coefficients[8], Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(sh.weight, FOUR_PI);
        assert!(ShCoefficients::from_texels(&texels[..4]).is_none());
    }
}
