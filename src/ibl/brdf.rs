use glam::Vec3;

use super::sampling::{hammersley, importance_sample_ggx, reflect};

pub const DEFAULT_LUT_SIZE: u32 = 512;
pub const DEFAULT_SAMPLE_COUNT: u32 = 1024;

/// Split-sum environment BRDF: returns `(scale, bias)` applied to F0 as `F0 * scale + bias`.
pub fn integrate_brdf(n_dot_v: f32, roughness: f32, sample_count: u32) -> (f32, f32) {
    let n_dot_v = n_dot_v.clamp(1e-4, 1.0);
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).max(0.0).sqrt(), 0.0, n_dot_v);
    let sample_count = sample_count.max(1);
    let mut a = 0.0f32;
    let mut b = 0.0f32;
    for i in 0..sample_count {
        let h = importance_sample_ggx(hammersley(i, sample_count), roughness);
        let l = reflect(-v, h);
        let n_dot_l = l.z.max(0.0);
        let n_dot_h = h.z.max(0.0);
        let v_dot_h = v.dot(h).max(0.0);
        if n_dot_l > 0.0 {
            let g = geometry_smith(n_dot_v, n_dot_l, roughness);
            let g_vis = (g * v_dot_h) / (n_dot_h * n_dot_v).max(1e-4);
            let fc = (1.0 - v_dot_h).powi(5);
            a += (1.0 - fc) * g_vis;
            b += fc * g_vis;
        }
    }
    let scale = 1.0 / sample_count as f32;
    (a * scale, b * scale)
}

fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness)
}

/// Schlick-GGX with the image-based-lighting remap `k = α / 2`, `α = roughness²`.
fn geometry_schlick_ggx(n_dot_v: f32, roughness: f32) -> f32 {
    let k = roughness * roughness * 0.5;
    n_dot_v / (n_dot_v * (1.0 - k) + k)
}

/// Texel center of LUT column/row `index` in `[0, 1]`.
pub fn lut_coordinate(index: u32, size: u32) -> f32 {
    (index as f32 + 0.5) / size.max(1) as f32
}

#[derive(Debug, Clone)]
pub struct BrdfLut {
    size: u32,
    texels: Vec<(f32, f32)>,
}

impl BrdfLut {
    /// Rows are roughness, columns are `N·V`, matching the GPU table.
    pub fn compute(size: u32, sample_count: u32) -> Self {
        let size = size.max(1);
        let mut texels = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            let roughness = lut_coordinate(y, size);
            for x in 0..size {
                texels.push(integrate_brdf(lut_coordinate(x, size), roughness, sample_count));
            }
        }
        Self { size, texels }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn texel(&self, x: u32, y: u32) -> (f32, f32) {
        let x = x.min(self.size - 1);
        let y = y.min(self.size - 1);
        self.texels[(y * self.size + x) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smooth_head_on_reflection_is_unit_scale_zero_bias() {
        let (scale, bias) = integrate_brdf(1.0, 0.0, 256);
        assert!((scale - 1.0).abs() < 1e-3, "scale {scale}");
        assert!(bias.abs() < 1e-3, "bias {bias}");
    }

    #[test]
    fn lut_values_stay_energy_bounded() {
        let lut = BrdfLut::compute(8, 128);
        for y in 0..8 {
            for x in 0..8 {
                let (scale, bias) = lut.texel(x, y);
                assert!(scale.is_finite() && bias.is_finite());
                assert!(scale >= 0.0 && bias >= 0.0);
                assert!(scale + bias <= 1.1, "texel ({x}, {y}) = {scale} + {bias}");
            }
        }
    }

    #[test]
    fn grazing_angles_raise_fresnel_bias() {
        let (_, grazing_bias) = integrate_brdf(0.1, 0.3, 512);
        let (_, head_on_bias) = integrate_brdf(0.95, 0.3, 512);
        assert!(grazing_bias > head_on_bias);
    }

    #[test]
    fn lut_rows_are_roughness() {
        let lut = BrdfLut::compute(8, 64);
        let smooth = lut.texel(7, 0);
        let rough = lut.texel(7, 7);
        assert!(smooth.0 > rough.0, "rougher rows lose energy at normal incidence");
    }
}
