use std::f32::consts::{PI, TAU};
use std::path::Path;

use glam::{Vec2, Vec3};
use image::{DynamicImage, ImageReader};

use crate::error::IblError;

/// Linear RGB equirectangular panorama.
#[derive(Debug, Clone)]
pub struct HdrImage {
    width: u32,
    height: u32,
    pixels: Vec<Vec3>,
}

impl HdrImage {
    pub fn new(width: u32, height: u32, pixels: Vec<Vec3>) -> Option<Self> {
        if width == 0 || height == 0 || pixels.len() != (width * height) as usize {
            return None;
        }
        Some(Self { width, height, pixels })
    }

    pub fn uniform(width: u32, height: u32, color: Vec3) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self { width, height, pixels: vec![color; (width * height) as usize] }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, IblError> {
        let path = path.as_ref();
        let reader = ImageReader::open(path)
            .map_err(|source| IblError::Io { kind: "panorama", path: path.to_path_buf(), source })?
            .with_guessed_format()
            .map_err(|source| IblError::Io { kind: "panorama", path: path.to_path_buf(), source })?;
        let image =
            reader.decode().map_err(|source| IblError::Image { path: path.to_path_buf(), source })?;
        Ok(Self::from_dynamic(&image))
    }

    pub fn from_dynamic(image: &DynamicImage) -> Self {
        let rgb = image.to_rgb32f();
        let pixels = rgb.pixels().map(|pixel| Vec3::from_array(pixel.0)).collect();
        Self { width: rgb.width(), height: rgb.height(), pixels }
    }

    /// Neutral sky/ground gradient with a soft sun, used when no panorama is configured.
    pub fn generated_default() -> Self {
        let width = 256u32;
        let height = 128u32;
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            let v = y as f32 / (height - 1) as f32;
            for x in 0..width {
                let u = x as f32 / (width - 1) as f32;
                let horizon = (1.0 - (2.0 * (v - 0.5)).abs()).clamp(0.0, 1.0);
                let sky = Vec3::new(0.25, 0.35, 0.6) * (1.0 - v) + Vec3::new(0.65, 0.7, 0.9) * v;
                let sun_offset = Vec2::new(u - 0.2, v - 0.35);
                let sun = (1.0 - sun_offset.length() * 6.0).max(0.0).powf(12.0);
                let ground =
                    Vec3::new(0.08, 0.07, 0.05) * (1.0 - horizon) + Vec3::new(0.2, 0.18, 0.16) * horizon;
                let mut color = if v < 0.5 { sky * (0.6 + 0.4 * horizon) } else { ground };
                color += Vec3::new(1.0, 0.9, 0.75) * sun * 8.0;
                pixels.push(color);
            }
        }
        Self { width, height, pixels }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vec3 {
        self.pixels[(y.min(self.height - 1) * self.width + x.min(self.width - 1)) as usize]
    }

    /// Interleaved RGBA floats, alpha 1, ready for a half-float upload.
    pub fn to_rgba(&self) -> Vec<f32> {
        self.pixels.iter().flat_map(|p| [p.x, p.y, p.z, 1.0]).collect()
    }

    /// Bilinear lookup with the same addressing as the GPU sampler: `u` repeats, `v` clamps.
    pub fn sample(&self, dir: Vec3) -> Vec3 {
        let uv = equirect_uv(dir);
        let x = uv.x * self.width as f32 - 0.5;
        let y = (uv.y * self.height as f32 - 0.5).clamp(0.0, (self.height - 1) as f32);
        let x0 = x.floor();
        let y0 = y.floor();
        let tx = x - x0;
        let ty = y - y0;
        let ix0 = (x0 as i64).rem_euclid(self.width as i64) as u32;
        let ix1 = (x0 as i64 + 1).rem_euclid(self.width as i64) as u32;
        let iy0 = y0 as u32;
        let iy1 = (iy0 + 1).min(self.height - 1);
        let c0 = self.pixel(ix0, iy0).lerp(self.pixel(ix1, iy0), tx);
        let c1 = self.pixel(ix0, iy1).lerp(self.pixel(ix1, iy1), tx);
        c0.lerp(c1, ty)
    }
}

/// Panorama coordinates of `dir`: longitude across `u`, colatitude down `v`.
pub fn equirect_uv(dir: Vec3) -> Vec2 {
    let d = dir.normalize();
    let theta = d.y.clamp(-1.0, 1.0).acos();
    let phi = d.z.atan2(d.x);
    Vec2::new((phi + PI) / TAU, theta / PI)
}
