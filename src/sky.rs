//! Precomputed atmospheric scattering tables and the sun state driving the analytic sky.
//!
//! The tables are raw little-endian `f32` RGBA blobs produced offline; they are read as-is
//! and only checked for length against their configured dimensions.

use std::fs;
use std::path::Path;

use glam::Vec3;

use crate::config::SkyConfig;
use crate::error::IblError;
use crate::wrap_angle;

/// One RGBA `f32` table, `dims = [width, height, depth]` (depth 1 for 2D tables).
#[derive(Debug, Clone)]
pub struct SkyTable {
    dims: [u32; 3],
    data: Vec<f32>,
}

impl SkyTable {
    pub fn from_raw(dims: [u32; 3], data: Vec<f32>) -> Option<Self> {
        (data.len() == texel_count(dims) * 4).then_some(Self { dims, data })
    }

    pub fn read(path: &Path, dims: [u32; 3]) -> Result<Self, IblError> {
        let bytes = fs::read(path)
            .map_err(|source| IblError::Io { kind: "sky table", path: path.to_path_buf(), source })?;
        let expected = texel_count(dims) * 4 * std::mem::size_of::<f32>();
        if bytes.len() < expected {
            return Err(IblError::TableSize { path: path.to_path_buf(), expected, actual: bytes.len() });
        }
        let data = bytes[..expected]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        log::debug!("[sky] loaded {} ({}x{}x{})", path.display(), dims[0], dims[1], dims[2]);
        Ok(Self { dims, data })
    }

    pub fn dims(&self) -> [u32; 3] {
        self.dims
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

fn texel_count(dims: [u32; 3]) -> usize {
    dims.iter().map(|d| *d as usize).product()
}

#[derive(Debug, Clone)]
pub struct SkyTables {
    pub transmittance: SkyTable,
    pub irradiance: SkyTable,
    pub inscatter: SkyTable,
}

impl SkyTables {
    pub fn load(config: &SkyConfig) -> Result<Self, IblError> {
        let [tw, th] = config.transmittance_size;
        let [iw, ih] = config.irradiance_size;
        Ok(Self {
            transmittance: SkyTable::read(&config.transmittance_path, [tw, th, 1])?,
            irradiance: SkyTable::read(&config.irradiance_path, [iw, ih, 1])?,
            inscatter: SkyTable::read(&config.inscatter_path, config.inscatter_size)?,
        })
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkyUniform {
    /// `xyz` sun direction, `w` sun intensity.
    pub sun: [f32; 4],
    /// `x` camera radius in km, `y` Mie asymmetry.
    pub observer: [f32; 4],
    /// In-scatter resolution `(r, mu, mu_s, nu)`.
    pub resolution: [f32; 4],
}

/// Loaded tables plus the one mutable parameter, the sun angle above the horizon.
#[derive(Debug, Clone)]
pub struct SkyModel {
    tables: SkyTables,
    sun_angle: f32,
    camera_height_km: f32,
    sun_intensity: f32,
    mie_g: f32,
    res_mu_s: u32,
    res_nu: u32,
}

pub const GROUND_RADIUS_KM: f32 = 6360.0;

impl SkyModel {
    pub fn new(tables: SkyTables, config: &SkyConfig) -> Self {
        let width = tables.inscatter.dims()[0];
        let res_mu_s = config.res_mu_s.clamp(1, width.max(1));
        let res_nu = (width / res_mu_s).max(1);
        if res_mu_s * res_nu != width {
            log::warn!("[sky] in-scatter width {width} is not a multiple of res_mu_s {res_mu_s}");
        }
        Self {
            tables,
            sun_angle: wrap_angle(config.sun_angle),
            camera_height_km: config.camera_height_km.max(0.0),
            sun_intensity: config.sun_intensity,
            mie_g: config.mie_g,
            res_mu_s,
            res_nu,
        }
    }

    pub fn load(config: &SkyConfig) -> Result<Self, IblError> {
        Ok(Self::new(SkyTables::load(config)?, config))
    }

    pub fn tables(&self) -> &SkyTables {
        &self.tables
    }

    pub fn sun_angle(&self) -> f32 {
        self.sun_angle
    }

    /// Returns true when the angle changed, which invalidates the environment cubemap.
    pub fn set_sun_angle(&mut self, radians: f32) -> bool {
        let wrapped = wrap_angle(radians);
        if (wrapped - self.sun_angle).abs() <= f32::EPSILON {
            return false;
        }
        self.sun_angle = wrapped;
        true
    }

    pub fn sun_direction(&self) -> Vec3 {
        Vec3::new(0.0, self.sun_angle.sin(), self.sun_angle.cos()).normalize()
    }

    pub fn uniform(&self) -> SkyUniform {
        let [_, res_mu, res_r] = self.tables.inscatter.dims();
        SkyUniform {
            sun: self.sun_direction().extend(self.sun_intensity).to_array(),
            observer: [GROUND_RADIUS_KM + self.camera_height_km, self.mie_g, 0.0, 0.0],
            resolution: [res_r as f32, res_mu as f32, self.res_mu_s as f32, self.res_nu as f32],
        }
    }
}
