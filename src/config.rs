use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ibl::{full_mip_count, DisplayMode, MAX_SAMPLE_COUNT};

pub const DEFAULT_CONFIG_PATH: &str = "config/app.json";

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub fullscreen: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    /// Equirectangular panorama; the generated gradient sky is used when absent.
    #[serde(default)]
    pub panorama: Option<PathBuf>,
    #[serde(default = "EnvironmentConfig::default_cubemap_size")]
    pub cubemap_size: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IblConfig {
    #[serde(default = "IblConfig::default_prefilter_size")]
    pub prefilter_size: u32,
    #[serde(default = "IblConfig::default_prefilter_mip_levels")]
    pub prefilter_mip_levels: u32,
    #[serde(default = "IblConfig::default_sh_sample_size")]
    pub sh_sample_size: u32,
    #[serde(default = "IblConfig::default_sample_count")]
    pub sample_count: u32,
    #[serde(default = "IblConfig::default_brdf_lut_size")]
    pub brdf_lut_size: u32,
    #[serde(default = "IblConfig::default_brdf_sample_count")]
    pub brdf_sample_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "SkyConfig::default_transmittance_path")]
    pub transmittance_path: PathBuf,
    #[serde(default = "SkyConfig::default_transmittance_size")]
    pub transmittance_size: [u32; 2],
    #[serde(default = "SkyConfig::default_irradiance_path")]
    pub irradiance_path: PathBuf,
    #[serde(default = "SkyConfig::default_irradiance_size")]
    pub irradiance_size: [u32; 2],
    #[serde(default = "SkyConfig::default_inscatter_path")]
    pub inscatter_path: PathBuf,
    /// `[mu_s * nu, mu, r]` texels.
    #[serde(default = "SkyConfig::default_inscatter_size")]
    pub inscatter_size: [u32; 3],
    #[serde(default = "SkyConfig::default_res_mu_s")]
    pub res_mu_s: u32,
    #[serde(default = "SkyConfig::default_sun_angle")]
    pub sun_angle: f32,
    #[serde(default = "SkyConfig::default_camera_height_km")]
    pub camera_height_km: f32,
    #[serde(default = "SkyConfig::default_sun_intensity")]
    pub sun_intensity: f32,
    #[serde(default = "SkyConfig::default_mie_g")]
    pub mie_g: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "CameraConfig::default_position")]
    pub position: [f32; 3],
    #[serde(default = "CameraConfig::default_yaw_degrees")]
    pub yaw_degrees: f32,
    #[serde(default)]
    pub pitch_degrees: f32,
    #[serde(default = "CameraConfig::default_fov_degrees")]
    pub fov_degrees: f32,
    #[serde(default = "CameraConfig::default_near")]
    pub near: f32,
    #[serde(default = "CameraConfig::default_far")]
    pub far: f32,
    #[serde(default = "CameraConfig::default_move_speed")]
    pub move_speed: f32,
    #[serde(default = "CameraConfig::default_look_sensitivity")]
    pub look_sensitivity: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub mode: DisplayMode,
    #[serde(default)]
    pub roughness: f32,
    #[serde(default = "DisplayConfig::default_exposure")]
    pub exposure: f32,
    #[serde(default)]
    pub debug_overlay: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    pub window: WindowConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub ibl: IblConfig,
    #[serde(default)]
    pub sky: SkyConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vsync: Option<bool>,
    pub panorama: Option<PathBuf>,
    pub sample_count: Option<u32>,
    pub display_mode: Option<DisplayMode>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { title: "Runtime IBL".to_string(), width: 1280, height: 720, vsync: true, fullscreen: false }
    }
}

impl EnvironmentConfig {
    const fn default_cubemap_size() -> u32 {
        512
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self { panorama: None, cubemap_size: Self::default_cubemap_size() }
    }
}

impl IblConfig {
    const fn default_prefilter_size() -> u32 {
        256
    }

    const fn default_prefilter_mip_levels() -> u32 {
        7
    }

    const fn default_sh_sample_size() -> u32 {
        128
    }

    const fn default_sample_count() -> u32 {
        32
    }

    const fn default_brdf_lut_size() -> u32 {
        512
    }

    const fn default_brdf_sample_count() -> u32 {
        1024
    }

    /// Snaps sizes to powers of two, keeps the SH grid within the environment resolution,
    /// bounds the prefilter chain by its base size and clamps the sample count to capacity.
    pub fn sanitized(&self, environment_size: u32) -> Self {
        let prefilter_size = self.prefilter_size.clamp(1, 4096).next_power_of_two();
        let sh_sample_size =
            self.sh_sample_size.clamp(8, 1024).next_power_of_two().min(environment_size.max(8));
        Self {
            prefilter_size,
            prefilter_mip_levels: self.prefilter_mip_levels.clamp(1, full_mip_count(prefilter_size)),
            sh_sample_size,
            sample_count: self.sample_count.clamp(1, MAX_SAMPLE_COUNT as u32),
            brdf_lut_size: self.brdf_lut_size.clamp(8, 4096),
            brdf_sample_count: self.brdf_sample_count.max(1),
        }
    }
}

impl Default for IblConfig {
    fn default() -> Self {
        Self {
            prefilter_size: Self::default_prefilter_size(),
            prefilter_mip_levels: Self::default_prefilter_mip_levels(),
            sh_sample_size: Self::default_sh_sample_size(),
            sample_count: Self::default_sample_count(),
            brdf_lut_size: Self::default_brdf_lut_size(),
            brdf_sample_count: Self::default_brdf_sample_count(),
        }
    }
}

impl SkyConfig {
    fn default_transmittance_path() -> PathBuf {
        PathBuf::from("assets/sky/transmittance.raw")
    }

    const fn default_transmittance_size() -> [u32; 2] {
        [256, 64]
    }

    fn default_irradiance_path() -> PathBuf {
        PathBuf::from("assets/sky/irradiance.raw")
    }

    const fn default_irradiance_size() -> [u32; 2] {
        [64, 16]
    }

    fn default_inscatter_path() -> PathBuf {
        PathBuf::from("assets/sky/inscatter.raw")
    }

    const fn default_inscatter_size() -> [u32; 3] {
        [256, 128, 32]
    }

    const fn default_res_mu_s() -> u32 {
        32
    }

    const fn default_sun_angle() -> f32 {
        0.35
    }

    const fn default_camera_height_km() -> f32 {
        0.5
    }

    const fn default_sun_intensity() -> f32 {
        100.0
    }

    const fn default_mie_g() -> f32 {
        0.8
    }
}

impl Default for SkyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            transmittance_path: Self::default_transmittance_path(),
            transmittance_size: Self::default_transmittance_size(),
            irradiance_path: Self::default_irradiance_path(),
            irradiance_size: Self::default_irradiance_size(),
            inscatter_path: Self::default_inscatter_path(),
            inscatter_size: Self::default_inscatter_size(),
            res_mu_s: Self::default_res_mu_s(),
            sun_angle: Self::default_sun_angle(),
            camera_height_km: Self::default_camera_height_km(),
            sun_intensity: Self::default_sun_intensity(),
            mie_g: Self::default_mie_g(),
        }
    }
}

impl CameraConfig {
    const fn default_position() -> [f32; 3] {
        [0.0, 0.0, 14.0]
    }

    const fn default_yaw_degrees() -> f32 {
        -90.0
    }

    const fn default_fov_degrees() -> f32 {
        60.0
    }

    const fn default_near() -> f32 {
        0.1
    }

    const fn default_far() -> f32 {
        1000.0
    }

    const fn default_move_speed() -> f32 {
        6.0
    }

    const fn default_look_sensitivity() -> f32 {
        0.1
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Self::default_position(),
            yaw_degrees: Self::default_yaw_degrees(),
            pitch_degrees: 0.0,
            fov_degrees: Self::default_fov_degrees(),
            near: Self::default_near(),
            far: Self::default_far(),
            move_speed: Self::default_move_speed(),
            look_sensitivity: Self::default_look_sensitivity(),
        }
    }
}

impl DisplayConfig {
    const fn default_exposure() -> f32 {
        1.0
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            mode: DisplayMode::default(),
            roughness: 0.0,
            exposure: Self::default_exposure(),
            debug_overlay: false,
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("[config] {err:#}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &AppConfigOverrides) {
        if let Some(width) = overrides.width {
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.window.height = height;
        }
        if let Some(vsync) = overrides.vsync {
            self.window.vsync = vsync;
        }
        if let Some(panorama) = overrides.panorama.as_ref() {
            self.environment.panorama = Some(panorama.clone());
        }
        if let Some(sample_count) = overrides.sample_count {
            self.ibl.sample_count = sample_count;
        }
        if let Some(mode) = overrides.display_mode {
            self.display.mode = mode;
        }
    }
}

impl AppConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.applied_fields().is_empty()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.width.is_some() {
            fields.push("width");
        }
        if self.height.is_some() {
            fields.push("height");
        }
        if self.vsync.is_some() {
            fields.push("vsync");
        }
        if self.panorama.is_some() {
            fields.push("panorama");
        }
        if self.sample_count.is_some() {
            fields.push("samples");
        }
        if self.display_mode.is_some() {
            fields.push("mode");
        }
        fields
    }
}
