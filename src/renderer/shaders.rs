//! WGSL sources, CPU-side validation with `naga`, and error-scoped GPU object creation.

use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::error::IblError;

#[derive(Debug, Clone, Copy)]
pub struct WgslShader {
    pub label: &'static str,
    pub source: &'static str,
}

pub const EQUIRECT_TO_CUBE: WgslShader = WgslShader {
    label: "equirect_to_cube",
    source: include_str!("../../assets/shaders/equirect_to_cube.wgsl"),
};
pub const SKY_CAPTURE: WgslShader =
    WgslShader { label: "sky_capture", source: include_str!("../../assets/shaders/sky_capture.wgsl") };
pub const CUBE_MIP_DOWNSAMPLE: WgslShader = WgslShader {
    label: "cube_mip_downsample",
    source: include_str!("../../assets/shaders/cube_mip_downsample.wgsl"),
};
pub const SH_PROJECTION: WgslShader =
    WgslShader { label: "sh_projection", source: include_str!("../../assets/shaders/sh_projection.wgsl") };
pub const SH_REDUCE: WgslShader =
    WgslShader { label: "sh_reduce", source: include_str!("../../assets/shaders/sh_reduce.wgsl") };
pub const PREFILTER: WgslShader =
    WgslShader { label: "prefilter", source: include_str!("../../assets/shaders/prefilter.wgsl") };
pub const BRDF_LUT: WgslShader =
    WgslShader { label: "brdf_lut", source: include_str!("../../assets/shaders/brdf_lut.wgsl") };
pub const SCENE_PBR: WgslShader =
    WgslShader { label: "scene_pbr", source: include_str!("../../assets/shaders/scene_pbr.wgsl") };
pub const SKYBOX: WgslShader =
    WgslShader { label: "skybox", source: include_str!("../../assets/shaders/skybox.wgsl") };
pub const DEBUG_OVERLAY: WgslShader =
    WgslShader { label: "debug_overlay", source: include_str!("../../assets/shaders/debug_overlay.wgsl") };

pub const ALL: [WgslShader; 10] = [
    EQUIRECT_TO_CUBE,
    SKY_CAPTURE,
    CUBE_MIP_DOWNSAMPLE,
    SH_PROJECTION,
    SH_REDUCE,
    PREFILTER,
    BRDF_LUT,
    SCENE_PBR,
    SKYBOX,
    DEBUG_OVERLAY,
];

impl WgslShader {
    /// Parses and validates the module without touching a GPU.
    pub fn validate(&self) -> Result<naga::Module, IblError> {
        let module = naga::front::wgsl::parse_str(self.source).map_err(|err| IblError::ShaderValidation {
            label: self.label,
            message: err.emit_to_string(self.source),
        })?;
        Validator::new(ValidationFlags::all(), Capabilities::default()).validate(&module).map_err(|err| {
            IblError::ShaderValidation { label: self.label, message: err.emit_to_string(self.source) }
        })?;
        Ok(module)
    }

    pub fn create_module(&self, device: &wgpu::Device) -> Result<wgpu::ShaderModule, IblError> {
        self.validate()?;
        checked(device, self.label, || {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(self.label),
                source: wgpu::ShaderSource::Wgsl(self.source.into()),
            })
        })
    }
}

pub fn validate_all() -> Result<(), IblError> {
    for shader in ALL {
        shader.validate()?;
    }
    log::debug!("[shaders] {} WGSL modules validated", ALL.len());
    Ok(())
}

/// Runs `build` inside a validation error scope and turns a captured error into
/// [`IblError::GpuValidation`].
pub fn checked<T>(device: &wgpu::Device, label: &str, build: impl FnOnce() -> T) -> Result<T, IblError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(IblError::GpuValidation { label: label.to_string(), message: err.to_string() }),
        None => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_shader_parses_and_validates() {
        for shader in ALL {
            if let Err(err) = shader.validate() {
                panic!("{err}");
            }
        }
    }

    #[test]
    fn compute_shaders_declare_expected_workgroup_sizes() {
        let expected = [
            (CUBE_MIP_DOWNSAMPLE, [8, 8, 1]),
            (SH_PROJECTION, [8, 8, 1]),
            (SH_REDUCE, [64, 1, 1]),
            (PREFILTER, [8, 8, 1]),
            (BRDF_LUT, [8, 8, 1]),
        ];
        for (shader, size) in expected {
            let module = shader.validate().expect("valid shader");
            let entry = module
                .entry_points
                .iter()
                .find(|entry| entry.name == "cs_main")
                .unwrap_or_else(|| panic!("{} has no cs_main", shader.label));
            assert_eq!(entry.workgroup_size, size, "{}", shader.label);
        }
    }

    #[test]
    fn broken_source_reports_label() {
        let broken = WgslShader { label: "broken", source: "fn main( {" };
        let err = broken.validate().expect_err("parse failure");
        assert!(matches!(err, IblError::ShaderValidation { label: "broken", .. }));
    }
}
