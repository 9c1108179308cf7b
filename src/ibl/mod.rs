//! CPU-side IBL math: sample generation, cube face geometry, SH projection, the BRDF
//! integral and panorama handling. The GPU passes in `renderer` evaluate the same formulas;
//! the functions here are the reference the tests hold them to.

pub mod brdf;
pub mod cubemap;
pub mod panorama;
pub mod sampling;
pub mod sh;

use serde::Deserialize;

/// Capacity of every per-mip sample-direction buffer.
pub const MAX_SAMPLE_COUNT: usize = 64;
pub const SH_COEFFICIENT_COUNT: usize = 9;
/// Edge length of one SH projection work-group tile.
pub const SH_TILE_SIZE: u32 = 8;

/// Number of mip levels in a full chain for a square texture of `size`.
pub fn full_mip_count(size: u32) -> u32 {
    32 - size.max(1).leading_zeros()
}

/// Roughness assigned to prefilter mip `mip` out of `levels`.
pub fn prefilter_roughness(mip: u32, levels: u32) -> f32 {
    if levels <= 1 {
        0.0
    } else {
        mip.min(levels - 1) as f32 / (levels - 1) as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Environment,
    Irradiance,
    Prefiltered,
    Sky,
}

impl DisplayMode {
    pub const ALL: [DisplayMode; 4] =
        [DisplayMode::Environment, DisplayMode::Irradiance, DisplayMode::Prefiltered, DisplayMode::Sky];

    pub fn label(self) -> &'static str {
        match self {
            DisplayMode::Environment => "environment",
            DisplayMode::Irradiance => "irradiance",
            DisplayMode::Prefiltered => "prefiltered",
            DisplayMode::Sky => "sky",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let lowered = value.to_ascii_lowercase();
        Self::ALL.into_iter().find(|mode| mode.label() == lowered)
    }

    /// Selector consumed by the skybox shader.
    pub fn shader_index(self) -> u32 {
        match self {
            DisplayMode::Environment | DisplayMode::Sky => 0,
            DisplayMode::Irradiance => 1,
            DisplayMode::Prefiltered => 2,
        }
    }

    /// Next mode in display order, skipping `Sky` when no sky model is loaded.
    pub fn next(self, sky_available: bool) -> Self {
        let index = Self::ALL.iter().position(|mode| *mode == self).unwrap_or(0);
        let mut candidate = Self::ALL[(index + 1) % Self::ALL.len()];
        if candidate == DisplayMode::Sky && !sky_available {
            candidate = Self::ALL[0];
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_mip_count_matches_power_of_two_chain() {
        assert_eq!(full_mip_count(512), 10);
        assert_eq!(full_mip_count(256), 9);
        assert_eq!(full_mip_count(1), 1);
        assert_eq!(full_mip_count(0), 1);
    }

    #[test]
    fn prefilter_roughness_spans_unit_interval() {
        assert_eq!(prefilter_roughness(0, 7), 0.0);
        assert_eq!(prefilter_roughness(6, 7), 1.0);
        assert!((prefilter_roughness(3, 7) - 0.5).abs() < 1e-6);
        assert_eq!(prefilter_roughness(0, 1), 0.0);
    }

    #[test]
    fn display_mode_cycles_and_skips_sky_when_unavailable() {
        assert_eq!(DisplayMode::Environment.next(false), DisplayMode::Irradiance);
        assert_eq!(DisplayMode::Prefiltered.next(true), DisplayMode::Sky);
        assert_eq!(DisplayMode::Prefiltered.next(false), DisplayMode::Environment);
        assert_eq!(DisplayMode::Sky.next(true), DisplayMode::Environment);
    }

    #[test]
    fn display_mode_parses_labels_case_insensitively() {
        assert_eq!(DisplayMode::parse("Irradiance"), Some(DisplayMode::Irradiance));
        assert_eq!(DisplayMode::parse("SKY"), Some(DisplayMode::Sky));
        assert_eq!(DisplayMode::parse("bogus"), None);
    }
}
