use crate::config::AppConfigOverrides;
use crate::ibl::DisplayMode;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    config: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
    vsync: Option<bool>,
    panorama: Option<PathBuf>,
    samples: Option<u32>,
    mode: Option<DisplayMode>,
}

const SUPPORTED_FLAGS: &str = "--config, --width, --height, --vsync, --panorama, --samples, --mode";

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            let Some(key) = flag.strip_prefix("--") else {
                bail!("Unexpected argument '{flag}'. Flags take the form --name value.");
            };
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "config" => overrides.config = Some(PathBuf::from(value)),
                "width" => {
                    overrides.width =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid width '{value}'"))?);
                }
                "height" => {
                    overrides.height =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid height '{value}'"))?);
                }
                "vsync" => {
                    overrides.vsync = Some(parse_bool_flag("vsync", &value)?);
                }
                "panorama" => overrides.panorama = Some(PathBuf::from(value)),
                "samples" => {
                    overrides.samples = Some(
                        value.parse::<u32>().with_context(|| format!("Invalid sample count '{value}'"))?,
                    );
                }
                "mode" => {
                    overrides.mode = Some(DisplayMode::parse(&value).ok_or_else(|| {
                        anyhow!("Invalid mode '{value}'. Use environment, irradiance, prefiltered or sky.")
                    })?);
                }
                _ => bail!("Unknown flag '{flag}'. Supported flags: {SUPPORTED_FLAGS}."),
            }
        }
        Ok(overrides)
    }

    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config.as_ref()
    }

    pub fn into_config_overrides(self) -> AppConfigOverrides {
        AppConfigOverrides {
            width: self.width,
            height: self.height,
            vsync: self.vsync,
            panorama: self.panorama,
            sample_count: self.samples,
            display_mode: self.mode,
        }
    }

    #[cfg(test)]
    pub fn as_tuple(&self) -> (Option<u32>, Option<u32>, Option<bool>) {
        (self.width, self.height, self.vsync)
    }
}

fn parse_bool_flag(flag: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("Invalid {flag} value '{other}'. Use on/off or true/false."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_width_height_and_vsync() {
        let args = ["app", "--width", "1600", "--height", "900", "--vsync", "off"];
        let overrides = CliOverrides::parse(args).expect("parse overrides");
        assert_eq!(overrides.as_tuple(), (Some(1600), Some(900), Some(false)));
    }

    #[test]
    fn latest_flag_wins() {
        let args = ["app", "--samples", "8", "--samples", "48", "--vsync", "on", "--vsync", "off"];
        let overrides = CliOverrides::parse(args).expect("parse overrides");
        assert_eq!(overrides.as_tuple(), (None, None, Some(false)));
        assert_eq!(overrides.into_config_overrides().sample_count, Some(48));
    }

    #[test]
    fn parses_ibl_flags() {
        let args = ["app", "--panorama", "studio.hdr", "--mode", "Irradiance", "--config", "alt.json"];
        let overrides = CliOverrides::parse(args).expect("parse overrides");
        assert_eq!(overrides.config_path(), Some(&PathBuf::from("alt.json")));
        let config = overrides.into_config_overrides();
        assert_eq!(config.panorama, Some(PathBuf::from("studio.hdr")));
        assert_eq!(config.display_mode, Some(DisplayMode::Irradiance));
    }

    #[test]
    fn rejects_unknown_modes_and_bad_counts() {
        let err = CliOverrides::parse(["app", "--mode", "wireframe"]).unwrap_err();
        assert!(err.to_string().contains("Invalid mode"));
        let err = CliOverrides::parse(["app", "--samples", "many"]).unwrap_err();
        assert!(err.to_string().contains("Invalid sample count"));
    }

    #[test]
    fn missing_value_errors() {
        let err = CliOverrides::parse(["app", "--width"]).unwrap_err();
        assert!(err.to_string().contains("Expected a value"), "error should mention missing value");
    }

    #[test]
    fn rejects_unknown_flags() {
        let err = CliOverrides::parse(["app", "--foo", "bar"]).unwrap_err();
        assert!(err.to_string().contains("Unknown flag"), "unknown flags should error");
    }
}
