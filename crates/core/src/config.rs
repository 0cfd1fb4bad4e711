//! Runtime emulation settings.
//!
//! The UI builds an [`EmulationConfig`] (or loads one from a JSON file) and
//! posts it to the scheduler, which applies it between frames.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::EmuError;

/// Television standard; selects master clock, refresh rate and line count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Ntsc,
    Pal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulationConfig {
    pub region: Region,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Pace frames against the wall clock.
    pub fps_limiting: bool,
    /// Directory holding numbered save-state slots.
    pub slot_directory: Option<PathBuf>,
    /// Report a Japanese console (SMS region detection, Game Gear port 0).
    pub japanese_console: bool,
    /// Lift the per-line sprite limit.
    pub remove_sprite_limit: bool,
    /// Run colour-capable Game Boy cartridges in colour mode.
    pub prefer_color: bool,
}

impl Default for EmulationConfig {
    fn default() -> Self {
        Self {
            region: Region::Ntsc,
            sample_rate: 44_100,
            fps_limiting: true,
            slot_directory: None,
            japanese_console: false,
            remove_sprite_limit: false,
            prefer_color: true,
        }
    }
}

impl EmulationConfig {
    pub fn from_json_str(text: &str) -> Result<Self, EmuError> {
        serde_json::from_str(text)
            .map_err(|e| EmuError::Configuration(format!("invalid configuration: {e}")))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, EmuError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String, EmuError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EmuError::Configuration(format!("cannot serialize configuration: {e}")))
    }

    /// Reject values no machine can run with.
    pub fn validate(&self) -> Result<(), EmuError> {
        if self.sample_rate == 0 {
            return Err(EmuError::Configuration(
                "sample rate must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EmulationConfig::default();
        assert_eq!(config.region, Region::Ntsc);
        assert_eq!(config.sample_rate, 44_100);
        assert!(config.fps_limiting);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EmulationConfig::from_json_str(r#"{"region": "pal"}"#).unwrap();
        assert_eq!(config.region, Region::Pal);
        assert_eq!(config.sample_rate, 44_100);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = EmulationConfig {
            region: Region::Pal,
            sample_rate: 48_000,
            japanese_console: true,
            ..Default::default()
        };
        let text = config.to_json_string().unwrap();
        assert_eq!(EmulationConfig::from_json_str(&text).unwrap(), config);
    }

    #[test]
    fn test_bad_json_is_configuration_error() {
        assert!(matches!(
            EmulationConfig::from_json_str("{ not json"),
            Err(EmuError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let config = EmulationConfig {
            sample_rate: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
