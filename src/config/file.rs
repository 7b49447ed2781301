//! Configuration file management for mictape.
//!
//! This module handles loading and validating application configuration from TOML files.
//! Configuration is stored in the user's config directory.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Audio device and format configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Microphone to record from. Options:
    /// - "default" for system default device
    /// - numeric index (0, 1, 2, etc.) from `mictape list-devices`
    /// - device name from `mictape list-devices`
    #[serde(default = "default_device")]
    pub input_device: String,
    /// Output device for playback, same options as `input_device`
    #[serde(default = "default_device")]
    pub output_device: String,
    /// Recording sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: default_device(),
            output_device: default_device(),
            sample_rate: default_sample_rate(),
        }
    }
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    44_100
}

/// Volume chart configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Multiplier applied to normalized volume (0.0-1.0) before display
    #[serde(default = "default_volume_scale")]
    pub volume_scale: f32,
    /// Top of the volume chart, in scaled units
    #[serde(default = "default_chart_max")]
    pub chart_max: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            volume_scale: default_volume_scale(),
            chart_max: default_chart_max(),
        }
    }
}

fn default_volume_scale() -> f32 {
    1000.0
}

fn default_chart_max() -> u64 {
    500
}

/// Where recordings are suggested to be saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveConfig {
    /// Directory for suggested file names; the working directory when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Prefix of suggested file names
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: default_file_prefix(),
        }
    }
}

fn default_file_prefix() -> String {
    "recording".to_string()
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MictapeConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub save: SaveConfig,
}

impl MictapeConfig {
    /// Loads configuration from the user's config directory.
    ///
    /// # Errors
    /// - If the config directory cannot be determined
    /// - If the config file cannot be read
    /// - If the TOML is malformed
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Loads configuration from an explicit file.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
        Self::parse(&content)
    }

    /// Parses TOML configuration; missing keys take their defaults.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: MictapeConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.audio.sample_rate == 0 {
            anyhow::bail!("audio.sample_rate must be greater than zero");
        }
        if !(self.display.volume_scale.is_finite() && self.display.volume_scale > 0.0) {
            anyhow::bail!("display.volume_scale must be a positive number");
        }
        if self.display.chart_max == 0 {
            anyhow::bail!("display.chart_max must be greater than zero");
        }
        Ok(())
    }

    /// Suggests a timestamped destination for a new recording.
    pub fn suggested_save_path(&self) -> PathBuf {
        let name = format!(
            "{}-{}.wav",
            self.save.file_prefix,
            Local::now().format("%Y%m%d-%H%M%S")
        );
        match &self.save.directory {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }
}

/// Returns the config directory, creating it if needed.
///
/// # Errors
/// - If the home directory cannot be determined
/// - If the config directory cannot be created
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let dir = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?
        .join(".config")
        .join("mictape");
    fs::create_dir_all(&dir)
        .map_err(|e| anyhow::anyhow!("Failed to create config directory: {e}"))?;
    Ok(dir)
}

/// Retrieves the path to the config file.
///
/// Assumes the config file exists (created by setup if needed).
pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("mictape.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_matches_defaults() {
        let template = include_str!("../../environments/mictape.toml");
        let config = MictapeConfig::parse(template).unwrap();
        assert_eq!(config, MictapeConfig::default());
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = MictapeConfig::parse("[audio]\ninput_device = \"1\"\n").unwrap();
        assert_eq!(config.audio.input_device, "1");
        assert_eq!(config.audio.output_device, "default");
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.display.volume_scale, 1000.0);
        assert_eq!(config.display.chart_max, 500);
        assert_eq!(config.save.file_prefix, "recording");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(MictapeConfig::parse("[audio]\nsample_rate = 0\n").is_err());
        assert!(MictapeConfig::parse("[display]\nvolume_scale = -1.0\n").is_err());
        assert!(MictapeConfig::parse("[audio\n").is_err());
    }

    #[test]
    fn test_suggested_save_path() {
        let mut config = MictapeConfig::default();
        let name = config.suggested_save_path();
        let name = name.to_string_lossy();
        assert!(name.starts_with("recording-"));
        assert!(name.ends_with(".wav"));

        config.save.directory = Some(PathBuf::from("/tmp/takes"));
        config.save.file_prefix = "memo".to_string();
        let path = config.suggested_save_path();
        assert!(path.starts_with("/tmp/takes"));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("memo-"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mictape.toml");
        fs::write(&path, "[display]\nchart_max = 200\n").unwrap();
        assert_eq!(MictapeConfig::load_from(&path).unwrap().display.chart_max, 200);
        assert!(MictapeConfig::load_from(&dir.path().join("absent.toml")).is_err());
    }
}
