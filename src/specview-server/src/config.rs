// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration for specview-server.
//!
//! The daemon is the only binary, so `specview.toml` is the config: the file
//! parses directly into [`ServerConfig`], no section wrapper. Default search
//! order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./specview.toml`
//! 3. `~/.config/specview/specview.toml`
//! 4. `/etc/specview/specview.toml`

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use specview_dsp::SpectrumSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
}

/// Default search paths for `specview.toml`
/// (current directory → XDG config → /etc).
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("specview.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("specview").join("specview.toml"));
    }
    paths.push(PathBuf::from("/etc/specview/specview.toml"));
    paths
}

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// General settings
    pub general: GeneralConfig,
    /// WebSocket listener configuration
    pub listen: ListenConfig,
    /// Spectrum analysis configuration
    pub spectrum: SpectrumSection,
    /// IQ sample source configuration
    pub source: SourceConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// WebSocket listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// IP address to listen on
    pub listen: IpAddr,
    /// TCP port to listen on
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            listen: IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            port: 4540,
        }
    }
}

/// Spectrum analysis configuration.
///
/// Wraps the processing settings with display options that are decided by
/// the server rather than the analyzer itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumSection {
    /// Analyzer processing settings (FFT size, window, averaging, ...).
    #[serde(flatten)]
    pub settings: SpectrumSettings,
    /// If true, render only the positive half of the spectrum, with each
    /// positive-frequency bin duplicated to fill the display width.
    pub positive_only: bool,
}

/// IQ sample source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source type: "tone" (complex oscillator) or "silence" (all zeros).
    #[serde(rename = "type")]
    pub source_type: String,
    /// IQ sample rate (Hz).
    pub sample_rate: u32,
    /// Nominal RF centre frequency reported to clients (Hz).
    pub center_frequency_hz: u64,
    /// Tone offset from the centre frequency (Hz). Only used by "tone".
    pub tone_offset_hz: f64,
    /// Tone amplitude in 0..=1. Only used by "tone".
    pub amplitude: f32,
    /// Samples per read from the source.
    pub block_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            source_type: "tone".to_string(),
            sample_rate: 1_920_000,
            center_frequency_hz: 144_300_000,
            tone_offset_hz: 100_000.0,
            amplitude: 0.5,
            block_size: 4096,
        }
    }
}

impl ServerConfig {
    /// Validate config rules. Returns a Vec of error strings; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(level) = self.general.log_level.as_deref() {
            match level {
                "trace" | "debug" | "info" | "warn" | "error" => {}
                _ => errors.push(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                )),
            }
        }

        if self.listen.port == 0 {
            errors.push("[listen].port must be > 0".into());
        }

        match self.source.source_type.as_str() {
            "tone" | "silence" => {}
            other => errors.push(format!(
                "[source].type '{}' is invalid (expected 'tone' or 'silence')",
                other
            )),
        }

        if self.source.sample_rate == 0 {
            errors.push("[source].sample_rate must be > 0".into());
        }
        if self.source.block_size == 0 {
            errors.push("[source].block_size must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.source.amplitude) {
            errors.push("[source].amplitude must be in range 0..=1".into());
        }
        let half_rate = self.source.sample_rate as f64 / 2.0;
        if self.source.tone_offset_hz.abs() >= half_rate {
            errors.push(format!(
                "[source].tone_offset_hz {} Hz exceeds Nyquist limit ±{} Hz",
                self.source.tone_offset_hz, half_rate
            ));
        }

        if !(0.0..=1.0).contains(&self.spectrum.settings.zoom_pos) {
            errors.push("[spectrum].zoom_pos must be in range 0..=1".into());
        }
        if self.spectrum.settings.zoom_factor < 1.0 {
            errors.push("[spectrum].zoom_factor must be >= 1".into());
        }

        errors
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// Search the default paths and load the first `specview.toml` found.
    /// Returns `(config, path_where_found)`, or the default config and
    /// `None` when no config file exists.
    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in config_search_paths() {
            if path.exists() {
                return Ok((Self::load_from_file(&path)?, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    /// Generate an example `specview.toml`.
    pub fn example_toml() -> String {
        let example = ServerConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            listen: ListenConfig::default(),
            spectrum: SpectrumSection::default(),
            source: SourceConfig::default(),
        };
        toml::to_string_pretty(&example).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use specview_dsp::{AveragingMode, WindowKind};
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen.port, 4540);
        assert_eq!(config.spectrum.settings.fft_size, 1024);
        assert_eq!(config.spectrum.settings.window, WindowKind::Hanning);
        assert!(!config.spectrum.positive_only);
        assert_eq!(config.source.source_type, "tone");
        assert_eq!(config.source.sample_rate, 1_920_000);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[listen]
port = 9000

[source]
type = "silence"
"#;
        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.listen.port, 9000);
        assert_eq!(config.source.source_type, "silence");
        // Untouched sections keep their defaults.
        assert_eq!(config.source.block_size, 4096);
        assert_eq!(config.spectrum.settings.fft_size, 1024);
    }

    #[test]
    fn test_parse_spectrum_section() {
        let toml_str = r#"
[spectrum]
fft_size = 2048
window = "blackman-harris"
overlap = 512
averaging_mode = "moving"
averaging_depth = 16
positive_only = true
"#;
        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.spectrum.settings.fft_size, 2048);
        assert_eq!(config.spectrum.settings.window, WindowKind::BlackmanHarris);
        assert_eq!(config.spectrum.settings.overlap, 512);
        assert_eq!(config.spectrum.settings.averaging_mode, AveragingMode::Moving);
        assert_eq!(config.spectrum.settings.averaging_depth, 16);
        assert!(config.spectrum.positive_only);
    }

    #[test]
    fn test_load_whole_file_without_section_header() {
        let f = write_temp(
            "[listen]\nport = 7777\n\n[spectrum]\nfft_size = 512\n\n[source]\ntype = \"silence\"\n",
        );
        let config = ServerConfig::load_from_file(f.path()).unwrap();
        assert_eq!(config.listen.port, 7777);
        assert_eq!(config.spectrum.settings.fft_size, 512);
        assert_eq!(config.source.source_type, "silence");
    }

    #[test]
    fn test_load_missing_file_is_a_read_error() {
        let err = ServerConfig::load_from_file(Path::new("/nonexistent/specview.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read(_, _)));
    }

    #[test]
    fn test_load_invalid_toml_is_a_parse_error() {
        let f = write_temp("not toml at all [");
        let err = ServerConfig::load_from_file(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_, _)));
    }

    #[test]
    fn test_example_toml_round_trips() {
        let example = ServerConfig::example_toml();
        let config: ServerConfig = toml::from_str(&example).unwrap();
        assert!(config.validate().is_empty());
        assert_eq!(config.general.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn test_validate_rejects_bad_source_type() {
        let mut config = ServerConfig::default();
        config.source.source_type = "file".to_string();
        let errors = config.validate();
        assert!(
            errors.iter().any(|e| e.contains("[source].type")),
            "expected error mentioning [source].type, got: {:?}",
            errors
        );
    }

    #[test]
    fn test_validate_rejects_tone_beyond_nyquist() {
        let mut config = ServerConfig::default();
        config.source.sample_rate = 48_000;
        config.source.tone_offset_hz = 30_000.0;
        let errors = config.validate();
        assert!(
            errors.iter().any(|e| e.contains("Nyquist")),
            "expected Nyquist error, got: {:?}",
            errors
        );
    }

    #[test]
    fn test_validate_collects_multiple_errors() {
        let mut config = ServerConfig::default();
        config.listen.port = 0;
        config.source.block_size = 0;
        config.source.amplitude = 2.0;
        let errors = config.validate();
        assert_eq!(errors.len(), 3, "expected exactly 3 errors, got: {:?}", errors);
    }
}
