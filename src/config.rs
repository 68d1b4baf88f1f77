//! TOML configuration for the simulator and its command-line front end.
//!
//! Every section is optional. A missing file section falls back to the values of the
//! reference hardware, so an empty file is a valid configuration.
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//!
//! [presets]
//! module = "2"
//! axis = "A"
//! offset = 6000
//!
//! [sensors]
//! photodiode = 0
//!
//! [logging]
//! level = "info"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::{AxisRef, ModePresets, PRESET_AXIS, PRESET_MODULE, PRESET_OFFSET_STEPS};

/// Baud rates offered by the serial front end.
pub const BAUD_RATES: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

/// Baud rate used for a configured port when none is given.
pub const DEFAULT_BAUD_RATE: u32 = 115200;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub serial: SerialConfig,
    pub presets: PresetConfig,
    pub sensors: SensorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port to listen on. When unset the CLI asks interactively.
    pub port: Option<String>,
    /// When unset, a configured port uses [`DEFAULT_BAUD_RATE`] and an interactively chosen
    /// port asks for one.
    pub baud_rate: Option<u32>,
    /// Read timeout of the serial port in milliseconds.
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: None,
            timeout_ms: 10,
        }
    }
}

/// Axis and offset driven by `ramanmode` / `imagemode`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetConfig {
    pub module: char,
    pub axis: char,
    pub offset: i64,
}

impl Default for PresetConfig {
    fn default() -> Self {
        Self {
            module: PRESET_MODULE,
            axis: PRESET_AXIS,
            offset: PRESET_OFFSET_STEPS,
        }
    }
}

impl From<&PresetConfig> for ModePresets {
    fn from(config: &PresetConfig) -> Self {
        Self {
            target: AxisRef::new(config.module, config.axis),
            offset: config.offset,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Photodiode reading reported until a harness overrides it.
    pub photodiode: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
        }
    }
}

impl SerialConfig {
    pub fn baud_rate_or_default(&self) -> u32 {
        self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE)
    }
}

impl SimulatorConfig {
    /// Loads and validates a configuration file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(baud_rate) = self.serial.baud_rate {
            if !BAUD_RATES.contains(&baud_rate) {
                return Err(ConfigError::Invalid(format!(
                    "unsupported baud rate {}, expected one of {:?}",
                    baud_rate, BAUD_RATES
                )));
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "invalid log level '{}', expected one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        // Whitespace separates operands on the wire, so it can never address an axis.
        if self.presets.module.is_whitespace() || self.presets.axis.is_whitespace() {
            return Err(ConfigError::Invalid(String::from(
                "preset module and axis must be printable characters",
            )));
        }

        if self.presets.offset == 0 {
            return Err(ConfigError::Invalid(String::from(
                "preset offset must be non-zero",
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_uses_reference_defaults() {
        let config = SimulatorConfig::from_toml_str("").unwrap();
        assert_eq!(config, SimulatorConfig::default());
        assert_eq!(config.presets.module, '2');
        assert_eq!(config.presets.axis, 'A');
        assert_eq!(config.presets.offset, 6000);
        assert_eq!(config.serial.baud_rate, None);
        assert_eq!(config.serial.baud_rate_or_default(), 115200);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = SimulatorConfig::from_toml_str(
            r#"
            [presets]
            offset = 250

            [sensors]
            photodiode = 42
            "#,
        )
        .unwrap();
        assert_eq!(config.presets.offset, 250);
        assert_eq!(config.presets.axis, 'A');
        assert_eq!(config.sensors.photodiode, 42);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn reject_unsupported_baud_rate() {
        let err = SimulatorConfig::from_toml_str("[serial]\nbaud_rate = 12345\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn reject_unknown_log_level() {
        let err = SimulatorConfig::from_toml_str("[logging]\nlevel = \"loud\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn reject_zero_offset_and_blank_axis() {
        assert!(SimulatorConfig::from_toml_str("[presets]\noffset = 0\n").is_err());
        assert!(SimulatorConfig::from_toml_str("[presets]\naxis = \" \"\n").is_err());
    }

    #[test]
    fn reject_multi_character_identifier() {
        let err = SimulatorConfig::from_toml_str("[presets]\nmodule = \"12\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[serial]\nport = \"/dev/ttyS9\"\nbaud_rate = 9600").unwrap();
        let config = SimulatorConfig::load_from(file.path()).unwrap();
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyS9"));
        assert_eq!(config.serial.baud_rate, Some(9600));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SimulatorConfig::load_from(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn presets_convert_to_mode_presets() {
        let config = PresetConfig { module: '3', axis: 'X', offset: -10 };
        let presets = ModePresets::from(&config);
        assert_eq!(presets.target, AxisRef::new('3', 'X'));
        assert_eq!(presets.offset, -10);
    }
}
