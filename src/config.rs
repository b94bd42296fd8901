//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{DashtapError, Result};
use crate::protocol::{decoder_for, ProtocolId};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub baseline: BaselineConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Serial tap configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_fallback_ports")]
    pub fallback_ports: Vec<String>,

    /// Bus baud rate; 0 = take it from the pinned protocol's descriptor
    #[serde(default)]
    pub baud_rate: u32,
}

/// Capture pipeline configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    /// Protocol identifier, or "auto" to detect from the stream
    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default = "default_detect_threshold")]
    pub detect_threshold: u32,

    #[serde(default = "default_detect_byte_budget")]
    pub detect_byte_budget: u64,

    #[serde(default = "default_no_data_byte_budget")]
    pub no_data_byte_budget: u64,
}

/// Baseline comparison configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// Warning band beyond baseline min/max, percent of range span
    #[serde(default = "default_tolerance_percent")]
    pub tolerance_percent: f64,

    /// RPM estimate per km/h of speed (wheel-size dependent)
    #[serde(default = "default_rpm_per_kmh")]
    pub rpm_per_kmh: f32,
}

/// Baseline store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BaselineConfig {
    #[serde(default = "default_baseline_dir")]
    pub dir: String,

    /// Scooter model whose baseline to load; empty = no baseline
    #[serde(default)]
    pub model: String,
}

/// Telemetry logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_fallback_ports() -> Vec<String> {
    vec!["/dev/ttyUSB1".to_string(), "/dev/ttyACM0".to_string()]
}

fn default_protocol() -> String { "auto".to_string() }
fn default_detect_threshold() -> u32 { 3 }
fn default_detect_byte_budget() -> u64 { 2048 }
fn default_no_data_byte_budget() -> u64 { 512 }

fn default_tolerance_percent() -> f64 { 20.0 }
fn default_rpm_per_kmh() -> f32 { 24.5 }

fn default_baseline_dir() -> String { "./baselines".to_string() }

fn default_telemetry_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            fallback_ports: default_fallback_ports(),
            baud_rate: 0,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            detect_threshold: default_detect_threshold(),
            detect_byte_budget: default_detect_byte_budget(),
            no_data_byte_budget: default_no_data_byte_budget(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tolerance_percent: default_tolerance_percent(),
            rpm_per_kmh: default_rpm_per_kmh(),
        }
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self { dir: default_baseline_dir(), model: String::new() }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// The pinned protocol, or `None` when auto-detecting
    pub fn pinned_protocol(&self) -> Result<Option<ProtocolId>> {
        if self.capture.protocol == "auto" {
            Ok(None)
        } else {
            ProtocolId::from_str(&self.capture.protocol).map(Some)
        }
    }

    /// Baud rate for the tap: explicit setting, or the pinned
    /// protocol's bus rate
    ///
    /// # Errors
    ///
    /// Returns error when auto-detecting with no explicit baud rate;
    /// a single opened port cannot guess its own speed
    pub fn effective_baud(&self) -> Result<u32> {
        if self.serial.baud_rate != 0 {
            return Ok(self.serial.baud_rate);
        }
        match self.pinned_protocol()? {
            Some(id) => Ok(decoder_for(id).descriptor().baud_rate),
            None => Err(DashtapError::Config(toml::de::Error::custom(
                "baud_rate is required when protocol = \"auto\"",
            ))),
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(DashtapError::Config(
                toml::de::Error::custom("serial port cannot be empty"),
            ));
        }

        // Surfaces unknown protocol names before any capture begins
        self.pinned_protocol()?;

        if self.capture.detect_threshold == 0 {
            return Err(DashtapError::Config(
                toml::de::Error::custom("detect_threshold must be greater than 0"),
            ));
        }

        if self.capture.detect_byte_budget == 0 || self.capture.no_data_byte_budget == 0 {
            return Err(DashtapError::Config(
                toml::de::Error::custom("detection byte budgets must be greater than 0"),
            ));
        }

        if self.analysis.tolerance_percent < 0.0 || self.analysis.tolerance_percent > 100.0 {
            return Err(DashtapError::Config(
                toml::de::Error::custom("tolerance_percent must be between 0 and 100"),
            ));
        }

        if self.analysis.rpm_per_kmh <= 0.0 {
            return Err(DashtapError::Config(
                toml::de::Error::custom("rpm_per_kmh must be greater than 0"),
            ));
        }

        if !self.baseline.model.is_empty() && self.baseline.dir.is_empty() {
            return Err(DashtapError::Config(
                toml::de::Error::custom("baseline dir cannot be empty when a model is set"),
            ));
        }

        if self.telemetry.enabled {
            if self.telemetry.log_dir.is_empty() {
                return Err(DashtapError::Config(
                    toml::de::Error::custom("telemetry log_dir cannot be empty when enabled"),
                ));
            }
            if self.telemetry.max_records_per_file == 0 {
                return Err(DashtapError::Config(
                    toml::de::Error::custom("max_records_per_file must be greater than 0"),
                ));
            }
            if self.telemetry.max_files_to_keep == 0 {
                return Err(DashtapError::Config(
                    toml::de::Error::custom("max_files_to_keep must be greater than 0"),
                ));
            }
        }

        Ok(())
    }
}
