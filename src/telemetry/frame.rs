//! # Telemetry Frame
//!
//! Normalized decoded snapshot of the scooter's state.
//!
//! Every field is optional: a protocol (or a single message type within
//! a protocol) that does not carry a field leaves it `None` rather than
//! defaulting to a fabricated zero, so consumers can distinguish "not
//! reported" from a real zero reading. Frames are immutable once built;
//! the session merges the latest known value per field across frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::{jp_qs_s4, ninebot, ProtocolId};

/// Scooter speed mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    Eco,
    Sport,
    Turbo,
    /// Raw mode byte outside the documented 0-2 range
    Unknown,
}

impl DriveMode {
    /// Map a raw mode byte to a drive mode
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => DriveMode::Eco,
            1 => DriveMode::Sport,
            2 => DriveMode::Turbo,
            _ => DriveMode::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DriveMode::Eco => "eco",
            DriveMode::Sport => "sport",
            DriveMode::Turbo => "turbo",
            DriveMode::Unknown => "unknown",
        }
    }

    /// Discrete numeric value for baseline comparison
    ///
    /// `Unknown` has no comparable value and classifies as
    /// not-applicable rather than matching any baseline set.
    pub fn discrete_value(&self) -> Option<f64> {
        match self {
            DriveMode::Eco => Some(0.0),
            DriveMode::Sport => Some(1.0),
            DriveMode::Turbo => Some(2.0),
            DriveMode::Unknown => None,
        }
    }
}

/// Telemetry field identifiers, used as classification and baseline keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryField {
    ThrottlePercent,
    BrakePercent,
    BrakeEngaged,
    SpeedKmh,
    Voltage,
    Current,
    Temperature,
    Mode,
    Headlight,
    Cruise,
    Rpm,
    BatteryPercent,
    ErrorCode,
}

impl TelemetryField {
    /// All fields, in display order
    pub const ALL: [TelemetryField; 13] = [
        TelemetryField::ThrottlePercent,
        TelemetryField::BrakePercent,
        TelemetryField::BrakeEngaged,
        TelemetryField::SpeedKmh,
        TelemetryField::Voltage,
        TelemetryField::Current,
        TelemetryField::Temperature,
        TelemetryField::Mode,
        TelemetryField::Headlight,
        TelemetryField::Cruise,
        TelemetryField::Rpm,
        TelemetryField::BatteryPercent,
        TelemetryField::ErrorCode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryField::ThrottlePercent => "throttle_percent",
            TelemetryField::BrakePercent => "brake_percent",
            TelemetryField::BrakeEngaged => "brake_engaged",
            TelemetryField::SpeedKmh => "speed_kmh",
            TelemetryField::Voltage => "voltage",
            TelemetryField::Current => "current",
            TelemetryField::Temperature => "temperature",
            TelemetryField::Mode => "mode",
            TelemetryField::Headlight => "headlight",
            TelemetryField::Cruise => "cruise",
            TelemetryField::Rpm => "rpm",
            TelemetryField::BatteryPercent => "battery_percent",
            TelemetryField::ErrorCode => "error_code",
        }
    }
}

/// Normalized decoded telemetry snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryFrame {
    /// Throttle position, 0-100%
    pub throttle_percent: Option<f32>,

    /// Brake lever position, 0-100%
    pub brake_percent: Option<f32>,

    /// Whether the brake is meaningfully engaged
    pub brake_engaged: Option<bool>,

    /// Ground speed in km/h
    pub speed_kmh: Option<f32>,

    /// Battery voltage in volts
    pub voltage: Option<f32>,

    /// Current draw in amperes
    pub current: Option<f32>,

    /// Controller temperature in °C
    pub temperature: Option<f32>,

    /// Speed mode
    pub mode: Option<DriveMode>,

    /// Headlight on/off
    pub headlight: Option<bool>,

    /// Cruise control on/off
    pub cruise: Option<bool>,

    /// Motor RPM (derived from speed when the protocol reports none)
    pub rpm: Option<u32>,

    /// Battery charge, 0-100%
    pub battery_percent: Option<u8>,

    /// Raw controller error code, 0 = none
    pub error_code: Option<u16>,

    /// Protocol that produced the most recent update
    pub source_protocol: ProtocolId,

    /// Wall-clock time the frame was decoded
    pub captured_at: DateTime<Utc>,
}

impl TelemetryFrame {
    /// Create a frame with every field unavailable
    pub fn empty(protocol: ProtocolId, at: DateTime<Utc>) -> Self {
        Self {
            throttle_percent: None,
            brake_percent: None,
            brake_engaged: None,
            speed_kmh: None,
            voltage: None,
            current: None,
            temperature: None,
            mode: None,
            headlight: None,
            cruise: None,
            rpm: None,
            battery_percent: None,
            error_code: None,
            source_protocol: protocol,
            captured_at: at,
        }
    }

    /// Fold a newer frame into this one, keeping the latest known value
    /// per field
    ///
    /// Multi-message-type protocols spread telemetry across several
    /// frames; the session calls this to maintain one merged snapshot.
    pub fn merge_from(&mut self, newer: &TelemetryFrame) {
        macro_rules! take {
            ($field:ident) => {
                if newer.$field.is_some() {
                    self.$field = newer.$field;
                }
            };
        }
        take!(throttle_percent);
        take!(brake_percent);
        take!(brake_engaged);
        take!(speed_kmh);
        take!(voltage);
        take!(current);
        take!(temperature);
        take!(mode);
        take!(headlight);
        take!(cruise);
        take!(rpm);
        take!(battery_percent);
        take!(error_code);
        self.source_protocol = newer.source_protocol;
        self.captured_at = newer.captured_at;
    }

    /// Numeric value of a field for baseline comparison
    ///
    /// Booleans map to 0/1 and modes to their discrete index; `None`
    /// means the field is unavailable and classifies not-applicable.
    pub fn numeric_value(&self, field: TelemetryField) -> Option<f64> {
        match field {
            TelemetryField::ThrottlePercent => self.throttle_percent.map(f64::from),
            TelemetryField::BrakePercent => self.brake_percent.map(f64::from),
            TelemetryField::BrakeEngaged => self.brake_engaged.map(|b| b as u8 as f64),
            TelemetryField::SpeedKmh => self.speed_kmh.map(f64::from),
            TelemetryField::Voltage => self.voltage.map(f64::from),
            TelemetryField::Current => self.current.map(f64::from),
            TelemetryField::Temperature => self.temperature.map(f64::from),
            TelemetryField::Mode => self.mode.and_then(|m| m.discrete_value()),
            TelemetryField::Headlight => self.headlight.map(|b| b as u8 as f64),
            TelemetryField::Cruise => self.cruise.map(|b| b as u8 as f64),
            TelemetryField::Rpm => self.rpm.map(f64::from),
            TelemetryField::BatteryPercent => self.battery_percent.map(f64::from),
            TelemetryField::ErrorCode => self.error_code.map(f64::from),
        }
    }

    /// Human-readable description of the current error code, if the
    /// protocol documents it
    pub fn error_description(&self) -> Option<&'static str> {
        let code = self.error_code?;
        match self.source_protocol {
            ProtocolId::JpQsS4 => jp_qs_s4::error_description(code),
            ProtocolId::Ninebot => ninebot::error_description(code),
        }
    }
}
