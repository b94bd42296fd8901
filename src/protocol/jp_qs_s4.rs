//! # JP/QS-S4 Protocol Decoder
//!
//! Decoder for the JP/QS-S4 display protocol used by many Chinese
//! e-scooters (QS-S4 finger-throttle dashboards).
//!
//! Frame format: 15 bytes, fixed. Byte 14 is the XOR checksum of bytes
//! 0..=13. The bus runs at 1200 baud and carries two message types,
//! distinguished by the second header byte:
//!
//! - `01 03` dashboard → controller: throttle, brake, mode, headlight,
//!   cruise
//! - `01 04` controller → dashboard: speed, voltage, current, error
//!   code, temperature

use chrono::{DateTime, Utc};

use super::checksum::xor8;
use super::descriptor::{LengthRule, ProtocolDescriptor, ProtocolId, RawFrame};
use super::ProtocolDecoder;
use crate::telemetry::frame::{DriveMode, TelemetryFrame};

/// Fixed JP/QS-S4 frame length
pub const JP_FRAME_LEN: usize = 15;

/// First header byte, shared by both directions
pub const JP_SYNC_BYTE: u8 = 0x01;

/// Second header byte: dashboard → controller
pub const JP_TYPE_DASH_TO_CTRL: u8 = 0x03;

/// Second header byte: controller → dashboard
pub const JP_TYPE_CTRL_TO_DASH: u8 = 0x04;

/// Brake percent above which the brake counts as engaged
const BRAKE_ENGAGED_THRESHOLD: f32 = 10.0;

/// Wire-layout descriptor for JP/QS-S4
pub static JP_DESCRIPTOR: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::JpQsS4,
    name: "JP/QS-S4",
    baud_rate: 1200,
    sync_markers: &[
        &[JP_SYNC_BYTE, JP_TYPE_DASH_TO_CTRL],
        &[JP_SYNC_BYTE, JP_TYPE_CTRL_TO_DASH],
    ],
    length: LengthRule::Fixed(JP_FRAME_LEN),
    min_frame_len: JP_FRAME_LEN,
    max_frame_len: JP_FRAME_LEN,
};

/// JP/QS-S4 decoder
pub struct JpQsS4Decoder;

impl ProtocolDecoder for JpQsS4Decoder {
    fn descriptor(&self) -> &'static ProtocolDescriptor {
        &JP_DESCRIPTOR
    }

    fn validate(&self, frame: &RawFrame) -> bool {
        let bytes = &frame.bytes;
        if bytes.len() != JP_FRAME_LEN {
            return false;
        }
        if bytes[0] != JP_SYNC_BYTE
            || (bytes[1] != JP_TYPE_DASH_TO_CTRL && bytes[1] != JP_TYPE_CTRL_TO_DASH)
        {
            return false;
        }
        xor8(&bytes[..14]) == bytes[14]
    }

    fn decode(&self, frame: &RawFrame, at: DateTime<Utc>) -> TelemetryFrame {
        let bytes = &frame.bytes;
        let mut out = TelemetryFrame::empty(ProtocolId::JpQsS4, at);

        match bytes[1] {
            JP_TYPE_DASH_TO_CTRL => {
                let throttle = byte_to_percent(bytes[2]);
                let brake = byte_to_percent(bytes[3]);
                out.throttle_percent = Some(throttle);
                out.brake_percent = Some(brake);
                out.brake_engaged = Some(brake > BRAKE_ENGAGED_THRESHOLD);
                out.mode = Some(DriveMode::from_raw(bytes[4]));
                out.headlight = Some(bytes[5] == 1);
                out.cruise = Some(bytes[7] == 1);
            }
            JP_TYPE_CTRL_TO_DASH => {
                out.speed_kmh = Some(u16::from_le_bytes([bytes[2], bytes[3]]) as f32 / 10.0);
                out.voltage = Some(u16::from_le_bytes([bytes[4], bytes[5]]) as f32 / 10.0);
                out.current = Some(u16::from_le_bytes([bytes[6], bytes[7]]) as f32 / 10.0);
                out.error_code = Some(bytes[8] as u16);
                out.temperature = Some(bytes[9] as f32);
            }
            // validate() admits only the two types above
            _ => {}
        }

        out
    }
}

/// Scale a raw 0-255 byte to a percentage with one decimal place
fn byte_to_percent(raw: u8) -> f32 {
    let pct = raw as f32 / 255.0 * 100.0;
    (pct.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

/// Documented JP/QS-S4 controller error codes
pub fn error_description(code: u16) -> Option<&'static str> {
    match code {
        0x00 => Some("No error"),
        0x01 => Some("Motor hall sensor error"),
        0x02 => Some("Throttle error"),
        0x03 => Some("Motor phase error"),
        0x04 => Some("Motor stalled"),
        0x05 => Some("Controller overheat"),
        0x06 => Some("Overcurrent"),
        0x07 => Some("Battery low voltage"),
        0x08 => Some("Battery high voltage"),
        0x09 => Some("BMS communication error"),
        0x0A => Some("Motor hall sensor error B"),
        0x0B => Some("Motor hall sensor error C"),
        _ => None,
    }
}
