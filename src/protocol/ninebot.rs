//! # Ninebot/Xiaomi Protocol Decoder
//!
//! Decoder for the Ninebot serial protocol spoken between the ESC, BLE
//! module, BMS and apps on Ninebot/Xiaomi scooters.
//!
//! Frame format:
//!
//! ```text
//! 5A A5 len src dst cmd arg payload[len-2] cksum_lo cksum_hi
//! ```
//!
//! (older firmwares use the `55 AA` header). The checksum is
//! `0xFFFF XOR (16-bit sum of src..=payload)`, little-endian. Total
//! frame length is `len + 7`; telemetry values arrive in READ_RESPONSE
//! frames where the argument byte names the register being answered.

use chrono::{DateTime, Utc};

use super::checksum::ninebot_sum;
use super::descriptor::{LengthRule, ProtocolDescriptor, ProtocolId, RawFrame};
use super::ProtocolDecoder;
use crate::telemetry::frame::TelemetryFrame;

/// Primary frame header
pub const NB_HEADER: [u8; 2] = [0x5A, 0xA5];

/// Legacy frame header (M365 era)
pub const NB_HEADER_LEGACY: [u8; 2] = [0x55, 0xAA];

/// Framing bytes not covered by the length byte:
/// header(2) + len(1) + src(1) + dst(1) + checksum(2)
pub const NB_FRAME_OVERHEAD: usize = 7;

/// Smallest legal frame (len = 2: cmd + arg, empty payload)
pub const NB_MIN_FRAME_LEN: usize = 9;

/// Largest accepted length byte; anything bigger is bus garbage
pub const NB_MAX_LEN_BYTE: usize = 64;

/// READ_RESPONSE command: payload answers the register named in `arg`
pub const NB_CMD_READ_RESPONSE: u8 = 0x03;

// Telemetry registers (partial map, the ones a passive tap can use)
const REG_SPEED: u8 = 0x25;
const REG_BMS_VOLTAGE: u8 = 0x31;
const REG_BMS_CURRENT: u8 = 0x32;
const REG_BATTERY_PERCENT: u8 = 0x34;
const REG_TEMPERATURE: u8 = 0x35;
const REG_ERROR_CODE: u8 = 0x3A;
const REG_THROTTLE: u8 = 0x50;
const REG_BRAKE: u8 = 0x51;
const REG_TAIL_LIGHT: u8 = 0xB0;

/// Brake raw value above which the brake counts as engaged
const BRAKE_ENGAGED_RAW: u16 = 25;

/// Wire-layout descriptor for Ninebot
pub static NINEBOT_DESCRIPTOR: ProtocolDescriptor = ProtocolDescriptor {
    id: ProtocolId::Ninebot,
    name: "Ninebot/Xiaomi",
    baud_rate: 115_200,
    sync_markers: &[&NB_HEADER, &NB_HEADER_LEGACY],
    length: LengthRule::Prefixed { len_offset: 2, overhead: NB_FRAME_OVERHEAD },
    min_frame_len: NB_MIN_FRAME_LEN,
    max_frame_len: NB_MAX_LEN_BYTE + NB_FRAME_OVERHEAD,
};

/// Ninebot decoder
pub struct NinebotDecoder;

impl ProtocolDecoder for NinebotDecoder {
    fn descriptor(&self) -> &'static ProtocolDescriptor {
        &NINEBOT_DESCRIPTOR
    }

    fn validate(&self, frame: &RawFrame) -> bool {
        let bytes = &frame.bytes;
        if bytes.len() < NB_MIN_FRAME_LEN {
            return false;
        }
        if bytes[..2] != NB_HEADER && bytes[..2] != NB_HEADER_LEGACY {
            return false;
        }
        let len_byte = bytes[2] as usize;
        if len_byte < 2 || len_byte > NB_MAX_LEN_BYTE || bytes.len() != len_byte + NB_FRAME_OVERHEAD {
            return false;
        }

        let cksum_pos = bytes.len() - 2;
        let received = u16::from_le_bytes([bytes[cksum_pos], bytes[cksum_pos + 1]]);
        ninebot_sum(&bytes[3..cksum_pos]) == received
    }

    fn decode(&self, frame: &RawFrame, at: DateTime<Utc>) -> TelemetryFrame {
        let bytes = &frame.bytes;
        let mut out = TelemetryFrame::empty(ProtocolId::Ninebot, at);

        let command = bytes[5];
        let register = bytes[6];
        let payload = &bytes[7..bytes.len() - 2];

        // Only read responses carry register values a tap can interpret;
        // other commands decode to an all-unavailable frame
        if command != NB_CMD_READ_RESPONSE || payload.len() < 2 {
            return out;
        }

        let value = u16::from_le_bytes([payload[0], payload[1]]);
        match register {
            REG_SPEED => out.speed_kmh = Some(value as f32 / 1000.0),
            REG_BMS_VOLTAGE => out.voltage = Some(value as f32 / 100.0),
            REG_BMS_CURRENT => out.current = Some(value as f32 / 100.0),
            REG_BATTERY_PERCENT => out.battery_percent = Some(value.min(100) as u8),
            REG_TEMPERATURE => out.temperature = Some(value as f32 / 10.0),
            REG_ERROR_CODE => out.error_code = Some(value),
            REG_THROTTLE => out.throttle_percent = Some(raw_to_percent(value)),
            REG_BRAKE => {
                out.brake_percent = Some(raw_to_percent(value));
                out.brake_engaged = Some(value > BRAKE_ENGAGED_RAW);
            }
            REG_TAIL_LIGHT => out.headlight = Some(value > 0),
            // Unmapped register: nothing to populate
            _ => {}
        }

        out
    }
}

/// Scale a raw 0-255 throttle/brake value to a percentage, clamped
///
/// Noise can push the raw value past 255 on the wire (the register is
/// 16-bit); clamping keeps a noisy frame from voiding the stream.
fn raw_to_percent(value: u16) -> f32 {
    let pct = value as f32 / 2.55;
    (pct.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

/// Documented Ninebot ESC error codes
pub fn error_description(code: u16) -> Option<&'static str> {
    match code {
        0 => Some("No error"),
        10 => Some("Undervoltage"),
        11 => Some("Overvoltage"),
        12 => Some("Motor hall sensor error"),
        13 => Some("Motor phase error"),
        14 => Some("BMS communication error"),
        15 => Some("Controller overheat"),
        16 => Some("Motor overheat"),
        17 => Some("Overcurrent"),
        18 => Some("Short circuit"),
        19 => Some("Motor stalled"),
        21 => Some("Throttle error"),
        22 => Some("Brake error"),
        23 => Some("Serial communication error"),
        24 => Some("Battery cell imbalance"),
        _ => None,
    }
}
