//! # Protocol Module
//!
//! Byte-level handling of the supported e-scooter bus protocols.
//!
//! This module handles:
//! - Frame synchronization over a noisy passive tap
//! - Per-protocol wire descriptors (sync markers, length rules)
//! - Frame validation (checksums) and field extraction
//! - Protocol selection and auto-detection

pub mod checksum;
pub mod descriptor;
pub mod dispatch;
pub mod jp_qs_s4;
pub mod ninebot;
pub mod sync;

use chrono::{DateTime, Utc};

pub use descriptor::{ProtocolDescriptor, ProtocolId, RawFrame};

use crate::telemetry::frame::TelemetryFrame;

/// A protocol decoder: validates candidate frames and extracts fields
///
/// Decoders are stateless; all per-capture state lives in the session.
pub trait ProtocolDecoder: Send + Sync {
    /// Wire-layout descriptor for this protocol
    fn descriptor(&self) -> &'static ProtocolDescriptor;

    /// Apply the protocol's checksum/structural check
    ///
    /// A frame failing validation is rejected and counted, never
    /// partially decoded.
    fn validate(&self, frame: &RawFrame) -> bool;

    /// Extract telemetry fields from a frame that passed [`validate`]
    ///
    /// Fields the frame's message type does not carry are left
    /// unavailable rather than zeroed.
    ///
    /// [`validate`]: ProtocolDecoder::validate
    fn decode(&self, frame: &RawFrame, at: DateTime<Utc>) -> TelemetryFrame;
}

/// All registered decoders
pub fn registry() -> &'static [&'static dyn ProtocolDecoder] {
    static REGISTRY: [&dyn ProtocolDecoder; 2] =
        [&jp_qs_s4::JpQsS4Decoder, &ninebot::NinebotDecoder];
    &REGISTRY
}

/// Look up the decoder for a protocol
pub fn decoder_for(id: ProtocolId) -> &'static dyn ProtocolDecoder {
    match id {
        ProtocolId::JpQsS4 => &jp_qs_s4::JpQsS4Decoder,
        ProtocolId::Ninebot => &ninebot::NinebotDecoder,
    }
}
