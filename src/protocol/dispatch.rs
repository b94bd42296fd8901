//! # Protocol Dispatcher
//!
//! Selects the active decoder for a capture and routes validated frames
//! to it.
//!
//! Two modes: explicit selection (the scooter model's configuration
//! names a protocol) and best-effort auto-detection. Detection counts
//! consecutive checksum-valid frames per protocol; a single valid frame
//! is not enough, since an 8-bit checksum collides on random noise
//! roughly once in 256 windows. If no protocol reaches the threshold
//! within a byte budget, the dispatcher degrades to surfacing raw hex
//! instead of blocking the capture.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::descriptor::{ProtocolDescriptor, ProtocolId, RawFrame};
use super::{decoder_for, registry, ProtocolDecoder};
use crate::telemetry::frame::TelemetryFrame;

/// Auto-detection tuning
#[derive(Debug, Clone, Copy)]
pub struct DetectConfig {
    /// Consecutive valid frames required to lock a protocol
    pub threshold: u32,

    /// Bytes to examine before giving up on detection
    pub byte_budget: u64,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self { threshold: 3, byte_budget: 2048 }
    }
}

/// Externally visible dispatcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// Protocol pinned by configuration
    Pinned(ProtocolId),
    /// Auto-detection still sampling the stream
    Detecting,
    /// Auto-detection locked onto a protocol
    Locked(ProtocolId),
    /// Detection budget exhausted without a lock
    Undetected,
}

/// Where a candidate frame ended up
#[derive(Debug)]
pub enum Routed {
    /// Validated and decoded by the active protocol
    Frame(TelemetryFrame),
    /// Failed validation (or arrived for a non-active protocol)
    Rejected,
    /// Valid during detection, but no protocol is locked yet
    Pending,
    /// No protocol detected; surface as raw hex
    Raw,
}

enum Mode {
    Pinned(ProtocolId),
    Detecting,
    Locked(ProtocolId),
    Undetected,
}

/// Routes candidate frames to the active decoder, detecting the
/// protocol first when none is pinned
pub struct ProtocolDispatcher {
    mode: Mode,
    detect: DetectConfig,
    bytes_seen: u64,
    streaks: BTreeMap<ProtocolId, u32>,
    any_valid: bool,
}

impl ProtocolDispatcher {
    /// Dispatcher with an explicitly selected protocol
    pub fn pinned(id: ProtocolId) -> Self {
        Self {
            mode: Mode::Pinned(id),
            detect: DetectConfig::default(),
            bytes_seen: 0,
            streaks: BTreeMap::new(),
            any_valid: false,
        }
    }

    /// Dispatcher that auto-detects the protocol from the stream
    pub fn auto(detect: DetectConfig) -> Self {
        Self {
            mode: Mode::Detecting,
            detect,
            bytes_seen: 0,
            streaks: BTreeMap::new(),
            any_valid: false,
        }
    }

    /// Descriptors the synchronizer should scan for
    pub fn candidates(&self) -> Vec<&'static ProtocolDescriptor> {
        match self.mode {
            Mode::Pinned(id) | Mode::Locked(id) => vec![decoder_for(id).descriptor()],
            Mode::Detecting | Mode::Undetected => {
                registry().iter().map(|d| d.descriptor()).collect()
            }
        }
    }

    /// Account for newly ingested bytes; expires the detection budget
    pub fn note_bytes(&mut self, count: u64) {
        self.bytes_seen += count;
        if matches!(self.mode, Mode::Detecting) && self.bytes_seen >= self.detect.byte_budget {
            info!(
                bytes = self.bytes_seen,
                "auto-detection budget exhausted, surfacing raw frames"
            );
            self.mode = Mode::Undetected;
        }
    }

    pub fn status(&self) -> DispatchStatus {
        match self.mode {
            Mode::Pinned(id) => DispatchStatus::Pinned(id),
            Mode::Detecting => DispatchStatus::Detecting,
            Mode::Locked(id) => DispatchStatus::Locked(id),
            Mode::Undetected => DispatchStatus::Undetected,
        }
    }

    /// The protocol frames are currently decoded with, if any
    pub fn active(&self) -> Option<ProtocolId> {
        match self.mode {
            Mode::Pinned(id) | Mode::Locked(id) => Some(id),
            _ => None,
        }
    }

    /// Whether any frame has ever passed validation
    pub fn saw_valid_frame(&self) -> bool {
        self.any_valid
    }

    /// Route one candidate frame through validation and decoding
    pub fn route(&mut self, frame: &RawFrame, at: DateTime<Utc>) -> Routed {
        match self.mode {
            Mode::Pinned(id) | Mode::Locked(id) => {
                if frame.protocol != id {
                    return Routed::Rejected;
                }
                let decoder = decoder_for(id);
                if decoder.validate(frame) {
                    self.any_valid = true;
                    Routed::Frame(decoder.decode(frame, at))
                } else {
                    Routed::Rejected
                }
            }
            Mode::Detecting => self.route_detecting(frame, at),
            Mode::Undetected => Routed::Raw,
        }
    }

    fn route_detecting(&mut self, frame: &RawFrame, at: DateTime<Utc>) -> Routed {
        let decoder: &'static dyn ProtocolDecoder = decoder_for(frame.protocol);
        if !decoder.validate(frame) {
            self.streaks.insert(frame.protocol, 0);
            return Routed::Rejected;
        }

        self.any_valid = true;
        let streak = self.streaks.entry(frame.protocol).or_insert(0);
        *streak += 1;
        debug!(protocol = %frame.protocol, streak = *streak, "valid frame during detection");

        if *streak >= self.detect.threshold {
            info!(protocol = %frame.protocol, "protocol locked");
            self.mode = Mode::Locked(frame.protocol);
            Routed::Frame(decoder.decode(frame, at))
        } else {
            Routed::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::checksum::xor8;

    fn at() -> DateTime<Utc> {
        "2024-03-01T10:00:00Z".parse().unwrap()
    }

    fn jp_frame(body: [u8; 12]) -> RawFrame {
        let mut bytes = vec![0x01, 0x03];
        bytes.extend_from_slice(&body);
        bytes.push(xor8(&bytes));
        RawFrame { protocol: ProtocolId::JpQsS4, offset: 0, bytes }
    }

    fn corrupt(mut frame: RawFrame) -> RawFrame {
        frame.bytes[2] ^= 0xFF;
        frame
    }

    #[test]
    fn test_pinned_decodes_valid_frames() {
        let mut dispatcher = ProtocolDispatcher::pinned(ProtocolId::JpQsS4);
        let routed = dispatcher.route(&jp_frame([128, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]), at());
        match routed {
            Routed::Frame(frame) => assert_eq!(frame.throttle_percent, Some(50.2)),
            other => panic!("expected decoded frame, got {:?}", other),
        }
        assert!(dispatcher.saw_valid_frame());
    }

    #[test]
    fn test_pinned_rejects_checksum_failure() {
        let mut dispatcher = ProtocolDispatcher::pinned(ProtocolId::JpQsS4);
        let routed = dispatcher.route(&corrupt(jp_frame([0; 12])), at());
        assert!(matches!(routed, Routed::Rejected));
        assert!(!dispatcher.saw_valid_frame());
    }

    #[test]
    fn test_pinned_candidates_single_protocol() {
        let dispatcher = ProtocolDispatcher::pinned(ProtocolId::Ninebot);
        let candidates = dispatcher.candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, ProtocolId::Ninebot);
    }

    #[test]
    fn test_detection_locks_after_threshold() {
        let detect = DetectConfig { threshold: 3, byte_budget: 10_000 };
        let mut dispatcher = ProtocolDispatcher::auto(detect);
        assert_eq!(dispatcher.status(), DispatchStatus::Detecting);

        let frame = jp_frame([1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(dispatcher.route(&frame, at()), Routed::Pending));
        assert!(matches!(dispatcher.route(&frame, at()), Routed::Pending));
        // The locking frame is decoded and emitted
        assert!(matches!(dispatcher.route(&frame, at()), Routed::Frame(_)));
        assert_eq!(dispatcher.status(), DispatchStatus::Locked(ProtocolId::JpQsS4));
        assert_eq!(dispatcher.active(), Some(ProtocolId::JpQsS4));
    }

    #[test]
    fn test_detection_streak_resets_on_invalid_frame() {
        let detect = DetectConfig { threshold: 3, byte_budget: 10_000 };
        let mut dispatcher = ProtocolDispatcher::auto(detect);

        let good = jp_frame([1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        dispatcher.route(&good, at());
        dispatcher.route(&good, at());
        // A checksum collision survivor must not lock the protocol
        dispatcher.route(&corrupt(good.clone()), at());
        assert!(matches!(dispatcher.route(&good, at()), Routed::Pending));
        assert_eq!(dispatcher.status(), DispatchStatus::Detecting);
    }

    #[test]
    fn test_detection_budget_expiry_degrades_to_raw() {
        let detect = DetectConfig { threshold: 3, byte_budget: 100 };
        let mut dispatcher = ProtocolDispatcher::auto(detect);

        dispatcher.note_bytes(100);
        assert_eq!(dispatcher.status(), DispatchStatus::Undetected);

        let frame = jp_frame([1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(dispatcher.route(&frame, at()), Routed::Raw));
    }

    #[test]
    fn test_budget_does_not_expire_after_lock() {
        let detect = DetectConfig { threshold: 1, byte_budget: 100 };
        let mut dispatcher = ProtocolDispatcher::auto(detect);

        let frame = jp_frame([1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(dispatcher.route(&frame, at()), Routed::Frame(_)));

        // Bytes beyond the budget are irrelevant once locked
        dispatcher.note_bytes(10_000);
        assert_eq!(dispatcher.status(), DispatchStatus::Locked(ProtocolId::JpQsS4));
        assert!(matches!(dispatcher.route(&frame, at()), Routed::Frame(_)));
    }
}
