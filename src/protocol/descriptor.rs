//! # Protocol Descriptors
//!
//! Immutable wire-layout descriptions for the supported bus protocols.
//!
//! A [`ProtocolDescriptor`] captures everything the frame synchronizer
//! needs to carve candidate frames out of a noisy byte stream: the sync
//! marker patterns, the frame-length rule, and the hard upper bound on
//! frame size. Field extraction and checksum verification live with the
//! per-protocol decoders, which operate on the [`RawFrame`] candidates
//! produced here.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::DashtapError;

/// Identifier for a supported protocol family
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolId {
    /// JP/QS-S4 display protocol (15-byte fixed frames, 1200 baud)
    JpQsS4,
    /// Ninebot/Xiaomi serial protocol (length-prefixed frames, 115200 baud)
    Ninebot,
}

impl ProtocolId {
    /// Canonical identifier string, as used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolId::JpQsS4 => "jp_qs_s4",
            ProtocolId::Ninebot => "ninebot",
        }
    }
}

impl std::fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolId {
    type Err = DashtapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jp_qs_s4" => Ok(ProtocolId::JpQsS4),
            "ninebot" => Ok(ProtocolId::Ninebot),
            other => Err(DashtapError::UnknownProtocol(other.to_string())),
        }
    }
}

/// How a protocol's total frame length is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    /// Every frame is exactly this many bytes
    Fixed(usize),

    /// Frame carries a length byte; total = length byte + overhead
    ///
    /// `len_offset` is the position of the length byte within the frame,
    /// `overhead` the number of framing bytes (header, addresses,
    /// checksum) not covered by the length byte itself.
    Prefixed { len_offset: usize, overhead: usize },
}

/// Result of applying a [`LengthRule`] to a partial byte window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLen {
    /// Total frame length is known
    Known(usize),
    /// The length byte is not in the window yet
    NeedMore,
    /// The declared length is outside the protocol's legal bounds
    Invalid,
}

/// Immutable wire-layout description for one protocol family
///
/// The synchronizer and dispatcher operate generically over descriptors;
/// nothing outside the protocol's own decoder branches on the concrete
/// byte layout.
#[derive(Debug)]
pub struct ProtocolDescriptor {
    /// Protocol identifier
    pub id: ProtocolId,

    /// Human-readable name for logs
    pub name: &'static str,

    /// Bus baud rate this protocol runs at
    pub baud_rate: u32,

    /// Sync marker byte patterns that start a frame
    pub sync_markers: &'static [&'static [u8]],

    /// Frame length rule
    pub length: LengthRule,

    /// Smallest legal frame, in bytes
    pub min_frame_len: usize,

    /// Largest legal frame, in bytes; declared lengths beyond this are
    /// treated as garbage rather than waited for
    pub max_frame_len: usize,
}

impl ProtocolDescriptor {
    /// Determine the total frame length for a window starting at a sync
    /// marker
    ///
    /// # Arguments
    ///
    /// * `window` - Bytes starting at the first marker byte; may be
    ///   shorter than a full frame
    pub fn expected_len(&self, window: &[u8]) -> FrameLen {
        match self.length {
            LengthRule::Fixed(len) => FrameLen::Known(len),
            LengthRule::Prefixed { len_offset, overhead } => {
                if window.len() <= len_offset {
                    return FrameLen::NeedMore;
                }
                let total = window[len_offset] as usize + overhead;
                if total < self.min_frame_len || total > self.max_frame_len {
                    FrameLen::Invalid
                } else {
                    FrameLen::Known(total)
                }
            }
        }
    }
}

/// A contiguous byte window believed to be one protocol message
///
/// Ephemeral: produced by the synchronizer, consumed by a decoder (or
/// dropped) within one ingest pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Protocol whose sync marker matched
    pub protocol: ProtocolId,

    /// Absolute byte offset of the frame start within the stream
    pub offset: u64,

    /// Complete frame bytes, sync marker included
    pub bytes: Vec<u8>,
}

impl RawFrame {
    /// Frame bytes as a lowercase hex string (for raw surfacing when no
    /// protocol could be detected)
    pub fn hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_id_round_trip() {
        for id in [ProtocolId::JpQsS4, ProtocolId::Ninebot] {
            assert_eq!(id.as_str().parse::<ProtocolId>().unwrap(), id);
        }
    }

    #[test]
    fn test_protocol_id_unknown() {
        let err = "xiaomi_pro".parse::<ProtocolId>().unwrap_err();
        match err {
            DashtapError::UnknownProtocol(name) => assert_eq!(name, "xiaomi_pro"),
            other => panic!("expected UnknownProtocol, got: {:?}", other),
        }
    }

    #[test]
    fn test_fixed_length_rule() {
        let desc = ProtocolDescriptor {
            id: ProtocolId::JpQsS4,
            name: "test",
            baud_rate: 1200,
            sync_markers: &[&[0x01, 0x03]],
            length: LengthRule::Fixed(15),
            min_frame_len: 15,
            max_frame_len: 15,
        };
        assert_eq!(desc.expected_len(&[0x01]), FrameLen::Known(15));
    }

    #[test]
    fn test_prefixed_length_rule() {
        let desc = ProtocolDescriptor {
            id: ProtocolId::Ninebot,
            name: "test",
            baud_rate: 115_200,
            sync_markers: &[&[0x5A, 0xA5]],
            length: LengthRule::Prefixed { len_offset: 2, overhead: 7 },
            min_frame_len: 9,
            max_frame_len: 71,
        };

        // Length byte not visible yet
        assert_eq!(desc.expected_len(&[0x5A, 0xA5]), FrameLen::NeedMore);

        // Length byte 2 => 9-byte frame
        assert_eq!(desc.expected_len(&[0x5A, 0xA5, 0x02]), FrameLen::Known(9));

        // Declared length beyond the maximum is garbage, not a frame
        assert_eq!(desc.expected_len(&[0x5A, 0xA5, 0xFF]), FrameLen::Invalid);

        // Declared length below the minimum likewise
        assert_eq!(desc.expected_len(&[0x5A, 0xA5, 0x00]), FrameLen::Invalid);
    }

    #[test]
    fn test_raw_frame_hex() {
        let frame = RawFrame {
            protocol: ProtocolId::JpQsS4,
            offset: 0,
            bytes: vec![0x01, 0x03, 0xAB],
        };
        assert_eq!(frame.hex(), "0103ab");
    }
}
