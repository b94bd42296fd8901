//! # Frame Synchronizer
//!
//! Carves candidate protocol frames out of a noisy, append-only byte
//! stream.
//!
//! A passive tap is guaranteed to start mid-frame and to see dropped or
//! corrupted bytes, so the synchronizer treats everything that is not a
//! recognizable frame as noise: it scans for the sync markers of the
//! candidate protocols, extracts a full frame when one is present,
//! waits (without blocking) when a marker has arrived but its frame has
//! not, and otherwise drops one byte and rescans. Dropped bytes are
//! counted, never surfaced as errors.

use bytes::{Buf, BytesMut};

use super::descriptor::{FrameLen, ProtocolDescriptor, RawFrame};

/// Outcome of probing the start of the buffer
enum StartMatch {
    /// A complete frame of this descriptor starts at the buffer head
    Frame(&'static ProtocolDescriptor, usize),
    /// A (possibly partial) marker is at the head but the frame is not
    /// complete yet
    NeedMore,
    /// Nothing recognizable starts here
    None,
}

/// Incremental frame synchronizer over an append-only byte buffer
pub struct FrameSynchronizer {
    buf: BytesMut,
    /// Absolute stream offset of `buf[0]`
    consumed: u64,
    noise_bytes: u64,
    candidates: Vec<&'static ProtocolDescriptor>,
}

impl FrameSynchronizer {
    /// Create a synchronizer scanning for the given protocols
    ///
    /// # Arguments
    ///
    /// * `candidates` - Descriptors whose sync markers are searched for;
    ///   a pinned session passes exactly one, auto-detection passes all
    pub fn new(candidates: Vec<&'static ProtocolDescriptor>) -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
            consumed: 0,
            noise_bytes: 0,
            candidates,
        }
    }

    /// Append newly received bytes to the scan window
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Total bytes discarded as noise so far
    pub fn noise_bytes(&self) -> u64 {
        self.noise_bytes
    }

    /// Bytes currently buffered awaiting more data
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next candidate frame, if one is fully buffered
    ///
    /// Returns `None` when the buffer holds no complete frame, either
    /// because more data is needed for a marker seen at the head, or
    /// because the remaining bytes are all noise. Never blocks.
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        while !self.buf.is_empty() {
            match self.match_at_start() {
                StartMatch::Frame(desc, len) => {
                    let offset = self.consumed;
                    let bytes = self.buf.split_to(len).to_vec();
                    self.consumed += len as u64;
                    return Some(RawFrame { protocol: desc.id, offset, bytes });
                }
                StartMatch::NeedMore => return None,
                StartMatch::None => {
                    // Resynchronize: drop one byte of noise and rescan
                    self.buf.advance(1);
                    self.consumed += 1;
                    self.noise_bytes += 1;
                }
            }
        }
        None
    }

    /// Probe whether a frame of any candidate protocol starts at the
    /// buffer head
    fn match_at_start(&self) -> StartMatch {
        let head = &self.buf[..];
        let mut need_more = false;

        for &desc in &self.candidates {
            for marker in desc.sync_markers {
                let overlap = marker.len().min(head.len());
                if head[..overlap] != marker[..overlap] {
                    continue;
                }
                if overlap < marker.len() {
                    // Marker prefix at the buffer tail; the rest may
                    // still be in flight
                    need_more = true;
                    continue;
                }
                match desc.expected_len(head) {
                    FrameLen::Known(len) if head.len() >= len => {
                        return StartMatch::Frame(desc, len);
                    }
                    FrameLen::Known(_) | FrameLen::NeedMore => need_more = true,
                    // Garbage length field: this marker match is noise,
                    // but another candidate may still claim the window
                    FrameLen::Invalid => {}
                }
            }
        }

        if need_more {
            StartMatch::NeedMore
        } else {
            StartMatch::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::checksum::{ninebot_sum, xor8};
    use crate::protocol::jp_qs_s4::JP_DESCRIPTOR;
    use crate::protocol::ninebot::NINEBOT_DESCRIPTOR;
    use crate::protocol::ProtocolId;

    fn jp_frame(msg_type: u8, body: [u8; 12]) -> Vec<u8> {
        let mut bytes = vec![0x01, msg_type];
        bytes.extend_from_slice(&body);
        bytes.push(xor8(&bytes));
        bytes
    }

    fn ninebot_frame(payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0x5A, 0xA5, (payload.len() + 2) as u8, 0x20, 0x3E, 0x03, 0x25];
        bytes.extend_from_slice(payload);
        let cksum = ninebot_sum(&bytes[3..]);
        bytes.extend_from_slice(&cksum.to_le_bytes());
        bytes
    }

    fn jp_only() -> FrameSynchronizer {
        FrameSynchronizer::new(vec![&JP_DESCRIPTOR])
    }

    #[test]
    fn test_clean_stream_yields_every_frame() {
        let mut sync = jp_only();
        let frame = jp_frame(0x03, [10, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        let mut stream = Vec::new();
        for _ in 0..4 {
            stream.extend_from_slice(&frame);
        }
        sync.extend(&stream);

        for _ in 0..4 {
            let got = sync.next_frame().expect("frame expected");
            assert_eq!(got.protocol, ProtocolId::JpQsS4);
            assert_eq!(got.bytes, frame);
        }
        assert_eq!(sync.next_frame(), None);
        assert_eq!(sync.noise_bytes(), 0);
    }

    #[test]
    fn test_resync_recovers_frames_and_counts_noise_exactly() {
        let mut sync = jp_only();
        let frame_a = jp_frame(0x03, [1, 2, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let frame_b = jp_frame(0x04, [9, 8, 7, 6, 0, 0, 0, 0, 0, 0, 0, 0]);

        // Noise chosen to never contain the 0x01 sync byte
        let noise = [0xDEu8, 0xAD, 0xBE, 0xEF, 0x42];
        let mut stream = Vec::new();
        stream.extend_from_slice(&noise);
        stream.extend_from_slice(&frame_a);
        stream.extend_from_slice(&noise);
        stream.extend_from_slice(&noise);
        stream.extend_from_slice(&frame_b);
        stream.extend_from_slice(&noise);
        sync.extend(&stream);

        assert_eq!(sync.next_frame().unwrap().bytes, frame_a);
        assert_eq!(sync.next_frame().unwrap().bytes, frame_b);
        assert_eq!(sync.next_frame(), None);
        // Trailing noise is only counted once scanning moves past it;
        // the final 5 bytes cannot yet be ruled out as a frame start
        // until more data arrives, except none start with 0x01 here
        assert_eq!(sync.noise_bytes(), 4 * noise.len() as u64);
    }

    #[test]
    fn test_stream_opening_mid_frame() {
        let mut sync = jp_only();
        let frame = jp_frame(0x04, [5, 0, 0xE2, 0x01, 0, 0, 0, 0, 0, 0, 0, 0]);

        // Tap opened mid-frame: tail of one frame, then two whole ones
        let mut stream = frame[7..].to_vec();
        let cut = stream.len() as u64;
        stream.extend_from_slice(&frame);
        stream.extend_from_slice(&frame);
        sync.extend(&stream);

        let first = sync.next_frame().expect("first full frame");
        assert_eq!(first.offset, cut);
        assert!(sync.next_frame().is_some());
        assert_eq!(sync.next_frame(), None);
    }

    #[test]
    fn test_partial_frame_waits_for_more_data() {
        let mut sync = jp_only();
        let frame = jp_frame(0x03, [77, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        sync.extend(&frame[..6]);
        assert_eq!(sync.next_frame(), None, "incomplete frame must not be emitted");
        assert_eq!(sync.noise_bytes(), 0, "pending bytes are not noise");

        sync.extend(&frame[6..]);
        assert_eq!(sync.next_frame().unwrap().bytes, frame);
    }

    #[test]
    fn test_partial_sync_marker_at_tail() {
        let mut sync = jp_only();
        // A single 0x01 could be the first byte of a marker
        sync.extend(&[0x01]);
        assert_eq!(sync.next_frame(), None);
        assert_eq!(sync.noise_bytes(), 0);

        // ... but followed by a non-marker byte it becomes noise
        sync.extend(&[0xFF]);
        assert_eq!(sync.next_frame(), None);
        assert_eq!(sync.noise_bytes(), 2);
    }

    #[test]
    fn test_oversized_declared_length_is_discarded() {
        let mut sync = FrameSynchronizer::new(vec![&NINEBOT_DESCRIPTOR]);

        // A Ninebot header whose length byte (0xF0) exceeds the maximum:
        // must be skipped as garbage, not waited on forever
        let mut stream = vec![0x5A, 0xA5, 0xF0, 0x00, 0x00];
        let frame = ninebot_frame(&[0x10, 0x27]);
        stream.extend_from_slice(&frame);
        sync.extend(&stream);

        let got = sync.next_frame().expect("real frame behind garbage");
        assert_eq!(got.bytes, frame);
        assert_eq!(sync.noise_bytes(), 5);
    }

    #[test]
    fn test_length_prefixed_frame_across_chunks() {
        let mut sync = FrameSynchronizer::new(vec![&NINEBOT_DESCRIPTOR]);
        let frame = ninebot_frame(&[0xAA, 0xBB, 0xCC, 0xDD]);

        // Deliver byte-by-byte, as a serial port might
        for &b in &frame[..frame.len() - 1] {
            sync.extend(&[b]);
            assert_eq!(sync.next_frame(), None);
        }
        sync.extend(&frame[frame.len() - 1..]);
        assert_eq!(sync.next_frame().unwrap().bytes, frame);
        assert_eq!(sync.noise_bytes(), 0);
    }

    #[test]
    fn test_multi_protocol_scan() {
        let mut sync = FrameSynchronizer::new(vec![&JP_DESCRIPTOR, &NINEBOT_DESCRIPTOR]);
        let jp = jp_frame(0x03, [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let nb = ninebot_frame(&[0x34, 0x12]);

        let mut stream = jp.clone();
        stream.extend_from_slice(&nb);
        sync.extend(&stream);

        assert_eq!(sync.next_frame().unwrap().protocol, ProtocolId::JpQsS4);
        assert_eq!(sync.next_frame().unwrap().protocol, ProtocolId::Ninebot);
    }

    #[test]
    fn test_pure_noise_counts_everything() {
        let mut sync = jp_only();
        let noise: Vec<u8> = (0..200).map(|i| 0x80u8 | (i as u8 & 0x3F)).collect();
        sync.extend(&noise);
        assert_eq!(sync.next_frame(), None);
        assert_eq!(sync.noise_bytes(), 200);
    }
}
