//! # Telemetry Session
//!
//! The stateful aggregate owning one capture run.
//!
//! A session moves `Idle → Active → Idle`. While active it feeds raw
//! bytes through the synchronizer, dispatcher, decoder and comparator,
//! maintains running counters and the latest merged (frame,
//! classification) snapshot, and fans decoded frames out to registered
//! consumers.
//!
//! Stream noise never escapes `ingest` as an error: a passive tap is
//! noisy by design, so checksum failures and truncated frames are
//! counted and absorbed. Only lifecycle misuse (ingest while idle,
//! double start) fails loudly.
//!
//! Concurrency: the `&mut self` receivers enforce the single-writer
//! discipline the design requires. A host that ingests on one task and
//! displays on another wraps the session in a mutex, and `latest()`
//! then always observes a snapshot decoded from complete frames.
//! `stop()` drops the consumer sinks, so no callback fires after it
//! returns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{DashtapError, Result};
use crate::protocol::dispatch::{DetectConfig, DispatchStatus, ProtocolDispatcher, Routed};
use crate::protocol::sync::FrameSynchronizer;
use crate::protocol::{ProtocolId, RawFrame};
use crate::telemetry::baseline::Baseline;
use crate::telemetry::comparator::{classify, ComparatorConfig, FieldReport};
use crate::telemetry::frame::TelemetryFrame;

/// Running capture statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounters {
    /// Raw bytes ingested
    pub bytes_seen: u64,

    /// Candidate frames extracted by the synchronizer
    pub frames_seen: u64,

    /// Frames that validated and decoded
    pub frames_decoded: u64,

    /// Frames rejected by validation
    pub frames_rejected: u64,

    /// Bytes discarded as noise between frames
    pub noise_bytes: u64,
}

/// Capture-level status, reported to consumers on every change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Auto-detection is still sampling the stream
    Detecting,
    /// Frames are being decoded with this protocol
    Locked(ProtocolId),
    /// Detection budget exhausted; frames surface as raw hex
    Undetected,
    /// Enough bytes seen without a single valid frame; points at
    /// wiring/baud problems rather than a protocol mismatch
    NoValidData,
}

/// Final statistics returned by [`TelemetrySession::stop`]
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub counters: SessionCounters,
    pub status: SessionStatus,
}

/// Receives the session's output stream
///
/// Implementations must not block: the ingest path runs at bus rate.
/// Buffer or drop instead. All methods other than `on_frame` default to
/// no-ops.
pub trait ConsumerSink: Send {
    /// A decoded frame with its per-field classification
    fn on_frame(&mut self, frame: &TelemetryFrame, report: &FieldReport);

    /// A candidate frame surfaced as raw hex (no protocol detected)
    fn on_raw_frame(&mut self, frame: &RawFrame) {
        let _ = frame;
    }

    /// Session status changed
    fn on_status(&mut self, status: SessionStatus) {
        let _ = status;
    }

    /// Counters updated (once per ingest call)
    fn on_counters(&mut self, counters: &SessionCounters) {
        let _ = counters;
    }
}

/// Capture parameters, supplied by model configuration at start
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Protocol identifier to pin, or `None`/"auto" to auto-detect
    pub protocol: Option<String>,

    /// Baseline to classify against; `None` degrades every field to
    /// not-applicable
    pub baseline: Option<Baseline>,

    /// Auto-detection tuning
    pub detect: DetectConfig,

    /// Bytes without a single valid frame before reporting
    /// [`SessionStatus::NoValidData`]
    pub no_data_byte_budget: u64,

    /// Comparator tuning
    pub comparator: ComparatorConfig,

    /// RPM estimate per km/h of speed (wheel-size dependent)
    pub rpm_per_kmh: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            protocol: None,
            baseline: None,
            detect: DetectConfig::default(),
            no_data_byte_budget: 512,
            comparator: ComparatorConfig::default(),
            rpm_per_kmh: 24.5,
        }
    }
}

struct ActiveCapture {
    synchronizer: FrameSynchronizer,
    dispatcher: ProtocolDispatcher,
    baseline: Option<Baseline>,
    comparator: ComparatorConfig,
    rpm_per_kmh: f32,
    no_data_byte_budget: u64,
    counters: SessionCounters,
    merged: Option<TelemetryFrame>,
    latest: Option<(TelemetryFrame, FieldReport)>,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    sinks: Vec<Box<dyn ConsumerSink>>,
}

enum State {
    Idle,
    Active(ActiveCapture),
}

/// One capture run: owns the decode pipeline and its statistics
///
/// A stopped session is inert; create a fresh one for the next capture.
pub struct TelemetrySession {
    state: State,
}

impl TelemetrySession {
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active(_))
    }

    /// Begin a capture
    ///
    /// # Arguments
    ///
    /// * `config` - Capture parameters from model configuration
    /// * `sinks` - Consumers receiving the decoded stream
    ///
    /// # Errors
    ///
    /// * [`DashtapError::Session`] if a capture is already active
    /// * [`DashtapError::UnknownProtocol`] if the configured protocol
    ///   has no registered decoder
    pub fn start(&mut self, config: SessionConfig, sinks: Vec<Box<dyn ConsumerSink>>) -> Result<()> {
        if self.is_active() {
            return Err(DashtapError::Session(
                "capture already active; stop it before starting another".to_string(),
            ));
        }

        let dispatcher = match config.protocol.as_deref() {
            None | Some("auto") => ProtocolDispatcher::auto(config.detect),
            Some(name) => ProtocolDispatcher::pinned(ProtocolId::from_str(name)?),
        };

        let synchronizer = FrameSynchronizer::new(dispatcher.candidates());
        let status = match dispatcher.status() {
            DispatchStatus::Pinned(id) => SessionStatus::Locked(id),
            _ => SessionStatus::Detecting,
        };

        let mut capture = ActiveCapture {
            synchronizer,
            dispatcher,
            baseline: config.baseline,
            comparator: config.comparator,
            rpm_per_kmh: config.rpm_per_kmh,
            no_data_byte_budget: config.no_data_byte_budget,
            counters: SessionCounters::default(),
            merged: None,
            latest: None,
            status,
            started_at: Utc::now(),
            sinks,
        };

        info!(status = ?capture.status, baseline = capture.baseline.is_some(), "capture started");
        for sink in &mut capture.sinks {
            sink.on_status(capture.status);
        }

        self.state = State::Active(capture);
        Ok(())
    }

    /// Feed newly received bytes through the decode pipeline
    ///
    /// Safe to call with arbitrarily small chunks; partial frames are
    /// buffered across calls and the call never blocks. Stream noise is
    /// counted, not raised.
    ///
    /// # Errors
    ///
    /// * [`DashtapError::Session`] if the session is idle, which is a
    ///   contract violation by the caller, not a stream condition
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<()> {
        let capture = match &mut self.state {
            State::Active(capture) => capture,
            State::Idle => {
                return Err(DashtapError::Session(
                    "ingest called on an idle session".to_string(),
                ))
            }
        };

        capture.counters.bytes_seen += bytes.len() as u64;
        capture.dispatcher.note_bytes(bytes.len() as u64);
        capture.synchronizer.extend(bytes);

        while let Some(raw) = capture.synchronizer.next_frame() {
            capture.counters.frames_seen += 1;
            let at = Utc::now();

            match capture.dispatcher.route(&raw, at) {
                Routed::Frame(decoded) => {
                    capture.counters.frames_decoded += 1;
                    capture.absorb(decoded);
                }
                Routed::Rejected => {
                    capture.counters.frames_rejected += 1;
                    debug!(offset = raw.offset, protocol = %raw.protocol, "frame rejected");
                }
                Routed::Pending => {}
                Routed::Raw => {
                    for sink in &mut capture.sinks {
                        sink.on_raw_frame(&raw);
                    }
                }
            }
        }

        capture.counters.noise_bytes = capture.synchronizer.noise_bytes();
        capture.refresh_status();
        for sink in &mut capture.sinks {
            sink.on_counters(&capture.counters);
        }

        Ok(())
    }

    /// Latest merged frame with its classification, if any frame has
    /// decoded yet
    pub fn latest(&self) -> Option<&(TelemetryFrame, FieldReport)> {
        match &self.state {
            State::Active(capture) => capture.latest.as_ref(),
            State::Idle => None,
        }
    }

    pub fn counters(&self) -> Option<SessionCounters> {
        match &self.state {
            State::Active(capture) => Some(capture.counters),
            State::Idle => None,
        }
    }

    pub fn status(&self) -> Option<SessionStatus> {
        match &self.state {
            State::Active(capture) => Some(capture.status),
            State::Idle => None,
        }
    }

    /// End the capture and return final statistics
    ///
    /// Idempotent: stopping an idle session returns `None` and changes
    /// nothing. Consumer sinks are dropped before returning, so no
    /// callback fires afterwards.
    pub fn stop(&mut self) -> Option<SessionSummary> {
        let state = std::mem::replace(&mut self.state, State::Idle);
        match state {
            State::Idle => None,
            State::Active(capture) => {
                let summary = SessionSummary {
                    started_at: capture.started_at,
                    stopped_at: Utc::now(),
                    counters: capture.counters,
                    status: capture.status,
                };
                info!(
                    bytes = summary.counters.bytes_seen,
                    frames = summary.counters.frames_decoded,
                    rejected = summary.counters.frames_rejected,
                    "capture stopped"
                );
                Some(summary)
            }
        }
    }
}

impl Default for TelemetrySession {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveCapture {
    /// Merge a decoded frame into the running snapshot, classify it and
    /// fan it out
    fn absorb(&mut self, decoded: TelemetryFrame) {
        let decoded_rpm = decoded.rpm;
        let mut merged = match self.merged.take() {
            Some(mut merged) => {
                merged.merge_from(&decoded);
                merged
            }
            None => decoded,
        };

        // The supported protocols report speed but not RPM; estimate it
        // from the configured wheel factor
        if decoded_rpm.is_none() {
            if let Some(speed) = merged.speed_kmh {
                merged.rpm = Some((speed * self.rpm_per_kmh).round().max(0.0) as u32);
            }
        }

        let report = classify(&merged, self.baseline.as_ref(), &self.comparator);
        for sink in &mut self.sinks {
            sink.on_frame(&merged, &report);
        }
        self.latest = Some((merged.clone(), report));
        self.merged = Some(merged);
    }

    /// Recompute the capture status and notify sinks on change
    fn refresh_status(&mut self) {
        let no_valid_data = !self.dispatcher.saw_valid_frame()
            && self.counters.frames_decoded == 0
            && self.counters.bytes_seen >= self.no_data_byte_budget;

        let next = if no_valid_data {
            SessionStatus::NoValidData
        } else {
            match self.dispatcher.status() {
                DispatchStatus::Pinned(id) | DispatchStatus::Locked(id) => {
                    SessionStatus::Locked(id)
                }
                DispatchStatus::Detecting => SessionStatus::Detecting,
                DispatchStatus::Undetected => SessionStatus::Undetected,
            }
        };

        if next != self.status {
            info!(from = ?self.status, to = ?next, "capture status changed");
            self.status = next;
            for sink in &mut self.sinks {
                sink.on_status(next);
            }
        }
    }
}
